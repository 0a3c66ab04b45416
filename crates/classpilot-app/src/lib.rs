pub mod cli;
pub mod config;
pub mod error;
pub mod prompts;
pub mod render;
pub mod services;
