pub mod assist;
pub mod config;
mod error;
mod server;
mod shutdown;

pub use assist::*;
pub use config::*;
pub use error::ServerError;
pub use server::{build_api_router, build_app_router, serve};
