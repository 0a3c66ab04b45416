//! Orchestration layer for request handling.
//!
//! Modules here own the IO-bound and stateful parts: the remote completion
//! call, the request table and its sweeper. Pure transforms stay in
//! `crate::prompts` and `crate::render`.

pub mod assist;
pub mod completion;
pub mod jobs;
pub mod sweeper;

pub use assist::AssistService;
pub use completion::{
    CompletionClient, CompletionError, CompletionSettings, DEFAULT_BASE_URL, DEFAULT_MODEL,
    OpenAiCompletionClient,
};
pub use jobs::{JobOutcome, JobRecord, JobState, JobTracker, JobTrackerError};
pub use sweeper::{SweeperConfig, spawn_sweeper, sweep_once};
