//! Scheduling and execution of runners

pub mod events;
pub mod orchestrator;
pub mod retry;
pub mod runner;
pub mod trigger;

pub use events::{EventBus, EventHandler, OrchestratorEvent};
pub use orchestrator::{Orchestrator, ShutdownHandle};
pub use retry::RetryPolicy;
pub use runner::Runner;
pub use trigger::Trigger;

use thiserror::Error;

/// Error that terminates a single runner loop
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunnerError {
    #[error("Runner '{runner_id}' panicked: {message}")]
    Panicked { runner_id: String, message: String },

    #[error("Runner '{runner_id}' stopped after a failed cycle: {message}")]
    CycleFailed { runner_id: String, message: String },
}

impl RunnerError {
    pub fn runner_id(&self) -> &str {
        match self {
            RunnerError::Panicked { runner_id, .. } | RunnerError::CycleFailed { runner_id, .. } => {
                runner_id
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Orchestrator is already running")]
    AlreadyRunning,

    #[error("Orchestrator is not running")]
    NotRunning,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}
