//! Orchestrator events and their handlers

use crate::core::CycleOutcome;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Events that can occur while runners execute
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    RunnerStarted {
        runner_id: String,
    },
    CycleStarted {
        runner_id: String,
        cycle: u64,
        attempt: u32,
    },
    CycleRetrying {
        runner_id: String,
        cycle: u64,
        /// The attempt about to run
        attempt: u32,
        delay: Duration,
    },
    CycleFinished {
        runner_id: String,
        cycle: u64,
        outcome: CycleOutcome,
        /// Message of the top-level result
        message: String,
        /// `(pipe_id, message)` of every failed pipe in the final context
        failures: Vec<(String, String)>,
    },
    RunnerStopped {
        runner_id: String,
        error: Option<String>,
    },
}

impl OrchestratorEvent {
    pub fn runner_id(&self) -> &str {
        match self {
            OrchestratorEvent::RunnerStarted { runner_id }
            | OrchestratorEvent::CycleStarted { runner_id, .. }
            | OrchestratorEvent::CycleRetrying { runner_id, .. }
            | OrchestratorEvent::CycleFinished { runner_id, .. }
            | OrchestratorEvent::RunnerStopped { runner_id, .. } => runner_id,
        }
    }
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(OrchestratorEvent) + Send + Sync>;

/// Handlers shared between the orchestrator and its runner tasks
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler<F>(&self, handler: F)
    where
        F: Fn(OrchestratorEvent) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: OrchestratorEvent) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("EventBus").field("handlers", &count).finish()
    }
}
