//! Runner state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a runner (and of the orchestrator as a whole)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunnerState {
    /// Not started yet
    Idle,
    /// Loop is active
    Running,
    /// Loop has exited, either on request or after a fatal error
    Stopped,
}

/// Outcome of one runner cycle, after retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// Observable status of a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerStatus {
    pub runner_id: String,

    pub state: RunnerState,

    /// Number of completed cycles
    pub cycles: u64,

    /// Number of cycles that ended failed
    pub failed_cycles: u64,

    pub last_outcome: Option<CycleOutcome>,

    /// When the last cycle finished
    pub last_run_at: Option<DateTime<Utc>>,

    /// Fatal error that terminated the loop, if any
    pub error: Option<String>,
}

impl RunnerStatus {
    pub fn new(runner_id: impl Into<String>) -> Self {
        Self {
            runner_id: runner_id.into(),
            state: RunnerState::Idle,
            cycles: 0,
            failed_cycles: 0,
            last_outcome: None,
            last_run_at: None,
            error: None,
        }
    }

    /// Record a finished cycle
    pub fn record_cycle(&mut self, outcome: CycleOutcome) {
        self.cycles += 1;
        if outcome == CycleOutcome::Failed {
            self.failed_cycles += 1;
        }
        self.last_outcome = Some(outcome);
        self.last_run_at = Some(Utc::now());
    }

    pub fn is_stopped(&self) -> bool {
        self.state == RunnerState::Stopped
    }
}
