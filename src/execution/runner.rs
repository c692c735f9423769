//! Runner - one trigger and one pipe, executed on its own loop

use crate::core::{
    ContextPolicy, CycleOutcome, FailurePolicy, PipeContext, PipeStatus, RunnerConfig,
    RunnerState, RunnerStatus,
};
use crate::execution::events::{EventBus, OrchestratorEvent};
use crate::execution::retry::RetryPolicy;
use crate::execution::trigger::{sleep_or_stop, Trigger};
use crate::execution::RunnerError;
use crate::pipes::Pipe;
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Result of one cycle, after retries
#[derive(Debug)]
struct CycleReport {
    context: PipeContext,
    outcome: CycleOutcome,
    message: String,
    /// A stop arrived during a retry delay
    interrupted: bool,
}

pub struct Runner {
    id: String,
    trigger: Trigger,
    retry: RetryPolicy,
    on_failure: FailurePolicy,
    context_policy: ContextPolicy,
    params: Map<String, Value>,
    pipe: Arc<Pipe>,
    status: Arc<Mutex<RunnerStatus>>,
    events: EventBus,
}

impl Runner {
    pub fn new(
        config: &RunnerConfig,
        trigger: Trigger,
        pipe: Pipe,
        params: Map<String, Value>,
        events: EventBus,
    ) -> Self {
        Self {
            id: config.id.clone(),
            trigger,
            retry: RetryPolicy::from(&config.retry),
            on_failure: config.on_failure,
            context_policy: config.context,
            params,
            pipe: Arc::new(pipe),
            status: Arc::new(Mutex::new(RunnerStatus::new(config.id.clone()))),
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> RunnerStatus {
        self.lock_status().clone()
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, RunnerStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run cycles until a stop is requested or the runner fails
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<(), RunnerError> {
        {
            let mut status = self.lock_status();
            status.state = RunnerState::Running;
            status.error = None;
        }
        info!(runner_id = %self.id, "Runner started");
        self.events.emit(OrchestratorEvent::RunnerStarted {
            runner_id: self.id.clone(),
        });

        let result = self.run_loop(&mut shutdown).await;

        let error = result.as_ref().err().map(ToString::to_string);
        {
            let mut status = self.lock_status();
            status.state = RunnerState::Stopped;
            status.error = error.clone();
        }
        match &error {
            Some(e) => error!(runner_id = %self.id, error = %e, "Runner terminated"),
            None => info!(runner_id = %self.id, "Runner stopped"),
        }
        self.events.emit(OrchestratorEvent::RunnerStopped {
            runner_id: self.id.clone(),
            error,
        });

        result
    }

    async fn run_loop(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), RunnerError> {
        let mut carried: Option<PipeContext> = None;
        let mut cycle: u64 = 0;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            cycle += 1;

            let initial = match (self.context_policy, carried.take()) {
                (ContextPolicy::Carry, Some(context)) => context,
                _ => PipeContext::with_params(self.params.clone()),
            };

            let report = self.run_cycle(cycle, initial, shutdown).await?;
            self.lock_status().record_cycle(report.outcome);
            self.events.emit(OrchestratorEvent::CycleFinished {
                runner_id: self.id.clone(),
                cycle,
                outcome: report.outcome,
                message: report.message.clone(),
                failures: report.context.failure_chain(),
            });

            if report.interrupted {
                return Ok(());
            }

            if report.outcome == CycleOutcome::Failed {
                warn!(
                    runner_id = %self.id,
                    cycle = cycle,
                    reason = %report.message,
                    "Cycle failed after {} attempt(s)",
                    self.retry.attempts
                );
                if self.on_failure == FailurePolicy::Stop {
                    return Err(RunnerError::CycleFailed {
                        runner_id: self.id.clone(),
                        message: report.message,
                    });
                }
            }

            if self.context_policy == ContextPolicy::Carry {
                carried = Some(report.context);
            }

            if self.trigger.wait(shutdown).await {
                return Ok(());
            }
        }
    }

    /// Run one cycle, retrying failed attempts from the same initial context
    async fn run_cycle(
        &self,
        cycle: u64,
        initial: PipeContext,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleReport, RunnerError> {
        let mut attempt: u32 = 1;

        loop {
            debug!(runner_id = %self.id, cycle = cycle, attempt = attempt, "Starting cycle");
            self.events.emit(OrchestratorEvent::CycleStarted {
                runner_id: self.id.clone(),
                cycle,
                attempt,
            });

            let context = self.execute(initial.clone()).await?;
            let (outcome, message) = match context.get_result(self.pipe.id()) {
                Some(result) => (
                    match result.status() {
                        PipeStatus::Succeeded => CycleOutcome::Succeeded,
                        PipeStatus::Failed => CycleOutcome::Failed,
                        PipeStatus::Skipped => CycleOutcome::Skipped,
                    },
                    result.message().to_string(),
                ),
                None => (CycleOutcome::Skipped, String::new()),
            };

            if outcome != CycleOutcome::Failed || !self.retry.allows_another(attempt) {
                return Ok(CycleReport {
                    context,
                    outcome,
                    message,
                    interrupted: false,
                });
            }

            let delay = self.retry.delay_for(attempt);
            attempt += 1;
            warn!(
                runner_id = %self.id,
                cycle = cycle,
                reason = %message,
                "Cycle failed, retrying in {:?} (attempt {}/{})",
                delay,
                attempt,
                self.retry.attempts
            );
            self.events.emit(OrchestratorEvent::CycleRetrying {
                runner_id: self.id.clone(),
                cycle,
                attempt,
                delay,
            });

            if sleep_or_stop(delay, shutdown).await {
                return Ok(CycleReport {
                    context,
                    outcome,
                    message,
                    interrupted: true,
                });
            }
        }
    }

    /// Process the pipe on its own task so a panic cannot take the loop down unnoticed
    async fn execute(&self, context: PipeContext) -> Result<PipeContext, RunnerError> {
        let pipe = Arc::clone(&self.pipe);
        let task = tokio::spawn(async move { pipe.process(context).await });

        task.await.map_err(|e| RunnerError::Panicked {
            runner_id: self.id.clone(),
            message: if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            },
        })
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("id", &self.id)
            .field("trigger", &self.trigger)
            .field("pipe", &self.pipe)
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
