//! Orchestrator - owns the runners and their loops

use crate::core::{OrchestratorConfig, RunnerConfig, RunnerState, RunnerStatus};
use crate::execution::events::{EventBus, OrchestratorEvent};
use crate::execution::runner::Runner;
use crate::execution::trigger::Trigger;
use crate::execution::{OrchestratorError, RunnerError};
use crate::pipes::PipeFactory;
use crate::plugin::PluginHost;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

/// Requests a graceful stop from another task
///
/// Runners finish the pipe they are executing and then exit.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopping(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Runs every configured runner on its own task
pub struct Orchestrator {
    runners: Vec<Arc<Runner>>,
    events: EventBus,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Vec<(String, JoinHandle<()>)>,
    first_error: Arc<Mutex<Option<RunnerError>>>,
    state: RunnerState,
}

impl Orchestrator {
    /// Build an orchestrator from configuration and the installed pipe types
    ///
    /// Fails if the configuration is invalid, a service cannot be created,
    /// or any pipe names a `use` that is not registered.
    pub fn new(config: OrchestratorConfig, host: &PluginHost) -> Result<Self, OrchestratorError> {
        config
            .validate()
            .map_err(|e| OrchestratorError::Config(format!("{:#}", e)))?;

        for runner in &config.runners {
            if let Some(unknown) = runner
                .run
                .used_types()
                .into_iter()
                .find(|uses| !host.pipes().contains(uses))
            {
                return Err(OrchestratorError::Config(format!(
                    "Runner '{}' uses unknown pipe type '{}'",
                    runner.id, unknown
                )));
            }
        }

        let factory = host
            .factory(&config.services)
            .map_err(|e| OrchestratorError::Config(e.to_string()))?;

        let runners = config
            .runners
            .iter()
            .map(|runner| (runner.clone(), config.runner_params(runner)))
            .collect();
        Self::with_factory(runners, &factory)
    }

    /// Build an orchestrator from runner configurations and a ready factory
    pub fn with_factory(
        runners: Vec<(RunnerConfig, Map<String, Value>)>,
        factory: &PipeFactory,
    ) -> Result<Self, OrchestratorError> {
        let events = EventBus::new();
        let mut built = Vec::with_capacity(runners.len());

        for (config, params) in runners {
            let trigger = Trigger::from_config(&config.trigger).ok_or_else(|| {
                OrchestratorError::Config(format!("Runner '{}' has no trigger", config.id))
            })?;
            let pipe = factory.build(&config.run).map_err(|e| {
                OrchestratorError::Config(format!("Runner '{}': {}", config.id, e))
            })?;
            built.push(Arc::new(Runner::new(&config, trigger, pipe, params, events.clone())));
        }

        let (sender, _) = watch::channel(false);
        Ok(Self {
            runners: built,
            events,
            shutdown: Arc::new(sender),
            tasks: Vec::new(),
            first_error: Arc::new(Mutex::new(None)),
            state: RunnerState::Idle,
        })
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(OrchestratorEvent) + Send + Sync + 'static,
    {
        self.events.add_handler(handler);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown),
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn runner_ids(&self) -> Vec<&str> {
        self.runners.iter().map(|r| r.id()).collect()
    }

    /// Per-runner status, in configuration order
    pub fn status(&self) -> Vec<RunnerStatus> {
        self.runners.iter().map(|r| r.status()).collect()
    }

    /// Spawn one loop per runner and return immediately
    pub fn start(&mut self) -> Result<(), OrchestratorError> {
        if self.state == RunnerState::Running {
            return Err(OrchestratorError::AlreadyRunning);
        }

        self.shutdown.send_replace(false);
        *self.lock_first_error() = None;

        info!(runners = self.runners.len(), "Starting orchestrator");
        for runner in &self.runners {
            let runner_id = runner.id().to_string();
            let span = info_span!("runner", runner_id = %runner_id);
            let shutdown = self.shutdown.subscribe();
            let first_error = Arc::clone(&self.first_error);
            let loop_runner = Arc::clone(runner);

            let task = tokio::spawn(
                async move {
                    if let Err(e) = loop_runner.run(shutdown).await {
                        first_error
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .get_or_insert(e);
                    }
                }
                .instrument(span),
            );
            self.tasks.push((runner_id, task));
        }

        self.state = RunnerState::Running;
        Ok(())
    }

    /// Signal every runner to stop and wait for all loops to exit
    ///
    /// Returns the first error any runner terminated with.
    pub async fn stop(&mut self) -> Result<(), OrchestratorError> {
        if self.state != RunnerState::Running {
            return Err(OrchestratorError::NotRunning);
        }

        info!("Stopping orchestrator");
        self.shutdown.send_replace(true);
        self.join().await
    }

    /// Start every runner and wait until all of them have exited
    ///
    /// Loops exit on a stop request (see [`Orchestrator::shutdown_handle`])
    /// or when a runner terminates with an error. Returns the first error.
    pub async fn run(&mut self) -> Result<(), OrchestratorError> {
        self.start()?;
        self.join().await
    }

    async fn join(&mut self) -> Result<(), OrchestratorError> {
        for (runner_id, task) in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                error!(runner_id = %runner_id, error = %e, "Runner task aborted");
                self.lock_first_error().get_or_insert(RunnerError::Panicked {
                    runner_id,
                    message: e.to_string(),
                });
            }
        }

        self.state = RunnerState::Stopped;
        info!("Orchestrator stopped");

        match self.lock_first_error().take() {
            Some(e) => Err(OrchestratorError::Runner(e)),
            None => Ok(()),
        }
    }

    fn lock_first_error(&self) -> std::sync::MutexGuard<'_, Option<RunnerError>> {
        self.first_error.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("runners", &self.runner_ids())
            .field("state", &self.state)
            .finish()
    }
}
