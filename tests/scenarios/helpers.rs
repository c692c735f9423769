//! Test utility functions for ticketpipe scenarios

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticketpipe::core::{PipeConfig, RenderedPipeConfig};
use ticketpipe::execution::OrchestratorEvent;
use ticketpipe::{
    Orchestrator, PipeContext, PipeError, PipeFactory, PipeHandler, PipeRegistration, PipeResult,
    PluginHost,
};

/// What a probe handler does when called
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    /// Fail the first `n` calls, then succeed
    FailFirst(usize),
    Panic,
    /// Count how often this pipe has recorded a result in the context it was given
    Count,
}

/// Shared observation point for a probe handler
#[derive(Debug, Clone)]
pub struct Probe {
    behavior: Behavior,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    overlapped: Arc<AtomicBool>,
}

impl Probe {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            overlapped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether two calls were ever in progress at the same time
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    /// A pipe type backed by this probe
    pub fn registration(&self, uses: &str) -> PipeRegistration {
        let probe = self.clone();
        PipeRegistration::new(uses, move |_, _| {
            Ok(Arc::new(ProbeHandler {
                probe: probe.clone(),
            }) as Arc<dyn PipeHandler>)
        })
    }
}

struct ProbeHandler {
    probe: Probe,
}

#[async_trait]
impl PipeHandler for ProbeHandler {
    async fn handle(
        &self,
        rendered: &RenderedPipeConfig,
        context: &mut PipeContext,
    ) -> Result<PipeResult, PipeError> {
        let probe = &self.probe;
        if probe.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            probe.overlapped.store(true, Ordering::SeqCst);
        }
        let call = probe.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = probe.delay {
            tokio::time::sleep(delay).await;
        }
        probe.in_flight.fetch_sub(1, Ordering::SeqCst);

        match probe.behavior {
            Behavior::Succeed => Ok(PipeResult::success().with_message(format!("call {}", call))),
            Behavior::Fail => Err(PipeError::Execution(format!("call {} failed", call))),
            Behavior::FailFirst(n) if call <= n => {
                Err(PipeError::Execution(format!("call {} failed", call)))
            }
            Behavior::FailFirst(_) => Ok(PipeResult::success()),
            Behavior::Panic => panic!("probe {} exploded", rendered.id),
            Behavior::Count => {
                let seen = context
                    .get_result(&rendered.id)
                    .and_then(|r| r.get("count"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                Ok(PipeResult::success()
                    .with_message((seen + 1).to_string())
                    .with_value("count", json!(seen + 1)))
            }
        }
    }
}

/// A plugin host with the built-ins plus the given probes
pub fn host_with(probes: &[(&str, &Probe)]) -> PluginHost {
    let mut host = PluginHost::new();
    for (uses, probe) in probes {
        host.register_pipe(probe.registration(uses));
    }
    host
}

/// Factory over the built-ins with no services
pub fn builtin_factory() -> PipeFactory {
    PluginHost::new().factory(&[]).unwrap()
}

pub fn pipe_from_yaml(yaml: &str) -> PipeConfig {
    PipeConfig::from_yaml(yaml).unwrap()
}

/// Build and process one pipe against a fresh context
pub async fn run_pipe(factory: &PipeFactory, config: &PipeConfig, params: Value) -> PipeContext {
    let params: Map<String, Value> = params.as_object().cloned().unwrap_or_default();
    let pipe = factory.build(config).unwrap();
    pipe.process(PipeContext::with_params(params)).await
}

/// Collect every event an orchestrator emits
pub fn record_events(orchestrator: &Orchestrator) -> Arc<Mutex<Vec<OrchestratorEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    orchestrator.add_event_handler(move |event| sink.lock().unwrap().push(event));
    events
}

/// `CycleFinished` messages of one runner, in order
pub fn finished_messages(events: &Mutex<Vec<OrchestratorEvent>>, runner: &str) -> Vec<String> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            OrchestratorEvent::CycleFinished {
                runner_id, message, ..
            } if runner_id == runner => Some(message.clone()),
            _ => None,
        })
        .collect()
}

// Assertion helpers

pub fn assert_succeeded(context: &PipeContext, pipe_id: &str) {
    let result = context
        .get_result(pipe_id)
        .unwrap_or_else(|| panic!("Pipe '{}' recorded no result", pipe_id));
    assert!(
        result.is_success(),
        "Pipe '{}' should have succeeded, got {:?}",
        pipe_id,
        result
    );
}

pub fn assert_failed(context: &PipeContext, pipe_id: &str, message_contains: &str) {
    let result = context
        .get_result(pipe_id)
        .unwrap_or_else(|| panic!("Pipe '{}' recorded no result", pipe_id));
    assert!(result.is_failure(), "Pipe '{}' should have failed, got {:?}", pipe_id, result);
    assert!(
        result.message().contains(message_contains),
        "Pipe '{}' message '{}' should contain '{}'",
        pipe_id,
        result.message(),
        message_contains
    );
}

pub fn assert_not_run(context: &PipeContext, pipe_id: &str) {
    assert!(
        !context.has_result(pipe_id),
        "Pipe '{}' should not have run, got {:?}",
        pipe_id,
        context.get_result(pipe_id)
    );
}
