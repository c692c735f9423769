//! Test: runner loops, shutdown, retries and failure isolation

use crate::helpers::*;
use std::time::Duration;
use ticketpipe::core::{CycleOutcome, OrchestratorConfig, RunnerState};
use ticketpipe::execution::OrchestratorEvent;
use ticketpipe::{Orchestrator, OrchestratorError, RunnerError};

fn orchestrator(yaml: &str, probes: &[(&str, &Probe)]) -> Orchestrator {
    let config = OrchestratorConfig::from_yaml(yaml).unwrap();
    Orchestrator::new(config, &host_with(probes)).unwrap()
}

/// An interval runner fires repeatedly and never overlaps itself
#[tokio::test]
async fn test_interval_runner_fires_without_overlap() {
    let probe = Probe::new(Behavior::Succeed).with_delay(Duration::from_millis(10));
    let mut orchestrator = orchestrator(
        r#"
runners:
  - id: ticker
    trigger:
      interval: { milliseconds: 50 }
    run:
      id: tick
      use: probe
"#,
        &[("probe", &probe)],
    );

    orchestrator.start().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    orchestrator.stop().await.unwrap();

    assert!(probe.calls() >= 4, "only {} calls", probe.calls());
    assert!(!probe.overlapped());

    let status = &orchestrator.status()[0];
    assert_eq!(status.state, RunnerState::Stopped);
    assert_eq!(status.cycles as usize, probe.calls());
    assert_eq!(status.last_outcome, Some(CycleOutcome::Succeeded));
}

/// Stop waits for every loop, after which nothing runs any more
#[tokio::test]
async fn test_stop_joins_every_runner() {
    let fast = Probe::new(Behavior::Succeed);
    let slow = Probe::new(Behavior::Succeed).with_delay(Duration::from_millis(40));
    let mut orchestrator = orchestrator(
        r#"
runners:
  - id: fast
    trigger:
      interval: { milliseconds: 10 }
    run: { id: f, use: fast }
  - id: slow
    trigger:
      interval: { milliseconds: 10 }
    run: { id: s, use: slow }
  - id: idle
    trigger:
      interval: { hours: 1 }
    run: { id: i, use: fast }
"#,
        &[("fast", &fast), ("slow", &slow)],
    );

    orchestrator.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.stop().await.unwrap();

    assert!(orchestrator
        .status()
        .iter()
        .all(|status| status.state == RunnerState::Stopped));

    let (fast_calls, slow_calls) = (fast.calls(), slow.calls());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(fast.calls(), fast_calls);
    assert_eq!(slow.calls(), slow_calls);
}

/// A panicking runner stops alone and its panic is reported on stop
#[tokio::test]
async fn test_panic_is_isolated_to_its_runner() {
    let boom = Probe::new(Behavior::Panic);
    let steady = Probe::new(Behavior::Succeed);
    let mut orchestrator = orchestrator(
        r#"
runners:
  - id: boom
    trigger:
      interval: { milliseconds: 10 }
    run: { id: explode, use: boom }
  - id: steady
    trigger:
      interval: { milliseconds: 10 }
    run: { id: work, use: steady }
"#,
        &[("boom", &boom), ("steady", &steady)],
    );

    orchestrator.start().unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let calls_after_panic = steady.calls();
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(boom.calls(), 1);
    assert!(steady.calls() > calls_after_panic);

    let statuses = orchestrator.status();
    assert_eq!(statuses[0].state, RunnerState::Stopped);
    assert!(statuses[0].error.as_deref().unwrap_or("").contains("exploded"));
    assert_eq!(statuses[1].state, RunnerState::Running);

    match orchestrator.stop().await {
        Err(OrchestratorError::Runner(RunnerError::Panicked { runner_id, message })) => {
            assert_eq!(runner_id, "boom");
            assert!(message.contains("probe explode exploded"));
        }
        other => panic!("expected a panic error, got {:?}", other),
    }
}

/// Failed attempts are retried with growing delays from the same starting context
#[tokio::test]
async fn test_retry_with_backoff() {
    let flaky = Probe::new(Behavior::FailFirst(2));
    let mut orchestrator = orchestrator(
        r#"
runners:
  - id: flaky
    trigger:
      interval: { seconds: 30 }
    retry:
      attempts: 3
      delay: 10
      backoff_factor: 2.0
    run: { id: attempt, use: flaky }
"#,
        &[("flaky", &flaky)],
    );
    let events = record_events(&orchestrator);

    orchestrator.start().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    orchestrator.stop().await.unwrap();

    assert_eq!(flaky.calls(), 3);

    let delays: Vec<(u32, Duration)> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            OrchestratorEvent::CycleRetrying { attempt, delay, .. } => Some((*attempt, *delay)),
            _ => None,
        })
        .collect();
    assert_eq!(
        delays,
        vec![(2, Duration::from_millis(10)), (3, Duration::from_millis(20))]
    );

    let status = &orchestrator.status()[0];
    assert_eq!(status.cycles, 1);
    assert_eq!(status.failed_cycles, 0);
    assert_eq!(status.last_outcome, Some(CycleOutcome::Succeeded));
}

/// Exhausted retries with `on_failure: stop` end the runner and `run`
#[tokio::test]
async fn test_on_failure_stop_terminates_run() {
    let failing = Probe::new(Behavior::Fail);
    let mut orchestrator = orchestrator(
        r#"
runners:
  - id: strict
    trigger:
      interval: { milliseconds: 10 }
    retry: { attempts: 2, delay: 5 }
    on_failure: stop
    run: { id: doomed, use: failing }
"#,
        &[("failing", &failing)],
    );

    let result = tokio::time::timeout(Duration::from_secs(5), orchestrator.run())
        .await
        .expect("run should end on its own");

    match result {
        Err(OrchestratorError::Runner(RunnerError::CycleFailed { runner_id, message })) => {
            assert_eq!(runner_id, "strict");
            assert!(message.contains("call 2 failed"));
        }
        other => panic!("expected a cycle failure, got {:?}", other),
    }
    assert_eq!(failing.calls(), 2);
    assert_eq!(orchestrator.status()[0].failed_cycles, 1);
}

/// `on_failure: continue` keeps the loop alive after a failed cycle
#[tokio::test]
async fn test_on_failure_continue_keeps_running() {
    let failing = Probe::new(Behavior::Fail);
    let mut orchestrator = orchestrator(
        r#"
runners:
  - id: lenient
    trigger:
      interval: { milliseconds: 10 }
    run: { id: doomed, use: failing }
"#,
        &[("failing", &failing)],
    );

    orchestrator.start().unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    orchestrator.stop().await.unwrap();

    let status = &orchestrator.status()[0];
    assert!(status.failed_cycles >= 2);
    assert_eq!(status.failed_cycles, status.cycles);
    assert!(status.error.is_none());
}

/// `context: carry` hands each cycle the previous cycle's context
#[tokio::test]
async fn test_carry_and_fresh_context() {
    let counter = Probe::new(Behavior::Count);
    let mut orchestrator = orchestrator(
        r#"
runners:
  - id: carried
    trigger:
      interval: { milliseconds: 10 }
    context: carry
    run: { id: count, use: counter }
  - id: fresh
    trigger:
      interval: { milliseconds: 10 }
    run: { id: count, use: counter }
"#,
        &[("counter", &counter)],
    );
    let events = record_events(&orchestrator);

    orchestrator.start().unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    orchestrator.stop().await.unwrap();

    let carried = finished_messages(&events, "carried");
    assert!(carried.len() >= 3);
    let expected: Vec<String> = (1..=carried.len()).map(|n| n.to_string()).collect();
    assert_eq!(carried, expected);

    let fresh = finished_messages(&events, "fresh");
    assert!(fresh.len() >= 3);
    assert!(fresh.iter().all(|message| message == "1"));
}

/// Runner params override the global ones inside expressions
#[tokio::test]
async fn test_runner_params_override_globals() {
    let probe = Probe::new(Behavior::Succeed);
    let mut orchestrator = orchestrator(
        r#"
params:
  queue: Inbox
  limit: 5
runners:
  - id: billing
    trigger:
      interval: { hours: 1 }
    params:
      queue: Billing
    run:
      id: check
      use: probe
      if: "{{ params.queue == 'Billing' and params.limit == 5 }}"
"#,
        &[("probe", &probe)],
    );
    let events = record_events(&orchestrator);

    orchestrator.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.stop().await.unwrap();

    assert_eq!(probe.calls(), 1);
    assert_eq!(finished_messages(&events, "billing"), vec!["call 1".to_string()]);
}
