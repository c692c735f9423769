//! Test: ticket automation against the in-memory backend

use crate::helpers::*;
use serde_json::json;
use ticketpipe::core::{CycleOutcome, OrchestratorConfig};
use ticketpipe::ticket::UnifiedEntity;
use ticketpipe::{Orchestrator, PipeContext, PluginHost};

const TRIAGE: &str = r#"
params:
  queue: Inbox
services:
  - id: helpdesk
    use: in_memory
    params:
      tickets:
        - id: T-1
          subject: VPN down
          queue: { name: Inbox }
        - id: T-2
          subject: Invoice
          queue: { name: Billing }
runners:
  - id: triage
    trigger:
      interval: { hours: 1 }
    run:
      id: triage
      use: composite
      steps:
        - id: fetch
          use: fetch_tickets
          params:
            ticket_system: helpdesk
            criteria:
              queue: { name: "{{ params.queue }}" }
              limit: 1
        - id: prioritize
          use: update_ticket
          depends_on: fetch
          if: "{{ pipe_results.fetch.data.fetched_tickets | length > 0 }}"
          params:
            ticket_system: helpdesk
            ticket_id: "{{ pipe_results.fetch.data.fetched_tickets[0].id }}"
            updated_ticket:
              priority: { name: high }
        - id: annotate
          use: add_note
          depends_on: prioritize
          params:
            ticket_system: helpdesk
            ticket_id: "{{ pipe_results.prioritize.data.ticket_id }}"
            note: "Escalated: {{ pipe_results.fetch.data.fetched_tickets[0].subject }}"
"#;

/// Build the triage pipe and run it once with the given queue
async fn run_triage(queue: &str) -> (PipeContext, ticketpipe::PipeFactory) {
    let config = OrchestratorConfig::from_yaml(TRIAGE).unwrap();
    let factory = PluginHost::new().factory(&config.services).unwrap();
    let runner = &config.runners[0];

    let mut params = config.runner_params(runner);
    params.insert("queue".into(), json!(queue));

    let pipe = factory.build(&runner.run).unwrap();
    let context = pipe.process(PipeContext::with_params(params)).await;
    (context, factory)
}

#[tokio::test]
async fn test_triage_updates_and_annotates_ticket() {
    let (context, factory) = run_triage("Inbox").await;

    assert_succeeded(&context, "fetch");
    assert_succeeded(&context, "prioritize");
    assert_succeeded(&context, "annotate");
    assert_succeeded(&context, "triage");
    assert_eq!(
        context.get_result("triage").unwrap().get("executed"),
        Some(&json!(["fetch", "prioritize", "annotate"]))
    );

    let helpdesk = factory.ticket_system("helpdesk").unwrap();
    let ticket = helpdesk.get_ticket("T-1").await.unwrap().unwrap();
    assert_eq!(ticket.priority, Some(UnifiedEntity::named("high")));
    assert_eq!(ticket.subject.as_deref(), Some("VPN down"));
    assert_eq!(ticket.notes.len(), 1);
    assert_eq!(ticket.notes[0].body, "Escalated: VPN down");

    let untouched = helpdesk.get_ticket("T-2").await.unwrap().unwrap();
    assert!(untouched.priority.is_none());
    assert!(untouched.notes.is_empty());
}

#[tokio::test]
async fn test_empty_queue_skips_the_rest() {
    let (context, factory) = run_triage("Sales").await;

    assert_succeeded(&context, "fetch");
    assert_eq!(
        context.get_result("fetch").unwrap().get("fetched_tickets"),
        Some(&json!([]))
    );
    assert_not_run(&context, "prioritize");
    assert_not_run(&context, "annotate");
    assert_succeeded(&context, "triage");

    let helpdesk = factory.ticket_system("helpdesk").unwrap();
    for id in ["T-1", "T-2"] {
        let ticket = helpdesk.get_ticket(id).await.unwrap().unwrap();
        assert!(ticket.priority.is_none());
    }
}

#[tokio::test]
async fn test_unknown_ticket_system_fails_the_pipe() {
    let yaml = TRIAGE.replace(
        "ticket_system: helpdesk\n            criteria",
        "ticket_system: nowhere\n            criteria",
    );
    let config = OrchestratorConfig::from_yaml(&yaml).unwrap();
    let factory = PluginHost::new().factory(&config.services).unwrap();

    let context = run_pipe(&factory, &config.runners[0].run, json!({"queue": "Inbox"})).await;

    assert_failed(&context, "fetch", "nowhere");
    // The condition reads data the failed fetch never produced
    assert!(context.get_result("prioritize").unwrap().is_failure());
    assert_not_run(&context, "annotate");
    assert!(context.get_result("triage").unwrap().is_failure());
}

#[tokio::test]
async fn test_triage_runner_on_schedule() {
    let config = OrchestratorConfig::from_yaml(TRIAGE).unwrap();
    let mut orchestrator = Orchestrator::new(config, &PluginHost::new()).unwrap();
    let events = record_events(&orchestrator);

    orchestrator.start().unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    orchestrator.stop().await.unwrap();

    let status = &orchestrator.status()[0];
    assert_eq!(status.cycles, 1);
    assert_eq!(status.last_outcome, Some(CycleOutcome::Succeeded));
    assert_eq!(finished_messages(&events, "triage").len(), 1);
}
