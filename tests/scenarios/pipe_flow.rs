//! Test: pipe gates, composites and templating between steps

use crate::helpers::*;
use serde_json::json;
use ticketpipe::PipeContext;

/// A pipe whose `if` is false leaves the context exactly as it was
#[tokio::test]
async fn test_false_condition_returns_context_untouched() {
    let probe = Probe::new(Behavior::Succeed);
    let factory = host_with(&[("probe", &probe)]).factory(&[]).unwrap();
    let config = pipe_from_yaml(
        r#"
id: guarded
use: probe
if: "{{ params.enabled }}"
"#,
    );

    let pipe = factory.build(&config).unwrap();
    let mut before = PipeContext::new();
    before.params.insert("enabled".into(), json!(false));

    let after = pipe.process(before.clone()).await;

    assert_eq!(after, before);
    assert_eq!(probe.calls(), 0);
}

/// A failure skips its direct and indirect dependents, not its siblings
#[tokio::test]
async fn test_dependency_skip_propagates() {
    let failing = Probe::new(Behavior::Fail);
    let ok = Probe::new(Behavior::Succeed);
    let factory = host_with(&[("fail", &failing), ("ok", &ok)])
        .factory(&[])
        .unwrap();
    let config = pipe_from_yaml(
        r#"
id: main
use: composite
steps:
  - id: a
    use: fail
  - id: b
    use: ok
    depends_on: a
  - id: c
    use: ok
    depends_on: [b]
  - id: d
    use: ok
"#,
    );

    let context = run_pipe(&factory, &config, json!({})).await;

    assert_failed(&context, "a", "call 1 failed");
    assert_not_run(&context, "b");
    assert_not_run(&context, "c");
    assert_succeeded(&context, "d");
    assert_eq!(ok.calls(), 1);

    let main = context.get_result("main").unwrap();
    assert!(main.is_failure());
    assert_eq!(main.get("executed"), Some(&json!(["a", "d"])));
}

/// Every child runs even after an earlier one failed
#[tokio::test]
async fn test_composite_continues_after_failure() {
    let failing = Probe::new(Behavior::Fail);
    let ok = Probe::new(Behavior::Succeed);
    let factory = host_with(&[("fail", &failing), ("ok", &ok)])
        .factory(&[])
        .unwrap();
    let config = pipe_from_yaml(
        r#"
id: main
use: composite
steps:
  - id: a
    use: fail
  - id: b
    use: ok
  - id: c
    use: ok
"#,
    );

    let context = run_pipe(&factory, &config, json!({})).await;

    assert_failed(&context, "a", "failed");
    assert_succeeded(&context, "b");
    assert_succeeded(&context, "c");
    assert_failed(&context, "main", "call 1 failed; call 1; call 2");
}

/// Later steps read earlier results, ambient params and the parent's params
#[tokio::test]
async fn test_results_flow_between_steps() {
    let factory = builtin_factory();
    let config = pipe_from_yaml(
        r#"
id: main
use: composite
params:
  queue: "{{ params.queue }}"
steps:
  - id: answer
    use: expression
    params:
      expression: "{{ 6 * 7 }}"
  - id: next
    use: expression
    if: "{{ pipe_results.answer.succeeded }}"
    params:
      expression: "{{ pipe_results.answer.data.value + 1 }}"
  - id: label
    use: expression
    params:
      expression: "{{ parent_params.queue | upper }}-{{ pipe_results.next.data.value }}"
"#,
    );

    let context = run_pipe(&factory, &config, json!({"queue": "inbox"})).await;

    assert_eq!(context.get_result("answer").unwrap().get("value"), Some(&json!(42)));
    assert_eq!(context.get_result("next").unwrap().get("value"), Some(&json!(43)));
    assert_eq!(
        context.get_result("label").unwrap().get("value"),
        Some(&json!("INBOX-43"))
    );
    assert!(context.parent_params.is_empty());
}

/// A strict render failure in a child fails that child only
#[tokio::test]
async fn test_broken_condition_fails_only_that_child() {
    let factory = builtin_factory();
    let config = pipe_from_yaml(
        r#"
id: main
use: composite
steps:
  - id: broken
    use: expression
    if: "{{ pipe_results.missing.succeeded }}"
    params:
      expression: "{{ 1 }}"
  - id: fine
    use: expression
    params:
      expression: "{{ 2 }}"
"#,
    );

    let context = run_pipe(&factory, &config, json!({})).await;

    assert!(context.get_result("broken").unwrap().is_failure());
    assert_succeeded(&context, "fine");
    assert!(context.get_result("main").unwrap().is_failure());
}

/// Arithmetic overflow in one child is a failed result, not a crash
#[tokio::test]
async fn test_overflow_fails_only_that_child() {
    let factory = builtin_factory();
    let config = pipe_from_yaml(
        r#"
id: main
use: composite
steps:
  - id: remainder
    use: expression
    params:
      expression: "{{ params.n % -1 }}"
  - id: quotient
    use: expression
    params:
      expression: "{{ params.n // -1 }}"
  - id: after
    use: expression
    params:
      expression: "{{ 1 + 1 }}"
"#,
    );

    let context = run_pipe(&factory, &config, json!({"n": i64::MIN})).await;

    assert_failed(&context, "remainder", "integer overflow");
    assert_failed(&context, "quotient", "integer overflow");
    assert_eq!(context.get_result("after").unwrap().get("value"), Some(&json!(2)));
    assert!(context.get_result("main").unwrap().is_failure());
}
