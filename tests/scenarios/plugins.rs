//! Test: plugin installation and template extensions

use crate::helpers::*;
use serde_json::json;
use ticketpipe::core::OrchestratorConfig;
use ticketpipe::plugin::CORE_API_VERSION;
use ticketpipe::{
    Orchestrator, OrchestratorError, Plugin, PluginError, PluginHost, PluginMetadata,
    PipeRegistration,
};

struct ProbePlugin {
    name: &'static str,
    core_api: &'static str,
    probe: Probe,
}

impl Plugin for ProbePlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(self.name, "0.2.0", self.core_api)
    }

    fn register_pipes(&self) -> Vec<PipeRegistration> {
        vec![self.probe.registration("probe")]
    }
}

const CONFIG: &str = r#"
runners:
  - id: plugged
    trigger:
      interval: { hours: 1 }
    run: { id: p, use: probe }
"#;

#[test]
fn test_incompatible_plugin_is_rejected() {
    let mut host = PluginHost::new();
    let plugin = ProbePlugin {
        name: "future",
        core_api: "2.0",
        probe: Probe::new(Behavior::Succeed),
    };

    match host.install(&plugin) {
        Err(PluginError::IncompatibleApi { plugin, required, provided }) => {
            assert_eq!(plugin, "future");
            assert_eq!(required, "2.0");
            assert_eq!(provided, CORE_API_VERSION);
        }
        other => panic!("expected an API mismatch, got {:?}", other),
    }
    assert!(host.installed().is_empty());
    assert!(!host.pipes().contains("probe"));

    // Nothing was registered, so the config cannot be used
    let config = OrchestratorConfig::from_yaml(CONFIG).unwrap();
    assert!(matches!(
        Orchestrator::new(config, &host),
        Err(OrchestratorError::Config(_))
    ));
}

#[tokio::test]
async fn test_installed_plugin_pipe_runs_on_schedule() {
    let probe = Probe::new(Behavior::Succeed);
    let mut host = PluginHost::new();
    host.install(&ProbePlugin {
        name: "probes",
        core_api: CORE_API_VERSION,
        probe: probe.clone(),
    })
    .unwrap();
    assert_eq!(host.installed()[0].name, "probes");

    let config = OrchestratorConfig::from_yaml(CONFIG).unwrap();
    let mut orchestrator = Orchestrator::new(config, &host).unwrap();
    orchestrator.start().unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    orchestrator.stop().await.unwrap();

    assert_eq!(probe.calls(), 1);
}

#[test]
fn test_plugin_cannot_shadow_existing_types() {
    let mut host = PluginHost::new();
    let first = ProbePlugin {
        name: "first",
        core_api: "1.0",
        probe: Probe::new(Behavior::Succeed),
    };
    let second = ProbePlugin {
        name: "second",
        core_api: "1.0",
        probe: Probe::new(Behavior::Fail),
    };

    host.install(&first).unwrap();
    assert!(matches!(
        host.install(&second),
        Err(PluginError::DuplicateRegistration(uses)) if uses == "probe"
    ));
    assert!(matches!(
        host.install(&first),
        Err(PluginError::DuplicateRegistration(name)) if name == "first"
    ));
    assert_eq!(host.installed().len(), 1);
}

#[tokio::test]
async fn test_extension_function_in_expressions() {
    let host = PluginHost::new();
    host.extensions()
        .register_function("double", |args| match args.first().and_then(|v| v.as_i64()) {
            Some(n) => Ok(json!(n * 2)),
            None => Err("double expects an integer".to_string()),
        });
    host.extensions().register_value("team", || json!("support"));

    let factory = host.factory(&[]).unwrap();
    let config = pipe_from_yaml(
        r#"
id: main
use: composite
steps:
  - id: doubled
    use: expression
    params:
      expression: "{{ double(params.n) }}"
  - id: owner
    use: expression
    params:
      expression: "{{ team }}"
  - id: misuse
    use: expression
    params:
      expression: "{{ double('x') }}"
"#,
    );

    let context = run_pipe(&factory, &config, json!({"n": 21})).await;

    assert_eq!(context.get_result("doubled").unwrap().get("value"), Some(&json!(42)));
    assert_eq!(context.get_result("owner").unwrap().get("value"), Some(&json!("support")));
    assert_failed(&context, "misuse", "double expects an integer");
}
