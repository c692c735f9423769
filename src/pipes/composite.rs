//! Composite pipe - runs an ordered list of children

use crate::core::{PipeContext, PipeResult, RenderedPipeConfig};
use crate::pipes::{PipeError, PipeFactory, PipeHandler};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

/// Runs every child in order, whatever earlier children returned
///
/// A child that must not run after a failure declares `depends_on`. The
/// composite's result is the union of the results its children recorded
/// during this run, and its data lists them under `executed`.
#[derive(Debug, Clone)]
pub struct CompositeHandler {
    factory: PipeFactory,
}

impl CompositeHandler {
    pub fn new(factory: PipeFactory) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl PipeHandler for CompositeHandler {
    async fn handle(
        &self,
        rendered: &RenderedPipeConfig,
        context: &mut PipeContext,
    ) -> Result<PipeResult, PipeError> {
        let outer_params = context.replace_parent_params(rendered.params.clone());
        let mut ctx = std::mem::take(context);

        let mut executed = Vec::new();
        let mut results = Vec::new();

        for step in &rendered.steps {
            let revision = ctx.revision;

            ctx = match self.factory.build(step) {
                Ok(pipe) => pipe.process(ctx).await,
                Err(e) => {
                    warn!(pipe_id = %step.id, error = %e, "Failed to build child pipe");
                    ctx.set_result(&step.id, PipeResult::failure(e.to_string()));
                    ctx
                }
            };

            if ctx.revision == revision {
                continue;
            }
            if let Some(result) = ctx.get_result(&step.id) {
                executed.push(Value::String(step.id.clone()));
                results.push(result.clone());
            }
        }

        ctx.replace_parent_params(outer_params);
        *context = ctx;

        debug!(
            pipe_id = %rendered.id,
            executed = executed.len(),
            total = rendered.steps.len(),
            "Composite finished"
        );

        Ok(PipeResult::union(&results).with_value("executed", Value::Array(executed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipeConfig;
    use crate::pipes::{PipeRegistration, PipeRegistry};
    use crate::plugin::ServiceRegistry;
    use crate::template::TemplateRenderer;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// Records the order it is called in and returns a fixed outcome
    struct Step {
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl PipeHandler for Step {
        async fn handle(
            &self,
            rendered: &RenderedPipeConfig,
            _context: &mut PipeContext,
        ) -> Result<PipeResult, PipeError> {
            self.log.lock().unwrap().push(rendered.id.clone());
            if self.fail {
                Ok(PipeResult::failure(format!("{} failed", rendered.id)))
            } else {
                Ok(PipeResult::success().with_value(rendered.id.clone(), json!(true)))
            }
        }
    }

    fn factory(log: &Arc<Mutex<Vec<String>>>) -> PipeFactory {
        let mut registry = PipeRegistry::with_builtins();
        for (name, fail) in [("ok", false), ("bad", true)] {
            let log = Arc::clone(log);
            registry.register(PipeRegistration::new(name, move |_, _| {
                Ok(Arc::new(Step {
                    log: Arc::clone(&log),
                    fail,
                }) as Arc<dyn PipeHandler>)
            }));
        }
        PipeFactory::new(
            Arc::new(registry),
            Arc::new(ServiceRegistry::new()),
            Arc::new(TemplateRenderer::new()),
        )
    }

    #[tokio::test]
    async fn test_all_children_run_after_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = PipeConfig::new("main", "composite").with_steps(vec![
            PipeConfig::new("a", "bad"),
            PipeConfig::new("b", "ok"),
            PipeConfig::new("c", "ok").with_depends_on(["a"]),
        ]);

        let pipe = factory(&log).build(&config).unwrap();
        let ctx = pipe.process(PipeContext::new()).await;

        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        let main = ctx.get_result("main").unwrap();
        assert!(main.is_failure());
        assert_eq!(main.message(), "a failed");
        assert_eq!(main.get("executed"), Some(&json!(["a", "b"])));
        assert_eq!(main.get("b"), Some(&json!(true)));
        assert!(!ctx.has_result("c"));
    }

    #[tokio::test]
    async fn test_empty_composite_succeeds() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipe = factory(&log).build(&PipeConfig::new("main", "composite")).unwrap();
        let ctx = pipe.process(PipeContext::new()).await;

        let main = ctx.get_result("main").unwrap();
        assert!(main.is_success());
        assert_eq!(main.get("executed"), Some(&json!([])));
    }

    #[tokio::test]
    async fn test_unknown_child_records_failure_and_continues() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = PipeConfig::new("main", "composite").with_steps(vec![
            PipeConfig::new("ghost", "does_not_exist"),
            PipeConfig::new("b", "ok"),
        ]);

        let pipe = factory(&log).build(&config).unwrap();
        let ctx = pipe.process(PipeContext::new()).await;

        assert!(ctx.has_failed("ghost"));
        assert!(ctx.get_result("b").unwrap().is_success());
        assert!(ctx.has_failed("main"));
    }

    #[tokio::test]
    async fn test_parent_params_are_scoped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = PipeConfig::new("main", "composite")
            .with_param("ticket_id", json!("42"))
            .with_steps(vec![PipeConfig::new("read", "expression")
                .with_param("expression", json!("{{ get_parent_param('ticket_id') }}"))]);

        let pipe = factory(&log).build(&config).unwrap();
        let ctx = pipe.process(PipeContext::new()).await;

        assert_eq!(ctx.get_result("read").unwrap().get("value"), Some(&json!(42)));
        assert!(ctx.parent_params.is_empty());
    }

    #[tokio::test]
    async fn test_stale_results_are_not_counted() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = PipeConfig::new("main", "composite").with_steps(vec![
            PipeConfig::new("a", "ok").with_condition(false),
            PipeConfig::new("b", "ok"),
        ]);

        let mut ctx = PipeContext::new();
        ctx.set_result("a", PipeResult::failure("previous cycle"));

        let pipe = factory(&log).build(&config).unwrap();
        let ctx = pipe.process(ctx).await;

        let main = ctx.get_result("main").unwrap();
        assert!(main.is_success());
        assert_eq!(main.get("executed"), Some(&json!(["b"])));
    }
}
