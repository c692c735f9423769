//! Expression pipe - evaluates a template and records the value

use crate::core::{PipeConfig, PipeContext, PipeResult, RenderedPipeConfig};
use crate::pipes::{PipeError, PipeFactory, PipeHandler};
use crate::template::{RenderPolicy, TemplateRenderer};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Records the value of `params.expression` under `data.value`
///
/// The expression is rendered strictly against the current context, so
/// an undefined name or a `fail(...)` call fails the pipe. It is evaluated
/// once per run; the pipe's own parameter rendering leaves it alone.
#[derive(Debug)]
pub struct ExpressionHandler {
    expression: Value,
    renderer: Arc<TemplateRenderer>,
}

impl ExpressionHandler {
    pub fn from_config(config: &PipeConfig, factory: &PipeFactory) -> Result<Self, PipeError> {
        let expression = config
            .params
            .get("expression")
            .cloned()
            .ok_or_else(|| PipeError::InvalidParams {
                pipe_id: config.id.clone(),
                message: "missing parameter 'expression'".to_string(),
            })?;

        Ok(Self {
            expression,
            renderer: Arc::clone(factory.renderer()),
        })
    }
}

#[async_trait]
impl PipeHandler for ExpressionHandler {
    async fn handle(
        &self,
        _rendered: &RenderedPipeConfig,
        context: &mut PipeContext,
    ) -> Result<PipeResult, PipeError> {
        let value = self.renderer.render_recursive(
            &self.expression,
            &context.template_scope(),
            RenderPolicy::Strict,
        )?;
        Ok(PipeResult::success().with_value("value", value))
    }

    fn raw_params(&self) -> &[&'static str] {
        &["expression"]
    }
}
