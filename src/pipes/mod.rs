//! Pipes - the units of work run against a context
//!
//! A [`Pipe`] pairs a raw [`PipeConfig`] with a [`PipeHandler`] body. The
//! pipe owns the lifecycle shared by every kind of work: render the
//! configuration, check the run gates, call the body and record a result.
//! Handlers only implement the body.

pub mod composite;
pub mod expression;
pub mod registry;
pub mod tickets;

use crate::core::condition::{check_gates, condition_holds};
use crate::core::{PipeConfig, PipeContext, PipeResult, RenderedPipeConfig};
use crate::template::{RenderPolicy, TemplateError, TemplateRenderer};
use crate::ticket::TicketSystemError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub use composite::CompositeHandler;
pub use expression::ExpressionHandler;
pub use registry::{PipeConstructor, PipeFactory, PipeRegistration, PipeRegistry};
pub use tickets::{AddNoteHandler, FetchTicketsHandler, UpdateTicketHandler};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipeError {
    #[error("Unknown pipe type: {0}")]
    UnknownPipeType(String),

    #[error("Invalid parameters for pipe '{pipe_id}': {message}")]
    InvalidParams { pipe_id: String, message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    TicketSystem(#[from] TicketSystemError),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("{0}")]
    Execution(String),
}

/// The body of a pipe
#[async_trait]
pub trait PipeHandler: Send + Sync {
    /// Do the pipe's work
    ///
    /// Called only once the gates have passed. `rendered` holds the
    /// configuration resolved against `context`. Composites use `context`
    /// to run their children; leaf handlers normally only read it.
    async fn handle(
        &self,
        rendered: &RenderedPipeConfig,
        context: &mut PipeContext,
    ) -> Result<PipeResult, PipeError>;

    /// Parameters left as raw templates when the pipe is rendered
    ///
    /// For handlers that evaluate these parameters themselves.
    fn raw_params(&self) -> &[&'static str] {
        &[]
    }
}

/// A configured unit of work
pub struct Pipe {
    config: PipeConfig,
    handler: Arc<dyn PipeHandler>,
    renderer: Arc<TemplateRenderer>,
}

impl Pipe {
    pub fn new(
        config: PipeConfig,
        handler: Arc<dyn PipeHandler>,
        renderer: Arc<TemplateRenderer>,
    ) -> Self {
        Self {
            config,
            handler,
            renderer,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &PipeConfig {
        &self.config
    }

    /// Resolve the raw configuration against a template scope
    ///
    /// The `if` expression is rendered strictly. Parameters are rendered
    /// best-effort, so an unresolvable parameter keeps its template text.
    /// The handler's raw parameters are passed through unrendered.
    pub fn render(&self, scope: &Map<String, Value>) -> Result<RenderedPipeConfig, TemplateError> {
        let condition = self
            .renderer
            .render(&self.config.condition, scope, RenderPolicy::Strict)?;

        let mut templated = self.config.params.clone();
        let raw: Vec<(String, Value)> = self
            .handler
            .raw_params()
            .iter()
            .filter_map(|key| templated.remove(*key).map(|value| (key.to_string(), value)))
            .collect();
        let mut params = self
            .renderer
            .render_map(&templated, scope, RenderPolicy::BestEffort)?;
        params.extend(raw);

        Ok(RenderedPipeConfig {
            id: self.config.id.clone(),
            uses: self.config.uses.clone(),
            should_run: condition_holds(&condition),
            depends_on: self.config.depends_on.clone(),
            params,
            steps: self.config.steps.clone(),
        })
    }

    /// Run the pipe against a context and hand the context back
    ///
    /// A skipped pipe returns the context untouched. Otherwise exactly one
    /// result is recorded under the pipe's id; body errors become failed
    /// results and never escape.
    pub async fn process(&self, mut context: PipeContext) -> PipeContext {
        let pipe_id = self.config.id.as_str();

        let rendered = match self.render(&context.template_scope()) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(pipe_id = %pipe_id, error = %e, "Failed to render pipe configuration");
                context.set_result(pipe_id, PipeResult::failure(e.to_string()));
                return context;
            }
        };

        if let Some(reason) = check_gates(rendered.should_run, &rendered.depends_on, &context) {
            debug!(pipe_id = %pipe_id, reason = %reason, "Skipping pipe");
            return context;
        }

        debug!(pipe_id = %pipe_id, uses = %rendered.uses, "Running pipe");
        let result = match self.handler.handle(&rendered, &mut context).await {
            Ok(result) => result,
            Err(e) => {
                warn!(pipe_id = %pipe_id, error = %e, "Pipe failed");
                PipeResult::failure(e.to_string())
            }
        };

        context.set_result(pipe_id, result);
        context
    }
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe")
            .field("id", &self.config.id)
            .field("uses", &self.config.uses)
            .finish()
    }
}

/// Read a required parameter from a rendered configuration
pub fn required_param<'a>(
    rendered: &'a RenderedPipeConfig,
    key: &str,
) -> Result<&'a Value, PipeError> {
    rendered
        .params
        .get(key)
        .filter(|value| !value.is_null())
        .ok_or_else(|| PipeError::InvalidParams {
            pipe_id: rendered.id.clone(),
            message: format!("missing parameter '{}'", key),
        })
}

/// Read a required string parameter; numbers are accepted as text
pub fn required_str(rendered: &RenderedPipeConfig, key: &str) -> Result<String, PipeError> {
    match required_param(rendered, key)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(PipeError::InvalidParams {
            pipe_id: rendered.id.clone(),
            message: format!("parameter '{}' must be a string, got {}", key, other),
        }),
    }
}

/// Deserialize a parameter into a typed value
pub fn typed_param<T: serde::de::DeserializeOwned>(
    rendered: &RenderedPipeConfig,
    key: &str,
) -> Result<T, PipeError> {
    let value = required_param(rendered, key)?.clone();
    serde_json::from_value(value).map_err(|e| PipeError::InvalidParams {
        pipe_id: rendered.id.clone(),
        message: format!("parameter '{}': {}", key, e),
    })
}
