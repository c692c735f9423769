//! Template rendering for pipe configuration
//!
//! Configuration values may embed expressions between `{{` and `}}`. The
//! expression language is a small Jinja-like subset: literals, names,
//! attribute and index access, arithmetic, comparisons, boolean logic,
//! function calls and `value | filter(...)` chains. Evaluation happens
//! against a scope built from the pipe context (see
//! [`PipeContext::template_scope`](crate::core::PipeContext::template_scope)).

pub mod eval;
pub mod extensions;
pub mod lexer;
pub mod parser;
pub mod renderer;

pub use extensions::{TemplateExtensions, TemplateFunction, ValueProvider};
pub use renderer::{RenderPolicy, TemplateRenderer};

use serde_json::Value;
use thiserror::Error;

/// Scope key holding the results recorded so far
pub const PIPE_RESULTS_KEY: &str = "pipe_results";

/// Scope key holding the ambient parameters
pub const PARAMS_KEY: &str = "params";

/// Scope key holding the parameters of the enclosing composite
pub const PARENT_PARAMS_KEY: &str = "parent_params";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Syntax error in '{expression}': {message}")]
    Syntax { expression: String, message: String },

    #[error("Undefined name '{0}'")]
    UnknownName(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Lookup error: {0}")]
    Index(String),

    #[error("Extension '{name}' failed: {message}")]
    Extension { name: String, message: String },

    /// Raised by `fail(...)`; never swallowed by best-effort rendering
    #[error("{0}")]
    Failed(String),
}

/// Truthiness of a value: null, false, zero and empty collections are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text form of a value as it appears in rendered output
///
/// Strings are inserted raw, everything else as JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
