//! Rendering of `{{ ... }}` templates inside configuration values

use crate::template::eval::Evaluator;
use crate::template::extensions::TemplateExtensions;
use crate::template::parser::parse;
use crate::template::{value_to_text, TemplateError};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::warn;

/// What to do when an expression cannot be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPolicy {
    /// Log a warning and keep the original, unrendered value
    #[default]
    BestEffort,
    /// Return the error to the caller
    Strict,
}

/// Renders template strings against a scope
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    extensions: Arc<TemplateExtensions>,
}

/// A piece of a template string
#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Expression(&'a str),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a renderer that shares an extension registry
    pub fn with_extensions(extensions: Arc<TemplateExtensions>) -> Self {
        Self { extensions }
    }

    pub fn extensions(&self) -> &Arc<TemplateExtensions> {
        &self.extensions
    }

    /// Render a single value
    ///
    /// Non-string values pass through unchanged. A string containing
    /// expressions is rendered to text and parsed back into a native value
    /// when the text is a literal (`"{{ 5 + 5 }}"` renders to `10`).
    pub fn render(
        &self,
        value: &Value,
        scope: &Map<String, Value>,
        policy: RenderPolicy,
    ) -> Result<Value, TemplateError> {
        let template = match value {
            Value::String(template) => template,
            other => return Ok(other.clone()),
        };

        match self.render_str(template, scope) {
            Ok(rendered) => Ok(rendered),
            Err(e @ TemplateError::Failed(_)) => Err(e),
            Err(e) if policy == RenderPolicy::BestEffort => {
                warn!(template = %template, error = %e, "Failed to render template, keeping it as is");
                Ok(value.clone())
            }
            Err(e) => Err(e),
        }
    }

    /// Render every string leaf of a nested structure
    pub fn render_recursive(
        &self,
        value: &Value,
        scope: &Map<String, Value>,
        policy: RenderPolicy,
    ) -> Result<Value, TemplateError> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.render_recursive(item, scope, policy))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut rendered = Map::new();
                for (key, item) in map {
                    rendered.insert(key.clone(), self.render_recursive(item, scope, policy)?);
                }
                Ok(Value::Object(rendered))
            }
            other => self.render(other, scope, policy),
        }
    }

    /// Render a map of parameters
    pub fn render_map(
        &self,
        params: &Map<String, Value>,
        scope: &Map<String, Value>,
        policy: RenderPolicy,
    ) -> Result<Map<String, Value>, TemplateError> {
        let mut rendered = Map::new();
        for (key, value) in params {
            rendered.insert(key.clone(), self.render_recursive(value, scope, policy)?);
        }
        Ok(rendered)
    }

    /// Render a template string, failing on the first bad expression
    pub fn render_str(
        &self,
        template: &str,
        scope: &Map<String, Value>,
    ) -> Result<Value, TemplateError> {
        let segments = split_template(template)?;
        if !segments.iter().any(|s| matches!(s, Segment::Expression(_))) {
            return Ok(Value::String(template.to_string()));
        }

        let evaluator = Evaluator::new(scope, &self.extensions);
        let mut output = String::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Expression(source) => {
                    let value = evaluator.eval(&parse(source)?)?;
                    output.push_str(&value_to_text(&value));
                }
            }
        }

        Ok(parse_literal(&output).unwrap_or(Value::String(output)))
    }

    /// Evaluate a bare expression (no delimiters) to a value
    pub fn evaluate(
        &self,
        expression: &str,
        scope: &Map<String, Value>,
    ) -> Result<Value, TemplateError> {
        Evaluator::new(scope, &self.extensions).eval(&parse(expression)?)
    }
}

/// Split a template into text and expression segments
fn split_template(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut remaining = template;

    while let Some(start) = remaining.find("{{") {
        let end = remaining[start + 2..].find("}}").ok_or_else(|| TemplateError::Syntax {
            expression: template.to_string(),
            message: "unclosed '{{'".to_string(),
        })?;

        if start > 0 {
            segments.push(Segment::Text(&remaining[..start]));
        }
        segments.push(Segment::Expression(remaining[start + 2..start + 2 + end].trim()));
        remaining = &remaining[start + 2 + end + 2..];
    }

    if !remaining.is_empty() {
        segments.push(Segment::Text(remaining));
    }

    Ok(segments)
}

/// Interpret rendered text as a JSON or Python-style literal
fn parse_literal(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    match trimmed {
        "True" => return Some(Value::Bool(true)),
        "False" => return Some(Value::Bool(false)),
        "None" => return Some(Value::Null),
        _ => {}
    }
    serde_json::from_str(trimmed).ok()
}
