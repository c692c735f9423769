//! Run gates: the `if` condition and the `depends_on` check

use crate::core::context::PipeContext;
use crate::template::is_truthy;
use serde_json::Value;

/// Why a pipe did not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The rendered `if` was false
    ConditionFalse,
    /// At least one dependency is missing, skipped or failed
    UnmetDependencies(Vec<String>),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::ConditionFalse => write!(f, "condition is false"),
            SkipReason::UnmetDependencies(ids) => {
                write!(f, "unmet dependencies: {}", ids.join(", "))
            }
        }
    }
}

/// Coerce a rendered `if` value to a boolean
///
/// Plain `"true"`/`"false"` strings count as booleans.
pub fn condition_holds(rendered: &Value) -> bool {
    match rendered {
        Value::Bool(b) => *b,
        Value::String(s) => match s.trim() {
            "true" | "True" => true,
            "false" | "False" => false,
            other => !other.is_empty(),
        },
        other => is_truthy(other),
    }
}

/// Dependencies that have not succeeded in `context`
pub fn unmet_dependencies(depends_on: &[String], context: &PipeContext) -> Vec<String> {
    depends_on
        .iter()
        .filter(|id| !context.get_result(id).is_some_and(|r| r.is_success()))
        .cloned()
        .collect()
}

/// Decide whether a pipe may run; `None` means it may
pub fn check_gates(
    should_run: bool,
    depends_on: &[String],
    context: &PipeContext,
) -> Option<SkipReason> {
    if !should_run {
        return Some(SkipReason::ConditionFalse);
    }

    let unmet = unmet_dependencies(depends_on, context);
    if unmet.is_empty() {
        None
    } else {
        Some(SkipReason::UnmetDependencies(unmet))
    }
}
