//! Pipe context - per-run results and ambient parameters

use crate::core::result::PipeResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

pub use crate::template::{PARAMS_KEY, PARENT_PARAMS_KEY, PIPE_RESULTS_KEY};

/// Execution context for one top-level run
///
/// Owned by exactly one pipe at a time: `Pipe::process` takes it by value
/// and hands it back, so there is never more than one writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeContext {
    /// Identifies the run this context belongs to
    pub run_id: Uuid,

    /// Results recorded so far (pipe_id -> result)
    pub results: HashMap<String, PipeResult>,

    /// Ambient parameters available to every expression
    pub params: Map<String, Value>,

    /// Parameters of the composite currently running its children
    pub parent_params: Map<String, Value>,

    /// Bumped on every recorded result
    #[serde(default)]
    pub revision: u64,
}

impl PipeContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            results: HashMap::new(),
            params: Map::new(),
            parent_params: Map::new(),
            revision: 0,
        }
    }

    /// Create a context seeded with ambient parameters
    pub fn with_params(params: Map<String, Value>) -> Self {
        Self {
            params,
            ..Self::new()
        }
    }

    /// Record the result of a pipe, replacing any earlier one
    pub fn set_result(&mut self, pipe_id: &str, result: PipeResult) {
        self.results.insert(pipe_id.to_string(), result);
        self.revision += 1;
    }

    /// Get the result of a pipe
    pub fn get_result(&self, pipe_id: &str) -> Option<&PipeResult> {
        self.results.get(pipe_id)
    }

    pub fn has_result(&self, pipe_id: &str) -> bool {
        self.results.contains_key(pipe_id)
    }

    /// Whether the named pipe ran and failed
    pub fn has_failed(&self, pipe_id: &str) -> bool {
        self.results.get(pipe_id).is_some_and(PipeResult::is_failure)
    }

    /// Replace the parent parameters, returning the previous ones
    pub fn replace_parent_params(&mut self, params: Map<String, Value>) -> Map<String, Value> {
        std::mem::replace(&mut self.parent_params, params)
    }

    /// Ids and messages of every failed result, sorted by id
    pub fn failure_chain(&self) -> Vec<(String, String)> {
        let mut chain: Vec<(String, String)> = self
            .results
            .iter()
            .filter(|(_, result)| result.is_failure())
            .map(|(id, result)| (id.clone(), result.message().to_string()))
            .collect();
        chain.sort();
        chain
    }

    /// Build the scope used to render templates against this context
    ///
    /// Ambient parameters are exposed both under `params` and as top-level
    /// names, except where they would shadow a reserved name.
    pub fn template_scope(&self) -> Map<String, Value> {
        let mut scope = Map::new();

        for (key, value) in &self.params {
            if !is_reserved(key) {
                scope.insert(key.clone(), value.clone());
            }
        }

        let results: Map<String, Value> = self
            .results
            .iter()
            .map(|(id, result)| (id.clone(), result.to_scope_value()))
            .collect();

        scope.insert(PIPE_RESULTS_KEY.to_string(), Value::Object(results));
        scope.insert(PARAMS_KEY.to_string(), Value::Object(self.params.clone()));
        scope.insert(
            PARENT_PARAMS_KEY.to_string(),
            Value::Object(self.parent_params.clone()),
        );

        scope
    }
}

fn is_reserved(key: &str) -> bool {
    matches!(key, PIPE_RESULTS_KEY | PARAMS_KEY | PARENT_PARAMS_KEY)
}

impl Default for PipeContext {
    fn default() -> Self {
        Self::new()
    }
}
