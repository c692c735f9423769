//! Pipe result model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::BitAnd;

/// Outcome of a single pipe execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipeStatus {
    /// The pipe ran and succeeded
    Succeeded,
    /// The pipe ran (or tried to) and failed
    Failed,
    /// The pipe body decided not to do any work
    Skipped,
}

/// Result recorded into the context by a pipe
///
/// Results are immutable once produced; combining produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeResult {
    status: PipeStatus,
    message: String,
    data: Map<String, Value>,
}

impl PipeResult {
    /// A successful result with no message and no data
    pub fn success() -> Self {
        Self {
            status: PipeStatus::Succeeded,
            message: String::new(),
            data: Map::new(),
        }
    }

    /// A failed result carrying a message
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: PipeStatus::Failed,
            message: message.into(),
            data: Map::new(),
        }
    }

    /// A body-initiated skip
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: PipeStatus::Skipped,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Add a single entry to the result data
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn status(&self) -> PipeStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == PipeStatus::Succeeded
    }

    pub fn is_failure(&self) -> bool {
        self.status == PipeStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.status == PipeStatus::Skipped
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Look up a single data entry
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// AND-combine two results
    ///
    /// Failure dominates, two skips stay skipped, anything else succeeds.
    /// Non-empty messages are joined with `"; "` and `other`'s data keys win.
    pub fn and(&self, other: &PipeResult) -> PipeResult {
        let status = match (self.status, other.status) {
            (PipeStatus::Failed, _) | (_, PipeStatus::Failed) => PipeStatus::Failed,
            (PipeStatus::Skipped, PipeStatus::Skipped) => PipeStatus::Skipped,
            _ => PipeStatus::Succeeded,
        };

        let message = match (self.message.is_empty(), other.message.is_empty()) {
            (true, _) => other.message.clone(),
            (false, true) => self.message.clone(),
            (false, false) => format!("{}; {}", self.message, other.message),
        };

        let mut data = self.data.clone();
        for (key, value) in &other.data {
            data.insert(key.clone(), value.clone());
        }

        PipeResult {
            status,
            message,
            data,
        }
    }

    /// Combine any number of results, left to right
    ///
    /// An empty input is a vacuous success.
    pub fn union<'a, I>(results: I) -> PipeResult
    where
        I: IntoIterator<Item = &'a PipeResult>,
    {
        let mut iter = results.into_iter();
        match iter.next() {
            Some(first) => iter.fold(first.clone(), |acc, next| acc.and(next)),
            None => PipeResult::success(),
        }
    }

    /// Representation exposed to template expressions
    pub fn to_scope_value(&self) -> Value {
        serde_json::json!({
            "succeeded": self.is_success(),
            "failed": self.is_failure(),
            "was_skipped": self.is_skipped(),
            "message": self.message,
            "data": Value::Object(self.data.clone()),
        })
    }
}

impl Default for PipeResult {
    fn default() -> Self {
        Self::success()
    }
}

impl BitAnd for PipeResult {
    type Output = PipeResult;

    fn bitand(self, rhs: PipeResult) -> PipeResult {
        self.and(&rhs)
    }
}

impl<'a> BitAnd<&'a PipeResult> for &'a PipeResult {
    type Output = PipeResult;

    fn bitand(self, rhs: &'a PipeResult) -> PipeResult {
        self.and(rhs)
    }
}
