//! Registry of user-supplied template functions and values

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A callable available inside expressions
pub type TemplateFunction = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// A zero-argument provider exposed as a name inside expressions
pub type ValueProvider = Arc<dyn Fn() -> Value + Send + Sync>;

/// Extension functions and values shared by every render
///
/// Registration is additive and the last registration for a name wins.
/// Lookups clone the entry out of the lock, so an extension never runs
/// while the registry is locked.
#[derive(Default)]
pub struct TemplateExtensions {
    functions: RwLock<HashMap<String, TemplateFunction>>,
    values: RwLock<HashMap<String, ValueProvider>>,
}

impl TemplateExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function callable as `name(args...)` or `value | name(args...)`
    pub fn register_function<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(function));
    }

    /// Register a value provider available as a bare name
    pub fn register_value<F>(&self, name: impl Into<String>, provider: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(provider));
    }

    pub fn function(&self, name: &str) -> Option<TemplateFunction> {
        self.functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Evaluate a value provider
    pub fn value(&self, name: &str) -> Option<Value> {
        let provider = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        provider.map(|provider| provider())
    }

    /// Names of every registered function and value, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.extend(
            self.values
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .keys()
                .cloned(),
        );
        names.sort();
        names.dedup();
        names
    }
}

impl std::fmt::Debug for TemplateExtensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateExtensions")
            .field("names", &self.names())
            .finish()
    }
}
