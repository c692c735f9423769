//! Pipe and orchestrator configuration from YAML

use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Raw pipe configuration, as written by the user
///
/// `if` and `params` may still contain `{{ ... }}` expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeConfig {
    /// Identifier, unique among the direct children of one composite
    pub id: String,

    /// Registered implementation to run
    #[serde(rename = "use")]
    pub uses: String,

    /// Run condition: a boolean or an expression string
    #[serde(rename = "if", default = "default_condition")]
    pub condition: Value,

    /// Ids that must have succeeded before this pipe runs
    #[serde(default, deserialize_with = "one_or_many")]
    pub depends_on: Vec<String>,

    /// Implementation-specific parameters
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Ordered children (composite pipes only)
    #[serde(default)]
    pub steps: Vec<PipeConfig>,
}

/// Pipe configuration after rendering against a context
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPipeConfig {
    pub id: String,
    pub uses: String,
    /// The resolved `if`
    pub should_run: bool,
    pub depends_on: Vec<String>,
    /// Parameters with every expression substituted
    pub params: Map<String, Value>,
    /// Children stay raw; each renders against the context current at its turn
    pub steps: Vec<PipeConfig>,
}

fn default_condition() -> Value {
    Value::Bool(true)
}

/// Accept either `depends_on: a` or `depends_on: [a, b]`
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(id)) => vec![id],
        Some(OneOrMany::Many(ids)) => ids,
        None => Vec::new(),
    })
}

impl PipeConfig {
    /// Create a config with no condition, dependencies, params or children
    pub fn new(id: impl Into<String>, uses: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uses: uses.into(),
            condition: default_condition(),
            depends_on: Vec::new(),
            params: Map::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: impl Into<Value>) -> Self {
        self.condition = condition.into();
        self
    }

    pub fn with_depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_steps(mut self, steps: Vec<PipeConfig>) -> Self {
        self.steps = steps;
        self
    }

    /// Parse a single pipe definition from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate this pipe and its children
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            anyhow::bail!("Pipe has an empty id");
        }
        if self.uses.trim().is_empty() {
            anyhow::bail!("Pipe '{}' has no 'use'", self.id);
        }
        if !matches!(self.condition, Value::Bool(_) | Value::String(_)) {
            anyhow::bail!(
                "Pipe '{}' has an 'if' that is neither a boolean nor an expression",
                self.id
            );
        }

        // Direct children must have unique ids
        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if !seen_ids.insert(step.id.as_str()) {
                anyhow::bail!("Duplicate step ID '{}' in pipe '{}'", step.id, self.id);
            }
        }

        // Dependencies usually point at earlier siblings; anything else can
        // only be satisfied by results carried over from outside this composite
        let mut earlier = HashSet::new();
        for step in &self.steps {
            for dep in &step.depends_on {
                if dep == &step.id {
                    anyhow::bail!("Step '{}' depends on itself", step.id);
                }
                if seen_ids.contains(dep.as_str()) && !earlier.contains(dep.as_str()) {
                    anyhow::bail!(
                        "Step '{}' depends on '{}', which runs after it",
                        step.id,
                        dep
                    );
                }
                if !seen_ids.contains(dep.as_str()) {
                    warn!(
                        pipe_id = %step.id,
                        dependency = %dep,
                        "Dependency is not a sibling step; it must come from an outer scope"
                    );
                }
            }
            earlier.insert(step.id.as_str());
            step.validate()?;
        }

        Ok(())
    }

    /// Every `use` identifier in this tree, depth first
    pub fn used_types(&self) -> Vec<&str> {
        let mut types = vec![self.uses.as_str()];
        for step in &self.steps {
            types.extend(step.used_types());
        }
        types
    }
}

/// Fixed-interval trigger; the components are summed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalTrigger {
    #[serde(default)]
    pub milliseconds: u64,
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub hours: u64,
}

impl IntervalTrigger {
    pub fn every(duration: Duration) -> Self {
        Self {
            milliseconds: duration.as_millis() as u64,
            ..Self::default()
        }
    }

    /// Total interval, or `None` if it does not fit in a `Duration`
    pub fn duration(&self) -> Option<Duration> {
        let minutes = Duration::from_secs(self.minutes.checked_mul(60)?);
        let hours = Duration::from_secs(self.hours.checked_mul(3600)?);
        Duration::from_millis(self.milliseconds)
            .checked_add(Duration::from_secs(self.seconds))?
            .checked_add(minutes)?
            .checked_add(hours)
    }
}

/// When a runner fires
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Fire repeatedly on a fixed interval
    #[serde(default)]
    pub interval: Option<IntervalTrigger>,
}

/// Retry policy for one runner cycle (delays in milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per cycle, including the first
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_delay")]
    pub delay: u64,

    /// Multiplier applied to the delay after each retry
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound for any single delay
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,
}

fn default_attempts() -> u32 {
    1
}

fn default_delay() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay: default_delay(),
            backoff_factor: default_backoff_factor(),
            max_delay: default_max_delay(),
        }
    }
}

/// What a runner does once a cycle has exhausted its retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and wait for the next trigger
    #[default]
    Continue,
    /// Terminate the runner with an error
    Stop,
}

/// How the context of one cycle relates to the next
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextPolicy {
    /// Every cycle starts from the ambient parameters only
    #[default]
    Fresh,
    /// Every cycle starts from the previous cycle's final context
    Carry,
}

/// A trigger paired with the pipe it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Unique runner identifier
    pub id: String,

    pub trigger: TriggerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub on_failure: FailurePolicy,

    #[serde(default)]
    pub context: ContextPolicy,

    /// Ambient parameters for this runner (override the global ones)
    #[serde(default)]
    pub params: Map<String, Value>,

    /// The pipe executed on every firing
    pub run: PipeConfig,
}

impl RunnerConfig {
    pub fn new(id: impl Into<String>, interval: Duration, run: PipeConfig) -> Self {
        Self {
            id: id.into(),
            trigger: TriggerConfig {
                interval: Some(IntervalTrigger::every(interval)),
            },
            retry: RetryConfig::default(),
            on_failure: FailurePolicy::default(),
            context: ContextPolicy::default(),
            params: Map::new(),
            run,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_context_policy(mut self, policy: ContextPolicy) -> Self {
        self.context = policy;
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let interval = match &self.trigger.interval {
            Some(interval) => match interval.duration() {
                Some(duration) => duration,
                None => anyhow::bail!("Runner '{}' has an interval that is too large", self.id),
            },
            None => anyhow::bail!("Runner '{}' has no trigger", self.id),
        };
        if interval.is_zero() {
            anyhow::bail!("Runner '{}' has a zero interval", self.id);
        }
        if self.retry.attempts == 0 {
            anyhow::bail!("Runner '{}' must allow at least one attempt", self.id);
        }
        if !(self.retry.backoff_factor >= 1.0) {
            anyhow::bail!(
                "Runner '{}' has backoff_factor {} (must be >= 1.0)",
                self.id,
                self.retry.backoff_factor
            );
        }
        self.run.validate()
    }
}

/// A service instance made available to pipes by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: String,

    /// Registered service type
    #[serde(rename = "use")]
    pub uses: String,

    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Top-level orchestrator configuration loaded from YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Global ambient parameters
    #[serde(default)]
    pub params: Map<String, Value>,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    #[serde(default)]
    pub runners: Vec<RunnerConfig>,
}

impl OrchestratorConfig {
    /// Load orchestrator configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse orchestrator configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: OrchestratorConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the orchestrator configuration
    pub fn validate(&self) -> Result<()> {
        let mut runner_ids = HashSet::new();
        for runner in &self.runners {
            if !runner_ids.insert(&runner.id) {
                anyhow::bail!("Duplicate runner ID: {}", runner.id);
            }
            runner.validate()?;
        }

        let mut service_ids = HashSet::new();
        for service in &self.services {
            if !service_ids.insert(&service.id) {
                anyhow::bail!("Duplicate service ID: {}", service.id);
            }
        }

        Ok(())
    }

    /// Ambient parameters for one runner: global params overlaid with the runner's own
    pub fn runner_params(&self, runner: &RunnerConfig) -> Map<String, Value> {
        let mut params = self.params.clone();
        for (key, value) in &runner.params {
            params.insert(key.clone(), value.clone());
        }
        params
    }
}
