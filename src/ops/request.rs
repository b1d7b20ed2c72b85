//! Operation request/response contract.

use crate::batch::{secs_to_duration, BatchConfig, CommitStrategy, Strategy};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

/// The high-level operations the engine dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Transform,
    Filter,
    Aggregate,
    Validate,
    Merge,
    Split,
    Profile,
    Monitor,
    Throttle,
    Commit,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::Transform,
        Operation::Filter,
        Operation::Aggregate,
        Operation::Validate,
        Operation::Merge,
        Operation::Split,
        Operation::Profile,
        Operation::Monitor,
        Operation::Throttle,
        Operation::Commit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Transform => "transform",
            Operation::Filter => "filter",
            Operation::Aggregate => "aggregate",
            Operation::Validate => "validate",
            Operation::Merge => "merge",
            Operation::Split => "split",
            Operation::Profile => "profile",
            Operation::Monitor => "monitor",
            Operation::Throttle => "throttle",
            Operation::Commit => "commit",
        }
    }

    /// Operations that cannot run without an attached [`ItemRule`].
    pub fn requires_rule(&self) -> bool {
        matches!(
            self,
            Operation::Transform | Operation::Filter | Operation::Validate
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == wanted)
            .ok_or_else(|| {
                Error::dispatch_with_context(
                    format!("Unknown operation: {}", s),
                    ErrorContext::new()
                        .with_field_path("operation")
                        .with_source("dispatch"),
                )
            })
    }
}

type RuleFn = dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync;

/// A compiled per-item rule supplied by the caller.
///
/// Turning rule text into a safe function is the caller's job; the engine only
/// calls it and treats any error it returns as a per-item failure.
#[derive(Clone)]
pub struct ItemRule(Arc<RuleFn>);

impl ItemRule {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Rule that returns its input unchanged.
    pub fn identity() -> Self {
        Self::new(|v| Ok(v.clone()))
    }

    pub fn apply(&self, item: &Value) -> anyhow::Result<Value> {
        (self.0)(item)
    }
}

impl std::fmt::Debug for ItemRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ItemRule(..)")
    }
}

/// One invocation as received from the orchestrator.
///
/// Everything except the rule deserializes from JSON; durations are seconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OperationRequest {
    pub operation: String,
    pub items: Vec<Value>,
    pub batch_size: Option<usize>,
    pub max_workers: Option<usize>,
    pub timeout: Option<f64>,
    pub throttle_rate: Option<f64>,
    pub commit_strategy: Option<String>,
    pub strategy: Option<String>,
    pub max_retries: Option<u32>,
    pub retry_delay: Option<f64>,
    pub enable_monitoring: Option<bool>,
    pub aggregate_function: Option<String>,
    pub aggregate_field: Option<String>,
    pub merge_strategy: Option<String>,
    pub batches: Vec<Vec<Value>>,
    pub split_strategy: Option<String>,
    pub split_value: Option<usize>,
    #[serde(skip)]
    pub rule: Option<ItemRule>,
}

impl OperationRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_items(mut self, items: Vec<Value>) -> Self {
        self.items = items;
        self
    }
    pub fn with_rule(mut self, rule: ItemRule) -> Self {
        self.rule = Some(rule);
        self
    }
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n);
        self
    }
    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = Some(n);
        self
    }
    pub fn with_strategy(mut self, s: Strategy) -> Self {
        self.strategy = Some(s.as_str().to_string());
        self
    }
    pub fn with_commit_strategy(mut self, s: CommitStrategy) -> Self {
        self.commit_strategy = Some(s.as_str().to_string());
        self
    }
    pub fn with_timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = Some(secs);
        self
    }
    pub fn with_throttle_secs(mut self, secs: f64) -> Self {
        self.throttle_rate = Some(secs);
        self
    }
    pub fn with_aggregate(mut self, function: impl Into<String>) -> Self {
        self.aggregate_function = Some(function.into());
        self
    }
    pub fn with_aggregate_field(mut self, field: impl Into<String>) -> Self {
        self.aggregate_field = Some(field.into());
        self
    }
    pub fn with_merge(mut self, strategy: impl Into<String>, batches: Vec<Vec<Value>>) -> Self {
        self.merge_strategy = Some(strategy.into());
        self.batches = batches;
        self
    }
    pub fn with_split(mut self, strategy: impl Into<String>, value: usize) -> Self {
        self.split_strategy = Some(strategy.into());
        self.split_value = Some(value);
        self
    }

    /// Resolve the run configuration: request fields over `defaults`.
    pub fn config(&self, defaults: &BatchConfig) -> Result<BatchConfig> {
        let mut cfg = defaults.clone();
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.max_workers {
            cfg.max_workers = v;
        }
        if let Some(v) = self.timeout {
            cfg.timeout = secs_to_duration("timeout", v)?;
        }
        if let Some(v) = self.throttle_rate {
            cfg.throttle_interval = secs_to_duration("throttle_rate", v)?;
        }
        if let Some(v) = self.max_retries {
            cfg.max_retries = v;
        }
        if let Some(v) = self.retry_delay {
            cfg.retry_delay = secs_to_duration("retry_delay", v)?;
        }
        if let Some(v) = self.enable_monitoring {
            cfg.enable_monitoring = v;
        }
        if let Some(ref s) = self.commit_strategy {
            cfg.commit_strategy = s.parse()?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Execution strategy for rule-driven operations; sequential when unset.
    pub fn strategy(&self) -> Result<Strategy> {
        match self.strategy.as_deref() {
            Some(s) => s.parse(),
            None => Ok(Strategy::Sequential),
        }
    }

    pub(crate) fn require_rule(&self, op: Operation) -> Result<ItemRule> {
        self.rule.clone().ok_or_else(|| {
            Error::dispatch_with_context(
                format!("operation '{}' requires a per-item rule", op),
                ErrorContext::new()
                    .with_field_path("rule")
                    .with_source("dispatch"),
            )
        })
    }
}

/// Structured reply; never an unhandled failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OperationResponse {
    Success { result: Value, operation: String },
    Error { error: String, operation: String },
}

impl OperationResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResponse::Success { .. })
    }

    pub fn operation(&self) -> &str {
        match self {
            OperationResponse::Success { operation, .. }
            | OperationResponse::Error { operation, .. } => operation,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            OperationResponse::Success { result, .. } => Some(result),
            OperationResponse::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            OperationResponse::Error { error, .. } => Some(error),
            OperationResponse::Success { .. } => None,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
