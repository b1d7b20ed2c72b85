//! 批处理操作模块：在核心批处理引擎之上提供请求/响应式的高层操作。
//!
//! # Batch Operations
//!
//! Each operation composes the batcher, one execution strategy and a per-item
//! rule, and answers with an operation-specific summary wrapped in an
//! [`OperationResponse`].
//!
//! | Operation | Needs rule | Summary |
//! |-----------|------------|---------|
//! | `transform` | yes | [`TransformSummary`] |
//! | `filter` | yes | [`FilterSummary`] |
//! | `validate` | yes | [`ValidateSummary`] |
//! | `aggregate` | no | [`AggregateSummary`] |
//! | `merge` | no | [`MergeSummary`] |
//! | `split` | no | [`SplitSummary`] |
//! | `profile` | optional | [`ProfileSummary`] |
//! | `monitor` | optional | [`MonitorSummary`] |
//! | `throttle` | no | [`ThrottleSummary`] |
//! | `commit` | no | [`CommitSummary`] |
//!
//! ## Example
//!
//! ```rust
//! use batch_engine::ops::{BatchEngine, OperationRequest};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = BatchEngine::new();
//! let request = OperationRequest::new("aggregate")
//!     .with_items(vec![json!(1), json!("x"), json!(3)])
//!     .with_aggregate("sum");
//!
//! let response = engine.execute(request).await;
//! assert!(response.is_success());
//! assert_eq!(response.result().unwrap()["result"], json!(4));
//! # }
//! ```

mod aggregate;
mod commit;
mod observe;
mod request;
mod reshape;
mod rules;

pub use aggregate::{aggregate, AggregateFunction, AggregateSummary};
pub use commit::{commit, throttle, CommitSummary, ThrottleSummary};
pub use observe::{monitor, profile, MonitorSummary, ProfileSummary};
pub use request::{ItemRule, Operation, OperationRequest, OperationResponse};
pub use reshape::{merge, sources_from_items, split, MergeStrategy, MergeSummary, SplitStrategy, SplitSummary};
pub use rules::{filter, transform, truthy, validate, FilterSummary, RunStats, TransformSummary, ValidateSummary};

use crate::batch::BatchConfig;
use crate::Result;
use serde_json::Value;
use tracing::{debug, warn};

/// Entry point for request-driven batch operations.
///
/// Holds the defaults that request fields are layered over. Every call to
/// [`execute`](Self::execute) is independent; nothing is shared between runs.
#[derive(Debug, Clone, Default)]
pub struct BatchEngine {
    defaults: BatchConfig,
}

impl BatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `defaults` (for example from [`BatchConfig::from_env`]) as the base
    /// configuration of every request.
    pub fn with_defaults(defaults: BatchConfig) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &BatchConfig {
        &self.defaults
    }

    /// Run one request. Failures come back as an error response, never as a
    /// panic or an `Err`.
    pub async fn execute(&self, request: OperationRequest) -> OperationResponse {
        let operation = match request.operation.parse::<Operation>() {
            Ok(op) => op,
            Err(e) => {
                warn!(operation = %request.operation, error = %e, "rejected request");
                return OperationResponse::Error {
                    error: e.to_string(),
                    operation: "unknown".to_string(),
                };
            }
        };
        match self.dispatch(operation, request).await {
            Ok(result) => OperationResponse::Success {
                result,
                operation: operation.to_string(),
            },
            Err(e) => {
                if e.is_dispatch() {
                    warn!(operation = operation.as_str(), error = %e, "rejected request");
                } else {
                    warn!(operation = operation.as_str(), error = %e, "operation failed");
                }
                OperationResponse::Error {
                    error: e.to_string(),
                    operation: operation.to_string(),
                }
            }
        }
    }

    /// Parse a JSON request and run it.
    pub async fn execute_json(&self, json: &str) -> OperationResponse {
        match OperationRequest::from_json(json) {
            Ok(request) => self.execute(request).await,
            Err(e) => OperationResponse::Error {
                error: e.to_string(),
                operation: "unknown".to_string(),
            },
        }
    }

    async fn dispatch(&self, op: Operation, request: OperationRequest) -> Result<Value> {
        let cfg = request.config(&self.defaults)?;
        debug!(
            operation = op.as_str(),
            items = request.items.len(),
            batch_size = cfg.batch_size,
            "dispatching operation"
        );

        let value = match op {
            Operation::Transform => {
                let rule = request.require_rule(op)?;
                let strategy = request.strategy()?;
                serde_json::to_value(transform(request.items, rule, &cfg, strategy).await)?
            }
            Operation::Filter => {
                let rule = request.require_rule(op)?;
                let strategy = request.strategy()?;
                serde_json::to_value(filter(request.items, rule, &cfg, strategy).await)?
            }
            Operation::Validate => {
                let rule = request.require_rule(op)?;
                let strategy = request.strategy()?;
                serde_json::to_value(validate(request.items, rule, &cfg, strategy).await)?
            }
            Operation::Aggregate => {
                let function: AggregateFunction = request
                    .aggregate_function
                    .as_deref()
                    .unwrap_or("sum")
                    .parse()?;
                let summary = aggregate(&request.items, function, request.aggregate_field.as_deref());
                serde_json::to_value(summary)?
            }
            Operation::Merge => {
                let strategy: MergeStrategy =
                    request.merge_strategy.as_deref().unwrap_or("concat").parse()?;
                let sources = if request.batches.is_empty() {
                    sources_from_items(request.items)
                } else {
                    request.batches
                };
                serde_json::to_value(merge(sources, strategy))?
            }
            Operation::Split => {
                let strategy: SplitStrategy =
                    request.split_strategy.as_deref().unwrap_or("by_size").parse()?;
                let value = request.split_value.unwrap_or(cfg.batch_size);
                serde_json::to_value(split(request.items, strategy, value)?)?
            }
            Operation::Profile => {
                let rule = request.rule.unwrap_or_else(ItemRule::identity);
                serde_json::to_value(profile(request.items, rule, &cfg).await?)?
            }
            Operation::Monitor => {
                let rule = request.rule.unwrap_or_else(ItemRule::identity);
                serde_json::to_value(monitor(request.items, rule, &cfg).await)?
            }
            Operation::Throttle => serde_json::to_value(throttle(&request.items, &cfg).await)?,
            Operation::Commit => serde_json::to_value(commit(request.items, &cfg).await)?,
        };
        Ok(value)
    }
}
