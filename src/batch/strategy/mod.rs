//! 执行策略：同一输入输出契约下的多种并发模型。
//!
//! # Execution Strategies
//!
//! Every strategy takes the same inputs (items, a per-item processor, a
//! [`BatchConfig`](crate::batch::BatchConfig)) and produces the same
//! [`BatchResult`](crate::batch::BatchResult). They differ only in the
//! concurrency model and in the ordering guarantee of the results.
//!
//! | Strategy | Model | Result order |
//! |----------|-------|--------------|
//! | [`Strategy::Sequential`] | one thread, in order | input order |
//! | [`Strategy::ThreadPool`] | one blocking task per batch, bounded | within a batch only |
//! | [`Strategy::ProcessPool`] | dedicated CPU pool, one job per batch | within a batch only |
//! | [`Strategy::WorkerPool`] | long-lived workers, queue + sentinels | none |
//! | [`Strategy::Concurrent`] | one async task per item, bounded | input order of completed items |
//!
//! A failing item never aborts a run: it is logged and recorded as a `None`
//! placeholder. Callers that need strict positional correspondence should use
//! [`Strategy::Sequential`].

pub(crate) mod concurrent;
pub(crate) mod item;
pub(crate) mod process_pool;
pub mod queue_drain;
pub(crate) mod sequential;
pub(crate) mod thread_pool;
pub mod worker_pool;

pub use item::RetryPolicy;

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Longest wait a run deadline is allowed to express; matches tokio's own
/// "far future" for sleeps.
const MAX_WAIT: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Deadline `timeout` from now. Timeouts beyond [`MAX_WAIT`] are clamped so the
/// instant arithmetic cannot overflow.
pub(crate) fn deadline(timeout: Duration) -> tokio::time::Instant {
    tokio::time::Instant::now() + timeout.min(MAX_WAIT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Sequential,
    /// I/O-bound work; overlaps blocking calls on a bounded set of threads.
    ThreadPool,
    /// CPU-bound work on an isolated pool sized to `max_workers`.
    ProcessPool,
    /// Producer/consumer pipeline with explicit shutdown sentinels.
    WorkerPool,
    /// Bounded concurrent tasks with one global timeout.
    Concurrent,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::ThreadPool => "thread_pool",
            Strategy::ProcessPool => "process_pool",
            Strategy::WorkerPool => "worker_pool",
            Strategy::Concurrent => "concurrent",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sequential" => Ok(Strategy::Sequential),
            "thread_pool" | "threads" => Ok(Strategy::ThreadPool),
            "process_pool" | "processes" => Ok(Strategy::ProcessPool),
            "worker_pool" | "workers" => Ok(Strategy::WorkerPool),
            "concurrent" | "async" => Ok(Strategy::Concurrent),
            other => Err(Error::dispatch_with_context(
                format!("unknown strategy '{}'", other),
                ErrorContext::new()
                    .with_field_path("strategy")
                    .with_source("strategy"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse_aliases() {
        assert_eq!("thread-pool".parse::<Strategy>().unwrap(), Strategy::ThreadPool);
        assert_eq!("WORKERS".parse::<Strategy>().unwrap(), Strategy::WorkerPool);
        assert_eq!("async".parse::<Strategy>().unwrap(), Strategy::Concurrent);
        assert!("gpu".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_round_trips_through_as_str() {
        for s in [
            Strategy::Sequential,
            Strategy::ThreadPool,
            Strategy::ProcessPool,
            Strategy::WorkerPool,
            Strategy::Concurrent,
        ] {
            assert_eq!(s.as_str().parse::<Strategy>().unwrap(), s);
            assert_eq!(
                serde_json::to_value(s).unwrap(),
                serde_json::Value::String(s.as_str().to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_deadline_saturates() {
        let far = deadline(Duration::MAX);
        assert!(far > tokio::time::Instant::now() + Duration::from_secs(86_400));
        let near = deadline(Duration::from_millis(10));
        assert!(near < far);
    }
}
