//! Batch outcome records.

use super::metrics::MetricsSnapshot;
use super::strategy::Strategy;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// A single item whose processing failed after all attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    /// Position of the item in the original input.
    pub index: usize,
    pub message: String,
    pub attempts: u32,
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Item error at {} after {} attempt(s): {}",
            self.index, self.attempts, self.message
        )
    }
}
impl std::error::Error for ItemError {}

/// A whole batch (or worker) that contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// `None` when the failing task could not be attributed to a batch.
    pub batch_index: Option<usize>,
    pub message: String,
}

/// What a strategy hands back before timing and metrics are attached.
#[derive(Debug)]
pub(crate) struct StrategyOutput<R> {
    pub results: Vec<Option<R>>,
    pub errors: Vec<ItemError>,
    pub batch_failures: Vec<BatchFailure>,
    pub success_count: usize,
    pub timed_out: bool,
}

impl<R> StrategyOutput<R> {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            results: Vec::with_capacity(n),
            errors: Vec::new(),
            batch_failures: Vec::new(),
            success_count: 0,
            timed_out: false,
        }
    }

    /// Append one processed item; failures become `None` placeholders.
    pub fn push(&mut self, outcome: Result<R, ItemError>) {
        match outcome {
            Ok(r) => {
                self.success_count += 1;
                self.results.push(Some(r));
            }
            Err(e) => {
                self.errors.push(e);
                self.results.push(None);
            }
        }
    }

    pub fn extend(&mut self, other: StrategyOutput<R>) {
        self.results.extend(other.results);
        self.errors.extend(other.errors);
        self.batch_failures.extend(other.batch_failures);
        self.success_count += other.success_count;
        self.timed_out |= other.timed_out;
    }
}

/// Immutable outcome of one processing run.
///
/// `processed_count == results.len()`. For pooled strategies the order of
/// `results` across batches follows completion order; see [`Strategy`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult<R> {
    pub run_id: Uuid,
    pub strategy: Strategy,
    pub processed_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub elapsed: Duration,
    /// Items per second over the whole run.
    pub throughput: f64,
    pub errors: Vec<ItemError>,
    pub batch_failures: Vec<BatchFailure>,
    pub results: Vec<Option<R>>,
    pub metrics: MetricsSnapshot,
    /// The wait for completion hit the configured timeout; totals may be short.
    pub timed_out: bool,
}

impl<R> BatchResult<R> {
    pub(crate) fn assemble(
        run_id: Uuid,
        strategy: Strategy,
        output: StrategyOutput<R>,
        elapsed: Duration,
        metrics: MetricsSnapshot,
    ) -> Self {
        let processed_count = output.results.len();
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            processed_count as f64 / secs
        } else {
            0.0
        };
        Self {
            run_id,
            strategy,
            processed_count,
            success_count: output.success_count,
            error_count: output.errors.len(),
            elapsed,
            throughput,
            errors: output.errors,
            batch_failures: output.batch_failures,
            results: output.results,
            metrics,
            timed_out: output.timed_out,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.errors.is_empty() && self.batch_failures.is_empty() && !self.timed_out
    }

    pub fn success_rate(&self) -> f64 {
        if self.processed_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.processed_count as f64
        }
    }

    /// Successful values only, in result order.
    pub fn successes(&self) -> impl Iterator<Item = &R> {
        self.results.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(index: usize) -> ItemError {
        ItemError {
            index,
            message: "bad".to_string(),
            attempts: 1,
        }
    }

    #[test]
    fn test_push_keeps_placeholders() {
        let mut out = StrategyOutput::with_capacity(3);
        out.push(Ok(1));
        out.push(Err(err(1)));
        out.push(Ok(3));
        assert_eq!(out.results, vec![Some(1), None, Some(3)]);
        assert_eq!(out.success_count, 2);
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn test_assemble_counts() {
        let mut out = StrategyOutput::with_capacity(2);
        out.push(Ok("a"));
        out.push(Err(err(1)));
        let result = BatchResult::assemble(
            Uuid::new_v4(),
            Strategy::Sequential,
            out,
            Duration::from_secs(2),
            MetricsSnapshot::default(),
        );
        assert_eq!(result.processed_count, 2);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.error_count, 1);
        assert!((result.throughput - 1.0).abs() < 1e-9);
        assert!((result.success_rate() - 0.5).abs() < 1e-9);
        assert!(!result.all_succeeded());
        assert_eq!(result.successes().copied().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_empty_result() {
        let out: StrategyOutput<u8> = StrategyOutput::with_capacity(0);
        let result = BatchResult::assemble(
            Uuid::new_v4(),
            Strategy::WorkerPool,
            out,
            Duration::ZERO,
            MetricsSnapshot::default(),
        );
        assert_eq!(result.processed_count, 0);
        assert_eq!(result.throughput, 0.0);
        assert_eq!(result.success_rate(), 0.0);
        assert!(result.all_succeeded());
    }

    #[test]
    fn test_item_error_display() {
        assert_eq!(
            err(4).to_string(),
            "Item error at 4 after 1 attempt(s): bad"
        );
    }
}
