//! Sequential strategy: the reference semantics every other strategy matches.

use super::item::{run_item, RetryPolicy};
use crate::batch::metrics::MetricsAggregator;
use crate::batch::result::StrategyOutput;
use std::fmt::Display;
use std::time::Instant;
use tracing::debug;

/// Process one batch in order. `offset` is the input position of `batch[0]`.
pub(crate) fn process_batch<T, R, E, F>(
    offset: usize,
    batch: &[T],
    f: &F,
    retry: &RetryPolicy,
    metrics: &MetricsAggregator,
) -> StrategyOutput<R>
where
    F: Fn(&T) -> Result<R, E> + ?Sized,
    E: Display,
{
    let start = Instant::now();
    let mut out = StrategyOutput::with_capacity(batch.len());
    for (i, item) in batch.iter().enumerate() {
        out.push(run_item(offset + i, item, f, retry));
    }
    metrics.update(start.elapsed(), out.results.len(), out.errors.len());
    out
}

/// Walk all items batch by batch on the calling thread.
pub(crate) fn run<T, R, E, F>(
    items: &[T],
    batch_size: usize,
    f: &F,
    retry: &RetryPolicy,
    metrics: &MetricsAggregator,
) -> StrategyOutput<R>
where
    F: Fn(&T) -> Result<R, E> + ?Sized,
    E: Display,
{
    let size = batch_size.max(1);
    let mut out = StrategyOutput::with_capacity(items.len());
    for (batch_index, batch) in items.chunks(size).enumerate() {
        let part = process_batch(batch_index * size, batch, f, retry, metrics);
        debug!(
            batch_index,
            batch_len = batch.len(),
            errors = part.errors.len(),
            "sequential batch done"
        );
        out.extend(part);
    }
    out
}
