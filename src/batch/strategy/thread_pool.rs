//! Bounded thread-pool strategy: one blocking task per batch.

use super::item::RetryPolicy;
use super::sequential::process_batch;
use crate::batch::metrics::MetricsAggregator;
use crate::batch::result::{BatchFailure, StrategyOutput};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// Run every batch on the blocking pool with at most `max_workers` in flight.
///
/// Batches are merged in completion order. When `timeout` elapses the wait
/// stops, queued batches are cancelled and running ones are abandoned.
pub(crate) async fn run<T, R, E, F>(
    batches: Vec<Vec<T>>,
    batch_size: usize,
    max_workers: usize,
    timeout: Duration,
    f: Arc<F>,
    retry: RetryPolicy,
    metrics: Arc<MetricsAggregator>,
) -> StrategyOutput<R>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Display,
    F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
{
    let total: usize = batches.iter().map(Vec::len).sum();
    let permits = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut set = JoinSet::new();

    for (batch_index, batch) in batches.into_iter().enumerate() {
        let offset = batch_index * batch_size.max(1);
        let permits = Arc::clone(&permits);
        let f = Arc::clone(&f);
        let metrics = Arc::clone(&metrics);
        set.spawn(async move {
            let permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(e) => return (batch_index, Err(e.to_string())),
            };
            let handle = tokio::task::spawn_blocking(move || {
                // held until the batch finishes, even if the waiter is aborted
                let _permit = permit;
                process_batch(offset, &batch, &*f, &retry, &metrics)
            });
            (batch_index, handle.await.map_err(|e| e.to_string()))
        });
    }

    let mut out = StrategyOutput::with_capacity(total);
    let deadline = super::deadline(timeout);
    loop {
        match tokio::time::timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok((_, Ok(part))))) => out.extend(part),
            Ok(Some(Ok((batch_index, Err(message))))) => {
                warn!(batch_index, error = %message, "batch task failed");
                out.batch_failures.push(BatchFailure {
                    batch_index: Some(batch_index),
                    message,
                });
            }
            Ok(Some(Err(join_err))) => {
                warn!(error = %join_err, "batch task failed");
                out.batch_failures.push(BatchFailure {
                    batch_index: None,
                    message: join_err.to_string(),
                });
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    pending = set.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "thread pool timed out; returning partial results"
                );
                out.timed_out = true;
                set.abort_all();
                break;
            }
        }
    }
    out
}
