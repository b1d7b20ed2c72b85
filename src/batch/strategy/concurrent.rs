//! Cooperative concurrent strategy: one task per item under a global timeout.
//!
//! Unlike the pooled strategies, items still pending when the timeout fires are
//! dropped from the result instead of being represented by placeholders.

use super::item::{run_item, run_item_async, RetryPolicy};
use crate::batch::metrics::MetricsAggregator;
use crate::batch::result::{BatchFailure, ItemError, StrategyOutput};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

type TaskResult<R> = (usize, Result<R, ItemError>);

/// Async processors: each item becomes a task, at most `max_workers` running.
pub(crate) async fn run_async<T, R, E, F, Fut>(
    items: Vec<T>,
    max_workers: usize,
    timeout: Duration,
    f: Arc<F>,
    retry: RetryPolicy,
    metrics: Arc<MetricsAggregator>,
) -> StrategyOutput<R>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let total = items.len();
    let permits = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut set = JoinSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let permits = Arc::clone(&permits);
        let f = Arc::clone(&f);
        let metrics = Arc::clone(&metrics);
        set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let start = Instant::now();
            let outcome = run_item_async(index, item, &*f, &retry).await;
            metrics.update(start.elapsed(), 1, usize::from(outcome.is_err()));
            (index, outcome)
        });
    }
    collect(set, total, timeout).await
}

/// Synchronous processors are offloaded to the blocking pool, one call per task.
pub(crate) async fn run_blocking<T, R, E, F>(
    items: Vec<T>,
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
    let total = items.len();
    let permits = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut set = JoinSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let permits = Arc::clone(&permits);
        let f = Arc::clone(&f);
        let metrics = Arc::clone(&metrics);
        set.spawn(async move {
            let permit = permits.acquire_owned().await;
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let start = Instant::now();
                let outcome = run_item(index, &item, &*f, &retry);
                metrics.update(start.elapsed(), 1, usize::from(outcome.is_err()));
                outcome
            });
            let outcome = handle.await.unwrap_or_else(|e| {
                Err(ItemError {
                    index,
                    message: e.to_string(),
                    attempts: 1,
                })
            });
            (index, outcome)
        });
    }
    collect(set, total, timeout).await
}

async fn collect<R: Send + 'static>(
    mut set: JoinSet<TaskResult<R>>,
    total: usize,
    timeout: Duration,
) -> StrategyOutput<R> {
    let mut done: Vec<TaskResult<R>> = Vec::with_capacity(total);
    let mut lost: Vec<BatchFailure> = Vec::new();
    let mut timed_out = false;
    let deadline = super::deadline(timeout);
    loop {
        match tokio::time::timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok(entry))) => done.push(entry),
            Ok(Some(Err(join_err))) => {
                warn!(error = %join_err, "concurrent task failed");
                lost.push(BatchFailure {
                    batch_index: None,
                    message: join_err.to_string(),
                });
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    completed = done.len(),
                    pending = set.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "concurrent run timed out; dropping pending items"
                );
                set.abort_all();
                timed_out = true;
                break;
            }
        }
    }

    done.sort_unstable_by_key(|(index, _)| *index);
    let mut out = StrategyOutput::with_capacity(done.len());
    for (_, outcome) in done {
        out.push(outcome);
    }
    out.batch_failures = lost;
    out.timed_out = timed_out;
    out
}
