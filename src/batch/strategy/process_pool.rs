//! CPU pool strategy: batches run on a dedicated rayon pool.
//!
//! Items and results cross into pool threads, so both must be `Send +
//! 'static`. Each batch job is isolated with `catch_unwind`; a job that dies
//! outside per-item handling is reported as a batch failure.

use super::item::{panic_message, RetryPolicy};
use super::sequential::process_batch;
use crate::batch::metrics::MetricsAggregator;
use crate::batch::result::{BatchFailure, StrategyOutput};
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type JobResult<R> = (usize, Result<StrategyOutput<R>, String>);

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
    let mut out = StrategyOutput::with_capacity(total);

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(max_workers.max(1))
        .thread_name(|i| format!("batch-cpu-{}", i))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            warn!(error = %e, "cpu pool could not be built; no batch was run");
            for batch_index in 0..batches.len() {
                out.batch_failures.push(BatchFailure {
                    batch_index: Some(batch_index),
                    message: format!("pool rejected batch: {}", e),
                });
            }
            return out;
        }
    };

    let cancelled = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::unbounded_channel::<JobResult<R>>();
    for (batch_index, batch) in batches.into_iter().enumerate() {
        let offset = batch_index * batch_size.max(1);
        let tx = tx.clone();
        let f = Arc::clone(&f);
        let metrics = Arc::clone(&metrics);
        let cancelled = Arc::clone(&cancelled);
        pool.spawn(move || {
            if cancelled.load(Ordering::Acquire) {
                debug!(batch_index, "skipping batch after timeout");
                return;
            }
            let job = panic::catch_unwind(AssertUnwindSafe(|| {
                process_batch(offset, &batch, &*f, &retry, &metrics)
            }));
            let _ = tx.send((batch_index, job.map_err(|p| panic_message(p.as_ref()))));
        });
    }
    drop(tx);

    let deadline = super::deadline(timeout);
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some((_, Ok(part)))) => out.extend(part),
            Ok(Some((batch_index, Err(message)))) => {
                warn!(batch_index, error = %message, "cpu batch failed");
                out.batch_failures.push(BatchFailure {
                    batch_index: Some(batch_index),
                    message,
                });
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "cpu pool timed out; returning partial results"
                );
                cancelled.store(true, Ordering::Release);
                out.timed_out = true;
                break;
            }
        }
    }
    out
}
