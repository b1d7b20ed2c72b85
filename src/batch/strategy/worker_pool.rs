//! Explicit worker pool: long-lived threads fed through a queue.
//!
//! The input queue receives every item followed by exactly one shutdown
//! sentinel per spawned worker. Each worker loops
//! `Running -> dequeue -> {Processing -> Running | Terminated}` and only
//! terminates on a sentinel, so no worker is abandoned and no sentinel is left
//! behind. Results are drained from the output queue after the workers join;
//! their order is unrelated to input order.

use super::item::{run_item, RetryPolicy};
use crate::batch::config::MAX_WORKERS;
use crate::batch::metrics::MetricsAggregator;
use crate::batch::result::ItemError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

enum WorkItem<T> {
    Job { index: usize, item: T },
    Shutdown,
}

/// One element of the output queue.
#[derive(Debug)]
pub struct WorkerOutput<R> {
    pub index: usize,
    /// `Err` carries the failure; the placeholder result for it is `None`.
    pub outcome: Result<R, ItemError>,
}

/// Lifecycle counters of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerPoolReport {
    pub workers_spawned: usize,
    pub workers_joined: usize,
    pub sentinels_sent: usize,
    pub sentinels_consumed: usize,
    /// Spawn errors and workers that died abnormally.
    pub failures: Vec<String>,
}

#[derive(Debug)]
pub struct WorkerPoolRun<R> {
    pub outputs: Vec<WorkerOutput<R>>,
    pub report: WorkerPoolReport,
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    retry: RetryPolicy,
    metrics: Arc<MetricsAggregator>,
}

impl WorkerPool {
    /// `workers` is clamped to `1..=MAX_WORKERS`.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.clamp(1, MAX_WORKERS),
            retry: RetryPolicy::none(),
            metrics: Arc::new(MetricsAggregator::new()),
        }
    }
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
    pub fn with_metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = metrics;
        self
    }
    pub fn workers(&self) -> usize {
        self.workers
    }
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Process `items` and block until every worker has joined.
    pub fn run<T, R, E, F>(&self, items: Vec<T>, f: Arc<F>) -> WorkerPoolRun<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Display,
        F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
    {
        let (out_tx, out_rx) = unbounded();
        let report = self.run_into(items, f, out_tx);
        WorkerPoolRun {
            outputs: out_rx.try_iter().collect(),
            report,
        }
    }

    /// Like [`run`](Self::run) but results go to a caller-owned queue, so a
    /// caller that stops waiting can still drain what was produced.
    pub fn run_into<T, R, E, F>(
        &self,
        items: Vec<T>,
        f: Arc<F>,
        output: Sender<WorkerOutput<R>>,
    ) -> WorkerPoolReport
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Display,
        F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
    {
        let (in_tx, in_rx) = unbounded::<WorkItem<T>>();
        let sentinels = Arc::new(AtomicUsize::new(0));
        let mut report = WorkerPoolReport::default();
        let mut handles = Vec::with_capacity(self.workers);

        for worker_id in 0..self.workers {
            let rx = in_rx.clone();
            let tx = output.clone();
            let f = Arc::clone(&f);
            let metrics = Arc::clone(&self.metrics);
            let sentinels = Arc::clone(&sentinels);
            let retry = self.retry;
            let spawned = thread::Builder::new()
                .name(format!("batch-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, rx, tx, &*f, &retry, &metrics, &sentinels));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(worker_id, error = %e, "failed to spawn worker");
                    report.failures.push(format!("worker {} spawn failed: {}", worker_id, e));
                }
            }
        }
        drop(in_rx);
        drop(output);
        report.workers_spawned = handles.len();

        if handles.is_empty() {
            return report;
        }

        // Receivers stay alive while workers hold clones, so sends cannot fail here.
        for (index, item) in items.into_iter().enumerate() {
            let _ = in_tx.send(WorkItem::Job { index, item });
        }
        for _ in 0..handles.len() {
            if in_tx.send(WorkItem::Shutdown).is_ok() {
                report.sentinels_sent += 1;
            }
        }
        drop(in_tx);

        for handle in handles {
            match handle.join() {
                Ok(()) => report.workers_joined += 1,
                Err(_) => report.failures.push("worker thread panicked".to_string()),
            }
        }
        report.sentinels_consumed = sentinels.load(Ordering::Acquire);
        debug!(
            workers = report.workers_joined,
            sentinels = report.sentinels_consumed,
            "worker pool joined"
        );
        report
    }
}

fn worker_loop<T, R, E, F>(
    worker_id: usize,
    rx: Receiver<WorkItem<T>>,
    tx: Sender<WorkerOutput<R>>,
    f: &F,
    retry: &RetryPolicy,
    metrics: &MetricsAggregator,
    sentinels: &AtomicUsize,
) where
    F: Fn(&T) -> Result<R, E> + ?Sized,
    E: Display,
{
    let start = Instant::now();
    let mut processed = 0usize;
    let mut errors = 0usize;
    loop {
        match rx.recv() {
            Ok(WorkItem::Job { index, item }) => {
                let outcome = run_item(index, &item, f, retry);
                processed += 1;
                if outcome.is_err() {
                    errors += 1;
                }
                // The caller may have stopped listening; keep draining the input.
                let _ = tx.send(WorkerOutput { index, outcome });
            }
            Ok(WorkItem::Shutdown) => {
                sentinels.fetch_add(1, Ordering::AcqRel);
                break;
            }
            Err(_) => {
                warn!(worker_id, "input queue closed before sentinel");
                break;
            }
        }
    }
    metrics.update(start.elapsed(), processed, errors);
    debug!(worker_id, processed, errors, "worker terminated");
}
