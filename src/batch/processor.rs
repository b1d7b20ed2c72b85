//! Strategy dispatch and result assembly.

use super::batcher::into_batches;
use super::config::BatchConfig;
use super::metrics::MetricsAggregator;
use super::result::{BatchFailure, BatchResult, ItemError, StrategyOutput};
use super::strategy::worker_pool::{WorkerOutput, WorkerPool};
use super::strategy::{concurrent, process_pool, sequential, thread_pool, RetryPolicy, Strategy};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Runs a per-item processor over a collection under a chosen [`Strategy`].
///
/// Each call is one run: it gets its own `run_id` and, unless one is supplied
/// through [`process_with_metrics`](Self::process_with_metrics), its own
/// [`MetricsAggregator`].
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    fn fresh_metrics(&self) -> Arc<MetricsAggregator> {
        Arc::new(MetricsAggregator::new().with_logging(self.config.enable_monitoring))
    }

    /// Synchronous reference path; results keep input order.
    pub fn process_sequential<T, R, E, F>(&self, items: &[T], f: F) -> BatchResult<R>
    where
        F: Fn(&T) -> Result<R, E>,
        E: Display,
    {
        let run_id = Uuid::new_v4();
        let metrics = self.fresh_metrics();
        let start = Instant::now();
        let output = sequential::run(
            items,
            self.config.batch_size,
            &f,
            &RetryPolicy::from_config(&self.config),
            &metrics,
        );
        self.finish(run_id, Strategy::Sequential, output, start, &metrics)
    }

    pub async fn process<T, R, E, F>(&self, items: Vec<T>, f: F, strategy: Strategy) -> BatchResult<R>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
        E: Display + 'static,
        F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
    {
        self.process_with_metrics(items, f, strategy, self.fresh_metrics())
            .await
    }

    /// Like [`process`](Self::process) with a caller-owned aggregator.
    pub async fn process_with_metrics<T, R, E, F>(
        &self,
        items: Vec<T>,
        f: F,
        strategy: Strategy,
        metrics: Arc<MetricsAggregator>,
    ) -> BatchResult<R>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
        E: Display + 'static,
        F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
    {
        let run_id = Uuid::new_v4();
        let cfg = &self.config;
        let retry = RetryPolicy::from_config(cfg);
        let f = Arc::new(f);
        let start = Instant::now();
        info!(
            %run_id,
            strategy = strategy.as_str(),
            items = items.len(),
            batch_size = cfg.batch_size,
            max_workers = cfg.worker_limit(),
            "batch run started"
        );

        let output = match strategy {
            Strategy::Sequential => {
                let batch_size = cfg.batch_size;
                let m = Arc::clone(&metrics);
                let handle = tokio::task::spawn_blocking(move || {
                    sequential::run(&items, batch_size, &*f, &retry, &m)
                });
                match handle.await {
                    Ok(out) => out,
                    Err(e) => lost_run(e.to_string()),
                }
            }
            Strategy::ThreadPool => {
                thread_pool::run(
                    into_batches(items, cfg.batch_size),
                    cfg.batch_size,
                    cfg.worker_limit(),
                    cfg.timeout,
                    f,
                    retry,
                    Arc::clone(&metrics),
                )
                .await
            }
            Strategy::ProcessPool => {
                process_pool::run(
                    into_batches(items, cfg.batch_size),
                    cfg.batch_size,
                    cfg.worker_limit(),
                    cfg.timeout,
                    f,
                    retry,
                    Arc::clone(&metrics),
                )
                .await
            }
            Strategy::WorkerPool => self.run_worker_pool(items, f, retry, &metrics).await,
            Strategy::Concurrent => {
                concurrent::run_blocking(
                    items,
                    cfg.worker_limit(),
                    cfg.timeout,
                    f,
                    retry,
                    Arc::clone(&metrics),
                )
                .await
            }
        };

        self.finish(run_id, strategy, output, start, &metrics)
    }

    /// Cooperative-concurrent run for an async processor.
    pub async fn process_async<T, R, E, F, Fut>(&self, items: Vec<T>, f: F) -> BatchResult<R>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        E: Display + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let metrics = self.fresh_metrics();
        let start = Instant::now();
        info!(%run_id, strategy = "concurrent", items = items.len(), "batch run started");
        let output = concurrent::run_async(
            items,
            self.config.worker_limit(),
            self.config.timeout,
            Arc::new(f),
            RetryPolicy::from_config(&self.config),
            Arc::clone(&metrics),
        )
        .await;
        self.finish(run_id, Strategy::Concurrent, output, start, &metrics)
    }

    async fn run_worker_pool<T, R, E, F>(
        &self,
        items: Vec<T>,
        f: Arc<F>,
        retry: RetryPolicy,
        metrics: &Arc<MetricsAggregator>,
    ) -> StrategyOutput<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Display + 'static,
        F: Fn(&T) -> Result<R, E> + Send + Sync + 'static,
    {
        let total = items.len();
        let pool = WorkerPool::new(self.config.worker_limit())
            .with_retry(retry)
            .with_metrics(Arc::clone(metrics));
        let (out_tx, out_rx) = crossbeam_channel::unbounded::<WorkerOutput<R>>();
        let handle = tokio::task::spawn_blocking(move || pool.run_into(items, f, out_tx));

        let mut out = StrategyOutput::with_capacity(total);
        match tokio::time::timeout(self.config.timeout, handle).await {
            Ok(Ok(report)) => {
                for failure in report.failures {
                    out.batch_failures.push(BatchFailure {
                        batch_index: None,
                        message: failure,
                    });
                }
            }
            Ok(Err(e)) => out.batch_failures.push(BatchFailure {
                batch_index: None,
                message: e.to_string(),
            }),
            Err(_) => {
                warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "worker pool join timed out; returning partial results"
                );
                out.timed_out = true;
            }
        }
        for WorkerOutput { outcome, .. } in out_rx.try_iter() {
            out.push(outcome);
        }
        out
    }

    fn finish<R>(
        &self,
        run_id: Uuid,
        strategy: Strategy,
        output: StrategyOutput<R>,
        start: Instant,
        metrics: &MetricsAggregator,
    ) -> BatchResult<R> {
        let result =
            BatchResult::assemble(run_id, strategy, output, start.elapsed(), metrics.snapshot());
        info!(
            %run_id,
            strategy = strategy.as_str(),
            processed = result.processed_count,
            succeeded = result.success_count,
            failed = result.error_count,
            batch_failures = result.batch_failures.len(),
            timed_out = result.timed_out,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "batch run finished"
        );
        result
    }
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

fn lost_run<R>(message: String) -> StrategyOutput<R> {
    warn!(error = %message, "sequential run aborted");
    let mut out = StrategyOutput::with_capacity(0);
    out.batch_failures.push(BatchFailure {
        batch_index: None,
        message,
    });
    out
}

/// Convenience for callers that only need to know which items failed.
pub fn failed_indices(errors: &[ItemError]) -> Vec<usize> {
    let mut idx: Vec<usize> = errors.iter().map(|e| e.index).collect();
    idx.sort_unstable();
    idx
}
