//! Profiling and monitoring operations.
//!
//! Rules are synchronous and may sleep between retries, so both operations run
//! them on the blocking pool.

use super::request::ItemRule;
use crate::batch::strategy::item::run_item;
use crate::batch::{BatchConfig, MetricsAggregator, MetricsSnapshot, QueueDrain, RetryPolicy};
use crate::{Error, ErrorContext, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub item_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Seconds.
    pub total_time: f64,
    pub avg_time_per_item: f64,
    pub min_item_time: f64,
    pub max_item_time: f64,
    pub throughput: f64,
    pub metrics: MetricsSnapshot,
}

/// Time every item of `items`, one after another.
///
/// An item's time covers all of its attempts, retry delays included.
pub async fn profile(items: Vec<Value>, rule: ItemRule, config: &BatchConfig) -> Result<ProfileSummary> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || profile_blocking(&items, &rule, &config))
        .await
        .map_err(|e| {
            Error::runtime_with_context(
                format!("profile run aborted: {}", e),
                ErrorContext::new().with_source("profile"),
            )
        })
}

fn profile_blocking(items: &[Value], rule: &ItemRule, config: &BatchConfig) -> ProfileSummary {
    let metrics = MetricsAggregator::new().with_logging(config.enable_monitoring);
    let retry = RetryPolicy::from_config(config);
    let apply = |v: &Value| rule.apply(v);
    let size = config.batch_size.max(1);

    let run_start = Instant::now();
    let mut timings: Vec<Duration> = Vec::with_capacity(items.len());
    let mut error_count = 0usize;
    for (batch_index, batch) in items.chunks(size).enumerate() {
        let batch_start = Instant::now();
        let mut batch_errors = 0usize;
        for (i, item) in batch.iter().enumerate() {
            let start = Instant::now();
            let outcome = run_item(batch_index * size + i, item, &apply, &retry);
            timings.push(start.elapsed());
            if outcome.is_err() {
                batch_errors += 1;
            }
        }
        error_count += batch_errors;
        metrics.update(batch_start.elapsed(), batch.len(), batch_errors);
    }
    let total = run_start.elapsed();

    let secs = |d: &Duration| d.as_secs_f64();
    let total_time = total.as_secs_f64();
    let avg_time_per_item = if timings.is_empty() {
        0.0
    } else {
        timings.iter().map(secs).sum::<f64>() / timings.len() as f64
    };
    let throughput = if total_time > 0.0 {
        items.len() as f64 / total_time
    } else {
        0.0
    };
    info!(
        items = items.len(),
        failed = error_count,
        elapsed_ms = total.as_millis() as u64,
        "profile finished"
    );

    ProfileSummary {
        item_count: items.len(),
        success_count: items.len() - error_count,
        error_count,
        total_time,
        avg_time_per_item,
        min_item_time: timings.iter().map(secs).reduce(f64::min).unwrap_or(0.0),
        max_item_time: timings.iter().map(secs).reduce(f64::max).unwrap_or(0.0),
        throughput,
        metrics: metrics.snapshot(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorSummary {
    pub metrics: MetricsSnapshot,
    pub drained: usize,
    pub chunks: usize,
    pub queue_high_water: usize,
    pub timed_out: bool,
    pub error_rate: f64,
}

/// Push items through a bounded queue of `batch_size` and record metrics per
/// drained chunk.
pub async fn monitor(items: Vec<Value>, rule: ItemRule, config: &BatchConfig) -> MonitorSummary {
    let metrics = Arc::new(MetricsAggregator::new().with_logging(config.enable_monitoring));
    let retry = RetryPolicy::from_config(config);

    let report = QueueDrain::new(config.batch_size, config.timeout)
        .drain(items, |offset, chunk| {
            let rule = rule.clone();
            let metrics = Arc::clone(&metrics);
            async move {
                let handle = tokio::task::spawn_blocking(move || {
                    let apply = |v: &Value| rule.apply(v);
                    let start = Instant::now();
                    let mut errors = 0usize;
                    for (i, item) in chunk.iter().enumerate() {
                        if run_item(offset + i, item, &apply, &retry).is_err() {
                            errors += 1;
                        }
                    }
                    metrics.update(start.elapsed(), chunk.len(), errors);
                });
                if let Err(e) = handle.await {
                    warn!(offset, error = %e, "monitor chunk aborted");
                }
            }
        })
        .await;

    let metrics = metrics.snapshot();
    let error_rate = if metrics.total_processed == 0 {
        0.0
    } else {
        metrics.total_errors as f64 / metrics.total_processed as f64
    };
    MonitorSummary {
        metrics,
        drained: report.drained,
        chunks: report.chunks,
        queue_high_water: report.high_water,
        timed_out: report.timed_out,
        error_rate,
    }
}
