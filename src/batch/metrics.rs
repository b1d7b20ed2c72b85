//! Run-scoped metrics accumulator.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Point-in-time copy of a [`MetricsAggregator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_processed: u64,
    pub total_errors: u64,
    /// Smoothed latency in seconds (see [`MetricsAggregator::update`]).
    pub avg_processing_time: f64,
    /// Highest items-per-second rate seen in any single update.
    pub peak_throughput: f64,
}

#[derive(Debug, Default)]
struct State {
    total_processed: u64,
    total_errors: u64,
    avg_processing_time: f64,
    peak_throughput: f64,
}

/// Mutex-guarded accumulator shared by the workers of one processing run.
///
/// Construct one per run and hand it to strategies by reference; there is no
/// process-wide instance. The lock is held only for the O(1) update, never
/// across an item's processing.
#[derive(Debug)]
pub struct MetricsAggregator {
    state: Mutex<State>,
    log_updates: bool,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            log_updates: false,
        }
    }

    /// Emit a debug event on every update.
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_updates = enabled;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State is plain counters; a panic elsewhere cannot leave it half-written.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fold one batch or worker completion into the totals.
    ///
    /// `avg_processing_time` is blended as `(avg + elapsed) / 2`, not a
    /// cumulative mean.
    pub fn update(&self, elapsed: Duration, processed_count: usize, error_count: usize) {
        let secs = elapsed.as_secs_f64();
        let mut st = self.lock();
        st.total_processed += processed_count as u64;
        st.total_errors += error_count as u64;
        st.avg_processing_time = (st.avg_processing_time + secs) / 2.0;
        if secs > 0.0 {
            let throughput = processed_count as f64 / secs;
            if throughput > st.peak_throughput {
                st.peak_throughput = throughput;
            }
        }
        if self.log_updates {
            debug!(
                processed = processed_count,
                errors = error_count,
                elapsed_ms = elapsed.as_millis() as u64,
                total_processed = st.total_processed,
                total_errors = st.total_errors,
                "batch metrics updated"
            );
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let st = self.lock();
        MetricsSnapshot {
            total_processed: st.total_processed,
            total_errors: st.total_errors,
            avg_processing_time: st.avg_processing_time,
            peak_throughput: st.peak_throughput,
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
