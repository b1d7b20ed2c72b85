//! 批处理核心模块：分批、执行策略、指标汇总与结果记录。
//!
//! # Batch Processing Core
//!
//! This module partitions an ordered collection into batches and runs a
//! caller-supplied per-item processor over it using one of several
//! interchangeable concurrency strategies.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchConfig`] | Immutable per-invocation settings (size, workers, timeout, retries) |
//! | [`create_batches`] | Pure partitioning into contiguous batches |
//! | [`StreamingChunker`] | Fixed-size buffer that signals when to flush |
//! | [`MetricsAggregator`] | Lock-guarded totals, smoothed latency, peak throughput |
//! | [`BatchProcessor`] | Dispatches a run to a [`Strategy`] and assembles the result |
//! | [`BatchResult`] | Immutable outcome of one run |
//!
//! ## Example
//!
//! ```rust
//! use batch_engine::batch::{BatchConfig, BatchProcessor};
//!
//! let processor = BatchProcessor::new(BatchConfig::new().with_batch_size(3));
//! let result = processor.process_sequential(&[1, 2, 0, 4], |x: &i32| {
//!     if *x == 0 { Err("zero") } else { Ok(12 / x) }
//! });
//!
//! assert_eq!(result.results, vec![Some(12), Some(6), None, Some(3)]);
//! assert_eq!(result.error_count, 1);
//! ```
//!
//! ## Failure model
//!
//! - A failing item becomes a `None` placeholder and an [`ItemError`]
//! - A failing batch task is recorded as a [`BatchFailure`] and contributes nothing
//! - A timeout stops the wait and returns whatever completed

mod batcher;
mod config;
mod metrics;
mod processor;
mod result;
pub mod strategy;

pub use batcher::{create_batches, into_batches, ChunkAddResult, StreamingChunker};
pub use config::{BatchConfig, CommitStrategy, MAX_WORKERS};
pub(crate) use config::secs_to_duration;
pub use metrics::{MetricsAggregator, MetricsSnapshot};
pub use processor::{failed_indices, BatchProcessor};
pub use result::{BatchFailure, BatchResult, ItemError};
pub use strategy::queue_drain::{DrainReport, QueueDrain};
pub use strategy::worker_pool::{WorkerOutput, WorkerPool, WorkerPoolReport, WorkerPoolRun};
pub use strategy::{RetryPolicy, Strategy};
