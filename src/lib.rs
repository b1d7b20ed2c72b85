//! # batch-engine
//!
//! 通用批处理引擎：对有序数据集进行分批、并发执行、指标汇总，并提供请求驱动的高层操作。
//!
//! A generic batch processing engine: partition an ordered collection into
//! batches, run a caller-supplied per-item function over it under one of several
//! interchangeable concurrency strategies, and report counts, timings and
//! smoothed metrics.
//!
//! ## Core Philosophy
//!
//! - **Failures are data**: a failing item becomes a placeholder and an error
//!   record, never an aborted run
//! - **Pluggable execution**: every [`Strategy`] honours the same input/output contract
//! - **Per-run state**: each run owns its metrics; there are no global singletons
//!
//! ## Quick Start
//!
//! ```rust
//! use batch_engine::{BatchConfig, BatchProcessor, Strategy};
//!
//! #[tokio::main]
//! async fn main() {
//!     let processor = BatchProcessor::new(
//!         BatchConfig::new().with_batch_size(10).with_max_workers(4),
//!     );
//!     let items: Vec<u64> = (1..=100).collect();
//!
//!     let result = processor
//!         .process(items, |n: &u64| Ok::<_, String>(n * n), Strategy::ThreadPool)
//!         .await;
//!
//!     assert_eq!(result.processed_count, 100);
//!     assert!(result.all_succeeded());
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | Configuration, batching, strategies, metrics and results |
//! | [`ops`] | Request-driven operations (transform, filter, aggregate, ...) |
//! | [`error`] | Crate error type and context |

pub mod batch;
pub mod ops;

// Re-export main types for convenience
pub use batch::{BatchConfig, BatchProcessor, BatchResult, CommitStrategy, MetricsAggregator, Strategy};
pub use ops::{BatchEngine, ItemRule, Operation, OperationRequest, OperationResponse};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
