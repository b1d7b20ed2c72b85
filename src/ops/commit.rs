//! Throttle and commit.
//!
//! Commit only counts: there is no durable store behind it. The strategies
//! differ in how often they hand control back to the scheduler.

use crate::batch::{BatchConfig, CommitStrategy, StreamingChunker};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct ThrottleSummary {
    pub throttled: bool,
    pub delay_secs: f64,
    pub item_count: usize,
}

pub async fn throttle(items: &[Value], config: &BatchConfig) -> ThrottleSummary {
    let delay = config.throttle_interval;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    ThrottleSummary {
        throttled: !delay.is_zero(),
        delay_secs: delay.as_secs_f64(),
        item_count: items.len(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitSummary {
    pub committed_count: usize,
    pub success: bool,
    pub strategy: CommitStrategy,
    pub flushes: usize,
    pub elapsed_secs: f64,
}

pub async fn commit(items: Vec<Value>, config: &BatchConfig) -> CommitSummary {
    let start = Instant::now();
    let total = items.len();
    let strategy = config.commit_strategy;
    let mut committed = 0usize;
    let mut flushes = 0usize;

    match strategy {
        CommitStrategy::Batch => {
            committed += items.len();
            flushes = usize::from(total > 0);
        }
        CommitStrategy::Streaming => {
            let mut chunker = StreamingChunker::new(config.batch_size);
            for item in items {
                if chunker.push(item).should_flush() {
                    committed += chunker.flush().len();
                    tokio::task::yield_now().await;
                }
            }
            committed += chunker.flush().len();
            flushes = chunker.flushes();
        }
        CommitStrategy::Individual => {
            for _ in items {
                committed += 1;
                flushes += 1;
                tokio::task::yield_now().await;
            }
        }
    }

    debug!(
        strategy = strategy.as_str(),
        committed,
        flushes,
        "commit finished"
    );
    CommitSummary {
        committed_count: committed,
        success: committed == total,
        strategy,
        flushes,
        elapsed_secs: start.elapsed().as_secs_f64(),
    }
}
