//! Merge and split.

use crate::{Error, ErrorContext, Result};
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Concat,
    Interleave,
}

impl FromStr for MergeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concat" | "concatenate" => Ok(MergeStrategy::Concat),
            "interleave" => Ok(MergeStrategy::Interleave),
            other => Err(Error::validation_with_context(
                format!("unsupported merge strategy '{}'", other),
                ErrorContext::new()
                    .with_field_path("merge_strategy")
                    .with_source("merge"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Chunks of `split_value` items.
    BySize,
    /// `split_value` contiguous chunks of near-equal size.
    ByCount,
}

impl FromStr for SplitStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "by_size" | "size" => Ok(SplitStrategy::BySize),
            "by_count" | "count" => Ok(SplitStrategy::ByCount),
            other => Err(Error::validation_with_context(
                format!("unsupported split strategy '{}'", other),
                ErrorContext::new()
                    .with_field_path("split_strategy")
                    .with_source("split"),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeSummary {
    pub merged: Vec<Value>,
    pub merged_count: usize,
    pub source_count: usize,
    pub strategy: MergeStrategy,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub splits: Vec<Vec<Value>>,
    pub split_count: usize,
    pub split_sizes: Vec<usize>,
    pub strategy: SplitStrategy,
}

/// Combine several collections. Interleave takes one element from each source
/// per round and skips sources that have run out.
pub fn merge(sources: Vec<Vec<Value>>, strategy: MergeStrategy) -> MergeSummary {
    let source_count = sources.len();
    let merged: Vec<Value> = match strategy {
        MergeStrategy::Concat => sources.into_iter().flatten().collect(),
        MergeStrategy::Interleave => {
            let total = sources.iter().map(Vec::len).sum();
            let mut iters: Vec<_> = sources.into_iter().map(Vec::into_iter).collect();
            let mut out = Vec::with_capacity(total);
            while out.len() < total {
                for it in iters.iter_mut() {
                    if let Some(v) = it.next() {
                        out.push(v);
                    }
                }
            }
            out
        }
    };
    MergeSummary {
        merged_count: merged.len(),
        merged,
        source_count,
        strategy,
    }
}

/// Treat each item as one source collection; non-array items stand alone.
pub fn sources_from_items(items: Vec<Value>) -> Vec<Vec<Value>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Array(values) => values,
            other => vec![other],
        })
        .collect()
}

pub fn split(items: Vec<Value>, strategy: SplitStrategy, value: usize) -> Result<SplitSummary> {
    if value == 0 {
        return Err(Error::validation_with_context(
            "split_value must be at least 1",
            ErrorContext::new()
                .with_field_path("split_value")
                .with_source("split"),
        ));
    }
    let splits = match strategy {
        SplitStrategy::BySize => crate::batch::into_batches(items, value),
        SplitStrategy::ByCount => split_by_count(items, value),
    };
    let split_sizes: Vec<usize> = splits.iter().map(Vec::len).collect();
    Ok(SplitSummary {
        split_count: splits.len(),
        split_sizes,
        splits,
        strategy,
    })
}

fn split_by_count(items: Vec<Value>, parts: usize) -> Vec<Vec<Value>> {
    // more parts than items would only produce empty chunks
    let parts = parts.min(items.len());
    if parts == 0 {
        return Vec::new();
    }
    let base = items.len() / parts;
    let extra = items.len() % parts;
    let mut iter = items.into_iter();
    (0..parts)
        .map(|i| {
            let take = base + usize::from(i < extra);
            iter.by_ref().take(take).collect::<Vec<_>>()
        })
        .filter(|chunk| !chunk.is_empty())
        .collect()
}
