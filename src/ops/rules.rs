//! Rule-driven operations: transform, filter, validate.
//!
//! Items are tagged with their input position before they reach the
//! processor, so summaries come back in input order whatever the strategy.

use super::request::ItemRule;
use crate::batch::{BatchConfig, BatchProcessor, BatchResult, ItemError, MetricsSnapshot, Strategy};
use serde::Serialize;
use serde_json::Value;

type Indexed = (usize, Value);

/// Python-style truthiness of a rule result.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub strategy: Strategy,
    pub processed_count: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub elapsed_secs: f64,
    pub throughput: f64,
    pub timed_out: bool,
    pub metrics: MetricsSnapshot,
}

impl RunStats {
    fn from_result<R>(result: &BatchResult<R>) -> Self {
        Self {
            strategy: result.strategy,
            processed_count: result.processed_count,
            success_count: result.success_count,
            error_count: result.error_count,
            elapsed_secs: result.elapsed.as_secs_f64(),
            throughput: result.throughput,
            timed_out: result.timed_out,
            metrics: result.metrics,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformSummary {
    /// One entry per processed item, `null` where the rule failed.
    pub transformed: Vec<Value>,
    pub errors: Vec<ItemError>,
    #[serde(flatten)]
    pub stats: RunStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterSummary {
    pub filtered: Vec<Value>,
    pub original_count: usize,
    pub filtered_count: usize,
    /// Items whose rule raised; they are excluded.
    pub rule_errors: usize,
    #[serde(flatten)]
    pub stats: RunStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateSummary {
    pub valid_items: Vec<Value>,
    pub invalid_items: Vec<Value>,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub validation_rate: f64,
    pub errors: Vec<ItemError>,
    #[serde(flatten)]
    pub stats: RunStats,
}

fn indexed(items: Vec<Value>) -> Vec<Indexed> {
    items.into_iter().enumerate().collect()
}

/// Successes by index plus a `None` for every failed index, in input order.
fn by_index<V>(result: BatchResult<(usize, V)>) -> (Vec<(usize, Option<V>)>, BatchResult<()>) {
    let BatchResult {
        run_id,
        strategy,
        processed_count,
        success_count,
        error_count,
        elapsed,
        throughput,
        errors,
        batch_failures,
        results,
        metrics,
        timed_out,
    } = result;
    let mut rows: Vec<(usize, Option<V>)> = results
        .into_iter()
        .flatten()
        .map(|(i, v)| (i, Some(v)))
        .collect();
    rows.extend(errors.iter().map(|e| (e.index, None)));
    rows.sort_unstable_by_key(|(i, _)| *i);
    let header = BatchResult {
        run_id,
        strategy,
        processed_count,
        success_count,
        error_count,
        elapsed,
        throughput,
        errors,
        batch_failures,
        results: Vec::new(),
        metrics,
        timed_out,
    };
    (rows, header)
}

pub async fn transform(
    items: Vec<Value>,
    rule: ItemRule,
    config: &BatchConfig,
    strategy: Strategy,
) -> TransformSummary {
    let processor = BatchProcessor::new(config.clone());
    let result = processor
        .process(
            indexed(items),
            move |(i, v): &Indexed| rule.apply(v).map(|out| (*i, out)),
            strategy,
        )
        .await;
    let (rows, header) = by_index(result);
    TransformSummary {
        transformed: rows
            .into_iter()
            .map(|(_, v)| v.unwrap_or(Value::Null))
            .collect(),
        stats: RunStats::from_result(&header),
        errors: header.errors,
    }
}

pub async fn filter(
    items: Vec<Value>,
    rule: ItemRule,
    config: &BatchConfig,
    strategy: Strategy,
) -> FilterSummary {
    let original_count = items.len();
    let processor = BatchProcessor::new(config.clone());
    let result = processor
        .process(
            indexed(items),
            move |(i, v): &Indexed| {
                let keep = rule.apply(v).map(|r| truthy(&r))?;
                Ok::<_, anyhow::Error>((*i, keep.then(|| v.clone())))
            },
            strategy,
        )
        .await;
    let (rows, header) = by_index(result);
    let filtered: Vec<Value> = rows.into_iter().filter_map(|(_, v)| v.flatten()).collect();
    FilterSummary {
        original_count,
        filtered_count: filtered.len(),
        filtered,
        rule_errors: header.error_count,
        stats: RunStats::from_result(&header),
    }
}

pub async fn validate(
    items: Vec<Value>,
    rule: ItemRule,
    config: &BatchConfig,
    strategy: Strategy,
) -> ValidateSummary {
    let originals = items.clone();
    let processor = BatchProcessor::new(config.clone());
    let result = processor
        .process(
            indexed(items),
            move |(i, v): &Indexed| rule.apply(v).map(|r| (*i, truthy(&r))),
            strategy,
        )
        .await;
    let (rows, header) = by_index(result);
    let mut valid_items = Vec::new();
    let mut invalid_items = Vec::new();
    for (i, verdict) in rows {
        let item = originals[i].clone();
        if verdict.unwrap_or(false) {
            valid_items.push(item);
        } else {
            invalid_items.push(item);
        }
    }
    let checked = valid_items.len() + invalid_items.len();
    let validation_rate = if checked == 0 {
        0.0
    } else {
        valid_items.len() as f64 / checked as f64
    };
    ValidateSummary {
        valid_count: valid_items.len(),
        invalid_count: invalid_items.len(),
        valid_items,
        invalid_items,
        validation_rate,
        stats: RunStats::from_result(&header),
        errors: header.errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn is_even() -> ItemRule {
        ItemRule::new(|v| {
            let n = v
                .as_i64()
                .ok_or_else(|| anyhow::anyhow!("{} is not a number", v))?;
            Ok(json!(n % 2 == 0))
        })
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!(0.5)));
        assert!(truthy(&json!({"a": 1})));
        assert!(truthy(&json!(true)));
    }

    #[tokio::test]
    async fn test_filter_with_failing_rule() {
        let items = vec![json!(1), json!(2), json!("bad"), json!(4)];
        let summary = filter(items, is_even(), &BatchConfig::default(), Strategy::Sequential).await;
        assert_eq!(summary.filtered, vec![json!(2), json!(4)]);
        assert_eq!(summary.original_count, 4);
        assert_eq!(summary.filtered_count, 2);
        assert_eq!(summary.rule_errors, 1);
    }

    #[tokio::test]
    async fn test_filter_keeps_input_order_under_worker_pool() {
        let items: Vec<Value> = (0..40).map(|n| json!(n)).collect();
        let cfg = BatchConfig::new().with_max_workers(4);
        let summary = filter(items, is_even(), &cfg, Strategy::WorkerPool).await;
        let expected: Vec<Value> = (0..40).filter(|n| n % 2 == 0).map(|n| json!(n)).collect();
        assert_eq!(summary.filtered, expected);
    }

    #[tokio::test]
    async fn test_transform_placeholders() {
        let rule = ItemRule::new(|v| {
            let s = v.as_str().ok_or_else(|| anyhow::anyhow!("not a string"))?;
            Ok(json!(s.to_uppercase()))
        });
        let cfg = BatchConfig::new().with_batch_size(2);
        let summary = transform(
            vec![json!("a"), json!(1), json!("c")],
            rule,
            &cfg,
            Strategy::ThreadPool,
        )
        .await;
        assert_eq!(summary.transformed, vec![json!("A"), Value::Null, json!("C")]);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].index, 1);
        assert_eq!(summary.stats.processed_count, 3);
    }

    #[tokio::test]
    async fn test_validate_rate() {
        let items = vec![json!(2), json!(3), json!("x"), json!(8)];
        let summary = validate(items, is_even(), &BatchConfig::default(), Strategy::Concurrent).await;
        assert_eq!(summary.valid_items, vec![json!(2), json!(8)]);
        assert_eq!(summary.invalid_items, vec![json!(3), json!("x")]);
        assert_eq!(summary.valid_count, 2);
        assert!((summary.validation_rate - 0.5).abs() < 1e-9);
    }
}
