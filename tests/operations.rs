//! Request/response behaviour of the operation engine.

mod common;

use batch_engine::ops::{aggregate, AggregateFunction};
use batch_engine::{BatchConfig, BatchEngine, ItemRule, Operation, OperationRequest, Strategy};
use serde_json::{json, Value};

fn is_even() -> ItemRule {
    ItemRule::new(|v| {
        let n = v
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("{} is not an integer", v))?;
        Ok(json!(n % 2 == 0))
    })
}

fn numbers(n: i64) -> Vec<Value> {
    (1..=n).map(|i| json!(i)).collect()
}

#[test]
fn test_aggregate_defaults() {
    assert_eq!(aggregate(&[], AggregateFunction::Sum, None).result, json!(0));
    assert_eq!(aggregate(&[], AggregateFunction::Min, None).result, Value::Null);
    let mixed = vec![json!(1), json!("x"), json!(3)];
    assert_eq!(aggregate(&mixed, AggregateFunction::Sum, None).result, json!(4));
}

#[tokio::test]
async fn test_filter_scenario_every_strategy() {
    common::init_tracing();
    let engine = BatchEngine::new();
    for strategy in [
        Strategy::Sequential,
        Strategy::ThreadPool,
        Strategy::ProcessPool,
        Strategy::WorkerPool,
        Strategy::Concurrent,
    ] {
        let request = OperationRequest::new("filter")
            .with_items(vec![json!(1), json!(2), json!("bad"), json!(4)])
            .with_rule(is_even())
            .with_batch_size(2)
            .with_strategy(strategy);
        let response = engine.execute(request).await;
        assert!(response.is_success(), "{}", strategy);
        let result = response.result().unwrap();
        assert_eq!(result["filtered"], json!([2, 4]), "{}", strategy);
        assert_eq!(result["rule_errors"], json!(1), "{}", strategy);
    }
}

#[tokio::test]
async fn test_split_scenario() {
    let response = BatchEngine::new()
        .execute_json(r#"{"operation":"split","items":[1,2,3,4,5,6,7,8,9,10],"split_strategy":"by_size","split_value":4}"#)
        .await;
    let result = response.result().unwrap();
    assert_eq!(result["split_sizes"], json!([4, 4, 2]));
    assert_eq!(result["splits"][2], json!([9, 10]));
}

#[tokio::test]
async fn test_streaming_commit_scenario() {
    let response = BatchEngine::new()
        .execute(
            OperationRequest::new("commit")
                .with_items(numbers(25))
                .with_batch_size(10)
                .with_commit_strategy(batch_engine::CommitStrategy::Streaming),
        )
        .await;
    let result = response.result().unwrap();
    assert_eq!(result["committed_count"], json!(25));
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["strategy"], json!("streaming"));
}

#[tokio::test]
async fn test_transform_keeps_null_placeholders() {
    let rule = ItemRule::new(|v| {
        let n = v.as_i64().ok_or_else(|| anyhow::anyhow!("not a number"))?;
        Ok(json!(n * 10))
    });
    let response = BatchEngine::new()
        .execute(
            OperationRequest::new("transform")
                .with_items(vec![json!(1), json!(null), json!(3)])
                .with_rule(rule)
                .with_strategy(Strategy::WorkerPool),
        )
        .await;
    let result = response.result().unwrap();
    assert_eq!(result["transformed"], json!([10, null, 30]));
    assert_eq!(result["error_count"], json!(1));
    assert_eq!(result["strategy"], json!("worker_pool"));
}

#[tokio::test]
async fn test_validate_and_aggregate_by_field() {
    let engine = BatchEngine::new();
    let validated = engine
        .execute(
            OperationRequest::new("validate")
                .with_items(numbers(4))
                .with_rule(is_even()),
        )
        .await;
    assert_eq!(validated.result().unwrap()["valid_items"], json!([2, 4]));
    assert_eq!(validated.result().unwrap()["validation_rate"], json!(0.5));

    let orders = vec![json!({"total": 12}), json!({"total": 30}), json!({"note": "void"})];
    let summed = engine
        .execute(
            OperationRequest::new("aggregate")
                .with_items(orders)
                .with_aggregate("max")
                .with_aggregate_field("total"),
        )
        .await;
    assert_eq!(summed.result().unwrap()["result"], json!(30));
}

#[tokio::test]
async fn test_merge_batches() {
    let response = BatchEngine::new()
        .execute(OperationRequest::new("merge").with_merge(
            "interleave",
            vec![vec![json!("a"), json!("b"), json!("c")], vec![json!(1)]],
        ))
        .await;
    assert_eq!(response.result().unwrap()["merged"], json!(["a", 1, "b", "c"]));
}

#[tokio::test]
async fn test_profile_monitor_throttle() {
    let engine = BatchEngine::new();
    let profiled = engine
        .execute(OperationRequest::new("profile").with_items(numbers(6)))
        .await;
    assert_eq!(profiled.result().unwrap()["item_count"], json!(6));
    assert_eq!(profiled.result().unwrap()["error_count"], json!(0));

    let monitored = engine
        .execute(
            OperationRequest::new("monitor")
                .with_items(numbers(9))
                .with_rule(is_even())
                .with_batch_size(4),
        )
        .await;
    let result = monitored.result().unwrap();
    assert_eq!(result["drained"], json!(9));
    assert_eq!(result["metrics"]["total_processed"], json!(9));

    let throttled = engine
        .execute(
            OperationRequest::new("throttle")
                .with_items(numbers(2))
                .with_throttle_secs(0.01),
        )
        .await;
    assert_eq!(throttled.result().unwrap()["throttled"], json!(true));
}

#[tokio::test]
async fn test_dispatch_failures_are_structured() {
    let engine = BatchEngine::new();

    let unknown = engine.execute_json(r#"{"operation":"explode","items":[]}"#).await;
    assert_eq!(unknown.to_json()["status"], json!("error"));
    assert_eq!(unknown.operation(), "unknown");

    for op in Operation::ALL.into_iter().filter(Operation::requires_rule) {
        let response = engine
            .execute(OperationRequest::new(op.as_str()).with_items(numbers(3)))
            .await;
        assert!(!response.is_success(), "{}", op);
        assert_eq!(response.operation(), op.as_str());
    }

    let bad_split = engine
        .execute(OperationRequest::new("split").with_items(numbers(3)).with_split("by_size", 0))
        .await;
    assert!(!bad_split.is_success());

    let bad_strategy = engine
        .execute_json(r#"{"operation":"transform","strategy":"quantum","items":[1]}"#)
        .await;
    assert!(!bad_strategy.is_success());
}

#[tokio::test]
async fn test_engine_defaults_apply() {
    let engine = BatchEngine::with_defaults(
        BatchConfig::new().with_commit_strategy(batch_engine::CommitStrategy::Individual),
    );
    let response = engine
        .execute(OperationRequest::new("commit").with_items(numbers(3)))
        .await;
    assert_eq!(response.result().unwrap()["flushes"], json!(3));
}

#[tokio::test]
async fn test_far_future_timeout_completes() {
    let engine = BatchEngine::new();
    for strategy in [Strategy::ThreadPool, Strategy::ProcessPool, Strategy::Concurrent] {
        let request = OperationRequest::new("transform")
            .with_items(numbers(5))
            .with_rule(ItemRule::identity())
            .with_batch_size(2)
            .with_timeout_secs(1e19)
            .with_strategy(strategy);
        let response = engine.execute(request).await;
        assert!(response.is_success(), "{}", strategy);
        let result = response.result().unwrap();
        assert_eq!(result["processed_count"], json!(5), "{}", strategy);
        assert_eq!(result["transformed"], json!([1, 2, 3, 4, 5]), "{}", strategy);
    }
}

#[tokio::test]
async fn test_batch_size_beyond_input() {
    let engine = BatchEngine::new();
    let committed = engine
        .execute(
            OperationRequest::new("commit")
                .with_items(numbers(3))
                .with_batch_size(usize::MAX / 2)
                .with_commit_strategy(batch_engine::CommitStrategy::Streaming),
        )
        .await;
    let result = committed.result().unwrap();
    assert_eq!(result["committed_count"], json!(3));
    assert_eq!(result["success"], json!(true));

    let monitored = engine
        .execute(
            OperationRequest::new("monitor")
                .with_items(numbers(3))
                .with_batch_size(usize::MAX / 2),
        )
        .await;
    let result = monitored.result().unwrap();
    assert_eq!(result["drained"], json!(3));
    assert_eq!(result["metrics"]["total_processed"], json!(3));
}

#[tokio::test]
async fn test_profile_times_items_across_retries() {
    let failing = ItemRule::new(|_| anyhow::bail!("offline"));
    let mut request = OperationRequest::new("profile")
        .with_items(numbers(2))
        .with_rule(failing);
    request.max_retries = Some(2);
    request.retry_delay = Some(0.01);
    let response = BatchEngine::new().execute(request).await;
    let result = response.result().unwrap();
    assert_eq!(result["error_count"], json!(2));
    assert!(result["min_item_time"].as_f64().unwrap() >= 0.02);
}
