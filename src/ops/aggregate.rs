//! Reductions over a collection of JSON values.

use crate::{Error, ErrorContext, Result};
use serde::Serialize;
use serde_json::{Number, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Count => "count",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

impl FromStr for AggregateFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregateFunction::Sum),
            "count" => Ok(AggregateFunction::Count),
            "avg" | "mean" | "average" => Ok(AggregateFunction::Avg),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            other => Err(Error::validation_with_context(
                format!("unsupported aggregate function '{}'", other),
                ErrorContext::new()
                    .with_field_path("aggregate_function")
                    .with_details("expected one of: sum, count, avg, min, max")
                    .with_source("aggregate"),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateSummary {
    pub function: AggregateFunction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub result: Value,
    pub input_count: usize,
    /// Values that took part in a numeric reduction.
    pub numeric_count: usize,
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_value(v: &Value) -> Option<Self> {
        let Value::Number(n) = v else {
            return None;
        };
        match n.as_i64() {
            Some(i) => Some(Num::Int(i)),
            None => n.as_f64().map(Num::Float),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::from(i),
            Num::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        }
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Reduce `items`; non-numeric inputs are skipped by numeric reducers.
///
/// With `field`, object items contribute the value under that key. Empty
/// input gives `0` for `sum`, `0` for `count` and `null` otherwise.
pub fn aggregate(items: &[Value], function: AggregateFunction, field: Option<&str>) -> AggregateSummary {
    let numbers: Vec<Num> = items
        .iter()
        .filter_map(|item| match field {
            Some(key) => item.get(key),
            None => Some(item),
        })
        .filter_map(Num::from_value)
        .collect();

    let result = match function {
        AggregateFunction::Count => Value::from(items.len()),
        AggregateFunction::Sum => sum(&numbers),
        AggregateFunction::Avg => {
            if numbers.is_empty() {
                Value::Null
            } else {
                let total: f64 = numbers.iter().map(|n| n.as_f64()).sum();
                float_value(total / numbers.len() as f64)
            }
        }
        AggregateFunction::Min => extreme(&numbers, |candidate, best| candidate < best),
        AggregateFunction::Max => extreme(&numbers, |candidate, best| candidate > best),
    };

    AggregateSummary {
        function,
        field: field.map(str::to_string),
        result,
        input_count: items.len(),
        numeric_count: numbers.len(),
    }
}

fn sum(numbers: &[Num]) -> Value {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0f64;
    for n in numbers {
        float_total += n.as_f64();
        int_total = match (int_total, n) {
            (Some(acc), Num::Int(i)) => acc.checked_add(*i),
            _ => None,
        };
    }
    match int_total {
        Some(i) => Value::from(i),
        None => float_value(float_total),
    }
}

fn extreme(numbers: &[Num], better: impl Fn(f64, f64) -> bool) -> Value {
    numbers
        .iter()
        .copied()
        .reduce(|best, n| if better(n.as_f64(), best.as_f64()) { n } else { best })
        .map(Num::into_value)
        .unwrap_or(Value::Null)
}
