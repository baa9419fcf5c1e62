//! Aggregation over the filtered record set.
//!
//! Aggregations run on the full pre-pagination candidate set and attach to
//! the result alongside the page data. Numeric ops coerce through the same
//! rules as range filters; non-numeric values are skipped.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::model::AggregationSpec;
use crate::value::{as_number, display_string, is_null_like, resolve_field};

/// Compute all requested aggregations. Returns `None` when the spec list is
/// empty; unknown ops are reported in place rather than failing the query.
pub fn compute(records: &[Value], specs: &[AggregationSpec]) -> Option<Value> {
    if specs.is_empty() {
        return None;
    }

    let mut out = Map::new();
    for spec in specs {
        let label = match &spec.field {
            Some(field) => format!("{}_{}", spec.op, field),
            None => spec.op.clone(),
        };
        out.insert(label, compute_one(records, spec));
    }
    Some(Value::Object(out))
}

fn compute_one(records: &[Value], spec: &AggregationSpec) -> Value {
    match (spec.op.as_str(), &spec.field) {
        ("count", None) => json!(records.len()),
        ("count", Some(field)) => {
            let n = records
                .iter()
                .filter(|r| !is_null_like(&resolve_field(r, field)))
                .count();
            json!(n)
        }
        ("sum", Some(field)) => json!(numeric_column(records, field).iter().sum::<f64>()),
        ("avg", Some(field)) => {
            let column = numeric_column(records, field);
            if column.is_empty() {
                Value::Null
            } else {
                json!(column.iter().sum::<f64>() / column.len() as f64)
            }
        }
        ("min", Some(field)) => numeric_column(records, field)
            .into_iter()
            .reduce(f64::min)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        ("max", Some(field)) => numeric_column(records, field)
            .into_iter()
            .reduce(f64::max)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),
        ("group_by", Some(field)) => {
            let mut groups: BTreeMap<String, usize> = BTreeMap::new();
            for record in records {
                let value = resolve_field(record, field);
                if is_null_like(&value) {
                    continue;
                }
                *groups.entry(display_string(&value)).or_default() += 1;
            }
            json!(groups)
        }
        (op, None) => json!({ "error": format!("{op} requires a field") }),
        (op, Some(_)) => json!({ "error": format!("unknown aggregation {op}") }),
    }
}

fn numeric_column(records: &[Value], field: &str) -> Vec<f64> {
    records
        .iter()
        .filter_map(|r| as_number(&resolve_field(r, field)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Value> {
        vec![
            json!({"dept": "Eng", "age": 30}),
            json!({"dept": "Eng", "age": 40}),
            json!({"dept": "Sales", "age": 50}),
            json!({"dept": "Sales"}),
        ]
    }

    fn spec(op: &str, field: Option<&str>) -> AggregationSpec {
        AggregationSpec {
            op: op.to_string(),
            field: field.map(String::from),
        }
    }

    #[test]
    fn count_with_and_without_field() {
        let out = compute(&rows(), &[spec("count", None), spec("count", Some("age"))]).unwrap();
        assert_eq!(out["count"], json!(4));
        assert_eq!(out["count_age"], json!(3));
    }

    #[test]
    fn numeric_aggregates() {
        let out = compute(
            &rows(),
            &[
                spec("sum", Some("age")),
                spec("avg", Some("age")),
                spec("min", Some("age")),
                spec("max", Some("age")),
            ],
        )
        .unwrap();
        assert_eq!(out["sum_age"], json!(120.0));
        assert_eq!(out["avg_age"], json!(40.0));
        assert_eq!(out["min_age"], json!(30.0));
        assert_eq!(out["max_age"], json!(50.0));
    }

    #[test]
    fn group_by_counts_values() {
        let out = compute(&rows(), &[spec("group_by", Some("dept"))]).unwrap();
        assert_eq!(out["group_by_dept"]["Eng"], json!(2));
        assert_eq!(out["group_by_dept"]["Sales"], json!(2));
    }

    #[test]
    fn empty_specs_yield_none() {
        assert!(compute(&rows(), &[]).is_none());
    }

    #[test]
    fn avg_over_empty_column_is_null() {
        let out = compute(&rows(), &[spec("avg", Some("missing"))]).unwrap();
        assert_eq!(out["avg_missing"], Value::Null);
    }

    #[test]
    fn unknown_op_reports_error_inline() {
        let out = compute(&rows(), &[spec("median", Some("age"))]).unwrap();
        assert!(out["median_age"]["error"].as_str().unwrap().contains("median"));
    }
}
