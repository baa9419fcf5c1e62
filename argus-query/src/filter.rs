//! Filter engine: the 17-operator predicate vocabulary over records.
//!
//! Filters apply in sequence with early termination on an empty set. Regex
//! patterns compile once per distinct (pattern, case flag) pair and are
//! shared across queries. Numeric range filters over large inputs take a
//! column-extraction path with identical semantics.

use std::cmp::Ordering;

use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::debug;

use crate::model::{QueryFilter, QueryOperator};
use crate::value::{
    compare_for_range, display_string, is_null_like, resolve_field, values_equal,
};
use crate::QueryError;

use argus_search::FuzzyMatcher;

/// Row-count threshold past which numeric range filters extract the field
/// column once instead of resolving per comparison.
const BULK_NUMERIC_THRESHOLD: usize = 1000;

const DEFAULT_FUZZY_THRESHOLD: f64 = 0.7;

/// Stateful only in its compiled-pattern cache; safe to share.
#[derive(Debug, Default)]
pub struct FilterEngine {
    regex_cache: DashMap<(String, bool), Regex>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `filters` in order, returning the surviving records.
    pub fn apply(&self, records: &[Value], filters: &[QueryFilter]) -> Result<Vec<Value>, QueryError> {
        if filters.is_empty() {
            return Ok(records.to_vec());
        }

        let mut current: Vec<Value> = records.to_vec();
        for filter in filters {
            if current.is_empty() {
                break;
            }
            self.validate(filter)?;

            if is_numeric_range(filter) && current.len() > BULK_NUMERIC_THRESHOLD {
                current = self.apply_numeric_bulk(current, filter);
            } else {
                let mut kept = Vec::with_capacity(current.len());
                for record in current {
                    if self.matches(&record, filter)? {
                        kept.push(record);
                    }
                }
                current = kept;
            }
            debug!(field = %filter.field, op = filter.operator.as_str(), remaining = current.len(), "applied filter");
        }
        Ok(current)
    }

    /// Shape checks surfaced before any record is touched.
    fn validate(&self, filter: &QueryFilter) -> Result<(), QueryError> {
        match filter.operator {
            QueryOperator::In | QueryOperator::NotIn => {
                if !filter.value.is_array() {
                    return Err(QueryError::BadFilterShape(format!(
                        "{} requires a list value",
                        filter.operator.as_str()
                    )));
                }
            }
            QueryOperator::Between => match filter.value.as_array() {
                Some(bounds) if bounds.len() == 2 => {}
                _ => {
                    return Err(QueryError::BadFilterShape(
                        "between requires a list of exactly 2 values".to_string(),
                    ))
                }
            },
            QueryOperator::Regex => {
                // Compile (and cache) eagerly so a bad pattern fails the
                // query instead of silently matching nothing.
                self.compiled(filter)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Does one record pass one filter?
    pub fn matches(&self, record: &Value, filter: &QueryFilter) -> Result<bool, QueryError> {
        let field_value = resolve_field(record, &filter.field);

        let passed = match filter.operator {
            QueryOperator::Eq => values_equal(&field_value, &filter.value, filter.case_sensitive),
            QueryOperator::Ne => !values_equal(&field_value, &filter.value, filter.case_sensitive),
            QueryOperator::Contains => contains(&field_value, &filter.value, filter.case_sensitive),
            QueryOperator::NotContains => !contains(&field_value, &filter.value, filter.case_sensitive),
            QueryOperator::In => in_set(&field_value, &filter.value, filter.case_sensitive),
            QueryOperator::NotIn => !in_set(&field_value, &filter.value, filter.case_sensitive),
            QueryOperator::Gt => {
                compare_for_range(&field_value, &filter.value) == Some(Ordering::Greater)
            }
            QueryOperator::Gte => matches!(
                compare_for_range(&field_value, &filter.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            QueryOperator::Lt => compare_for_range(&field_value, &filter.value) == Some(Ordering::Less),
            QueryOperator::Lte => matches!(
                compare_for_range(&field_value, &filter.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            QueryOperator::Between => {
                // Arity was validated; both bounds inclusive.
                let bounds = filter.value.as_array().map(|b| (&b[0], &b[1]));
                match bounds {
                    Some((low, high)) => {
                        matches!(
                            compare_for_range(&field_value, low),
                            Some(Ordering::Greater | Ordering::Equal)
                        ) && matches!(
                            compare_for_range(&field_value, high),
                            Some(Ordering::Less | Ordering::Equal)
                        )
                    }
                    None => false,
                }
            }
            QueryOperator::IsNull => is_null_like(&field_value),
            QueryOperator::IsNotNull => !is_null_like(&field_value),
            QueryOperator::Regex => match &field_value {
                Value::String(text) => self.compiled(filter)?.is_match(text),
                _ => false,
            },
            QueryOperator::Fuzzy => fuzzy_matches(&field_value, &filter.value),
            QueryOperator::StartsWith => affix(&field_value, &filter.value, filter.case_sensitive, true),
            QueryOperator::EndsWith => affix(&field_value, &filter.value, filter.case_sensitive, false),
        };
        Ok(passed)
    }

    fn compiled(&self, filter: &QueryFilter) -> Result<Regex, QueryError> {
        let pattern = match &filter.value {
            Value::String(p) => p.clone(),
            other => display_string(other),
        };
        let key = (pattern.clone(), filter.case_sensitive);
        if let Some(existing) = self.regex_cache.get(&key) {
            return Ok(existing.clone());
        }
        let compiled = RegexBuilder::new(&pattern)
            .case_insensitive(!filter.case_sensitive)
            .build()
            .map_err(|err| QueryError::BadRegex {
                pattern: pattern.clone(),
                reason: err.to_string(),
            })?;
        self.regex_cache.insert(key, compiled.clone());
        Ok(compiled)
    }

    /// Bulk path for gt/gte/lt/lte with a numeric bound: extract the column
    /// once, compare as f64.
    fn apply_numeric_bulk(&self, records: Vec<Value>, filter: &QueryFilter) -> Vec<Value> {
        let Some(bound) = crate::value::as_number(&filter.value) else {
            return records
                .into_iter()
                .filter(|r| self.matches(r, filter).unwrap_or(false))
                .collect();
        };
        let keep = |v: f64| match filter.operator {
            QueryOperator::Gt => v > bound,
            QueryOperator::Gte => v >= bound,
            QueryOperator::Lt => v < bound,
            QueryOperator::Lte => v <= bound,
            _ => false,
        };
        records
            .into_iter()
            .filter(|record| {
                crate::value::as_number(&resolve_field(record, &filter.field))
                    .map(keep)
                    .unwrap_or(false)
            })
            .collect()
    }
}

fn is_numeric_range(filter: &QueryFilter) -> bool {
    matches!(
        filter.operator,
        QueryOperator::Gt | QueryOperator::Gte | QueryOperator::Lt | QueryOperator::Lte
    ) && filter.value.is_number()
}

/// Substring for strings, membership for lists.
fn contains(field_value: &Value, needle: &Value, case_sensitive: bool) -> bool {
    match field_value {
        Value::String(haystack) => {
            let needle = display_string(needle);
            if case_sensitive {
                haystack.contains(&needle)
            } else {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
        }
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle, case_sensitive)),
        _ => false,
    }
}

fn in_set(field_value: &Value, set: &Value, case_sensitive: bool) -> bool {
    match set {
        Value::Array(items) => items
            .iter()
            .any(|item| values_equal(field_value, item, case_sensitive)),
        _ => false,
    }
}

fn affix(field_value: &Value, needle: &Value, case_sensitive: bool, prefix: bool) -> bool {
    let (Value::String(haystack), needle) = (field_value, display_string(needle)) else {
        return false;
    };
    let (haystack, needle) = if case_sensitive {
        (haystack.clone(), needle)
    } else {
        (haystack.to_lowercase(), needle.to_lowercase())
    };
    if prefix {
        haystack.starts_with(&needle)
    } else {
        haystack.ends_with(&needle)
    }
}

/// The fuzzy operator accepts a bare value (default threshold) or
/// `{"text": ..., "threshold": ...}`.
fn fuzzy_matches(field_value: &Value, filter_value: &Value) -> bool {
    let Value::String(text) = field_value else {
        return false;
    };
    let (needle, threshold) = match filter_value {
        Value::Object(map) => (
            map.get("text").map(display_string).unwrap_or_default(),
            map.get("threshold")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_FUZZY_THRESHOLD),
        ),
        other => (display_string(other), DEFAULT_FUZZY_THRESHOLD),
    };
    if needle.is_empty() {
        return false;
    }
    FuzzyMatcher::combined_similarity(&text.to_lowercase(), &needle.to_lowercase()) >= threshold
}
