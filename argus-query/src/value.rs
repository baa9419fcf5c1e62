//! Dynamic value handling: nested field resolution, typed-cell
//! normalization, and type-aware comparison.
//!
//! Records are heterogeneous JSON. Field access walks dot paths (numeric
//! components index lists) after first checking the record's `properties`
//! mapping for a typed cell of that name; typed cells normalize to one
//! comparable value before any operator sees them.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Resolve `field` against a record. Returns `Value::Null` when any path
/// component is missing.
pub fn resolve_field(record: &Value, field: &str) -> Value {
    // Typed cells win: `properties.<field>` holds the platform's native
    // encoding, normalized here to a plain value.
    if let Some(Value::Object(props)) = record.get("properties") {
        if let Some(cell) = props.get(field) {
            return normalize_cell(cell);
        }
    }

    let mut current = record;
    for part in field.split('.') {
        current = match current {
            Value::Object(map) => match map.get(part) {
                Some(next) => next,
                None => return Value::Null,
            },
            Value::Array(items) => match part.parse::<usize>().ok().and_then(|i| items.get(i)) {
                Some(next) => next,
                None => return Value::Null,
            },
            _ => return Value::Null,
        };
    }
    current.clone()
}

/// Collapse a typed property cell to a single comparable value:
/// title/rich text → plain text, select → name, multi-select → names,
/// date → start, people → names, relation → ids.
fn normalize_cell(cell: &Value) -> Value {
    let Value::Object(map) = cell else {
        return cell.clone();
    };

    if let Some(Value::Array(fragments)) = map.get("title") {
        return first_plain_text(fragments);
    }
    if let Some(Value::Array(fragments)) = map.get("rich_text") {
        return first_plain_text(fragments);
    }
    if let Some(Value::Object(select)) = map.get("select") {
        return select.get("name").cloned().unwrap_or(Value::Null);
    }
    if let Some(Value::Array(options)) = map.get("multi_select") {
        return Value::Array(
            options
                .iter()
                .map(|o| o.get("name").cloned().unwrap_or(Value::Null))
                .collect(),
        );
    }
    if let Some(number) = map.get("number") {
        return number.clone();
    }
    if let Some(checkbox) = map.get("checkbox") {
        return checkbox.clone();
    }
    if let Some(Value::Object(date)) = map.get("date") {
        return date.get("start").cloned().unwrap_or(Value::Null);
    }
    if let Some(Value::Array(people)) = map.get("people") {
        return Value::Array(
            people
                .iter()
                .map(|p| p.get("name").cloned().unwrap_or(Value::Null))
                .collect(),
        );
    }
    if let Some(Value::Array(relations)) = map.get("relation") {
        return Value::Array(
            relations
                .iter()
                .map(|r| r.get("id").cloned().unwrap_or(Value::Null))
                .collect(),
        );
    }
    cell.clone()
}

fn first_plain_text(fragments: &[Value]) -> Value {
    fragments
        .first()
        .and_then(|f| f.get("plain_text"))
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()))
}

/// Null for filtering purposes: JSON null, empty string, or empty list.
/// (Missing fields resolve to null before this is consulted.)
pub fn is_null_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Numeric view of a value, when one exists.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse an ISO-8601 / RFC 3339 date or datetime string.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

/// Ordering for range operators: datetimes when both sides parse as dates,
/// numbers when both sides coerce, lexicographic otherwise. `None` when
/// either side is null-like.
pub fn compare_for_range(field_value: &Value, filter_value: &Value) -> Option<Ordering> {
    if is_null_like(field_value) || is_null_like(filter_value) {
        return None;
    }

    if let (Value::String(a), Value::String(b)) = (field_value, filter_value) {
        if let (Some(da), Some(db)) = (parse_datetime(a), parse_datetime(b)) {
            return Some(da.cmp(&db));
        }
    }

    if let (Some(a), Some(b)) = (as_number(field_value), as_number(filter_value)) {
        return Some(a.total_cmp(&b));
    }

    Some(display_string(field_value).cmp(&display_string(filter_value)))
}

/// Ordering for sorting. Same-type values compare natively (strings
/// case-insensitively); mixed types fall back to their string forms. Null
/// handling is the sort engine's job, not this function's.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(f64::NAN)
            .total_cmp(&y.as_f64().unwrap_or(f64::NAN)),
        (Value::String(x), Value::String(y)) => {
            // Dates sort chronologically even as strings.
            if let (Some(dx), Some(dy)) = (parse_datetime(x), parse_datetime(y)) {
                return dx.cmp(&dy);
            }
            x.to_lowercase().cmp(&y.to_lowercase())
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => display_string(a).cmp(&display_string(b)),
    }
}

/// Stable text form used for cross-type comparison and cell rendering.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Case-folded equality for the `eq`/`ne` family.
pub fn values_equal(a: &Value, b: &Value, case_sensitive: bool) -> bool {
    if !case_sensitive {
        if let (Value::String(x), Value::String(y)) = (a, b) {
            return x.to_lowercase() == y.to_lowercase();
        }
    }
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_paths_and_indices() {
        let record = json!({"a": {"b": [{"c": 7}, {"c": 8}]}});
        assert_eq!(resolve_field(&record, "a.b.1.c"), json!(8));
        assert_eq!(resolve_field(&record, "a.b.5.c"), Value::Null);
        assert_eq!(resolve_field(&record, "a.missing"), Value::Null);
    }

    #[test]
    fn normalizes_typed_cells() {
        let record = json!({
            "properties": {
                "Name": {"title": [{"plain_text": "Alice"}]},
                "Status": {"select": {"name": "Active"}},
                "Tags": {"multi_select": [{"name": "a"}, {"name": "b"}]},
                "Score": {"number": 42},
                "Done": {"checkbox": true},
                "When": {"date": {"start": "2024-03-01", "end": null}},
                "Links": {"relation": [{"id": "r1"}]}
            }
        });
        assert_eq!(resolve_field(&record, "Name"), json!("Alice"));
        assert_eq!(resolve_field(&record, "Status"), json!("Active"));
        assert_eq!(resolve_field(&record, "Tags"), json!(["a", "b"]));
        assert_eq!(resolve_field(&record, "Score"), json!(42));
        assert_eq!(resolve_field(&record, "Done"), json!(true));
        assert_eq!(resolve_field(&record, "When"), json!("2024-03-01"));
        assert_eq!(resolve_field(&record, "Links"), json!(["r1"]));
    }

    #[test]
    fn null_likeness() {
        assert!(is_null_like(&Value::Null));
        assert!(is_null_like(&json!("")));
        assert!(is_null_like(&json!([])));
        assert!(!is_null_like(&json!(0)));
        assert!(!is_null_like(&json!(false)));
    }

    #[test]
    fn range_comparison_prefers_dates_then_numbers() {
        assert_eq!(
            compare_for_range(&json!("2024-01-02"), &json!("2024-01-10")),
            Some(Ordering::Less)
        );
        assert_eq!(compare_for_range(&json!("10"), &json!(9)), Some(Ordering::Greater));
        assert_eq!(
            compare_for_range(&json!("apple"), &json!("banana")),
            Some(Ordering::Less)
        );
        assert_eq!(compare_for_range(&Value::Null, &json!(1)), None);
    }

    #[test]
    fn sort_comparison_is_case_insensitive_for_strings() {
        assert_eq!(compare_values(&json!("Zebra"), &json!("apple")), Ordering::Greater);
        assert_eq!(compare_values(&json!("Apple"), &json!("apple")), Ordering::Equal);
    }

    #[test]
    fn equality_respects_case_flag() {
        assert!(values_equal(&json!("Eng"), &json!("eng"), false));
        assert!(!values_equal(&json!("Eng"), &json!("eng"), true));
        assert!(values_equal(&json!(5), &json!(5), false));
    }

    #[test]
    fn datetime_parsing_variants() {
        assert!(parse_datetime("2024-03-01").is_some());
        assert!(parse_datetime("2024-03-01T10:30:00Z").is_some());
        assert!(parse_datetime("2024-03-01T10:30:00").is_some());
        assert!(parse_datetime("not a date").is_none());
    }
}
