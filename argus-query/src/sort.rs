//! Sorting, pagination and top-k selection.
//!
//! The comparator builds a `(null_bucket, value)` key per sort field: nulls
//! always order after non-nulls regardless of direction, and direction
//! inverts only the value comparison. Sorting is stable, with an O(n)
//! pre-sorted check up front. Cursors encode the sort-key tuple of the first
//! record after the page and are positioned with binary search under the same
//! comparator.

use std::cmp::Ordering;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{Map, Value};
use tracing::debug;

use crate::model::{SortField, SortOrder};
use crate::value::{compare_values, is_null_like, resolve_field};
use crate::QueryError;

/// One page produced by cursor pagination.
#[derive(Debug, Clone)]
pub struct CursorPage {
    pub records: Vec<Value>,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
}

/// Stateless sorting and pagination engine.
#[derive(Debug, Default)]
pub struct SortEngine;

impl SortEngine {
    pub fn new() -> Self {
        Self
    }

    /// Stable multi-key sort. Returns the input untouched when it is already
    /// in order.
    pub fn apply_sorting(&self, mut records: Vec<Value>, sort_fields: &[SortField]) -> Vec<Value> {
        if records.len() <= 1 || sort_fields.is_empty() {
            return records;
        }
        if self.is_sorted(&records, sort_fields) {
            debug!("input already sorted, skipping sort");
            return records;
        }
        records.sort_by(|a, b| compare_records(a, b, sort_fields));
        records
    }

    /// Single-pass pre-sorted check under the same comparator.
    fn is_sorted(&self, records: &[Value], sort_fields: &[SortField]) -> bool {
        records
            .windows(2)
            .all(|pair| compare_records(&pair[0], &pair[1], sort_fields) != Ordering::Greater)
    }

    /// Offset pagination: 1-based page, pages below 1 are treated as 1.
    /// Returns the page plus the pre-pagination total.
    pub fn apply_pagination(&self, records: Vec<Value>, page: usize, size: usize) -> (Vec<Value>, usize) {
        let total = records.len();
        let size = size.max(1);
        let start = page.max(1).saturating_sub(1) * size;
        let paged = records.into_iter().skip(start).take(size).collect();
        (paged, total)
    }

    /// Cursor pagination over sorted input. `cursor` is an opaque token from
    /// a previous page; `None` starts at the beginning.
    pub fn apply_cursor_pagination(
        &self,
        records: &[Value],
        cursor: Option<&str>,
        size: usize,
        sort_fields: &[SortField],
    ) -> Result<CursorPage, QueryError> {
        if records.is_empty() {
            return Ok(CursorPage {
                records: Vec::new(),
                next_cursor: None,
                prev_cursor: None,
            });
        }
        let size = size.max(1);

        let start = match cursor {
            Some(cursor) => {
                let key = decode_cursor(cursor)?;
                // First record at or after the cursor key.
                records.partition_point(|record| {
                    compare_record_to_key(record, &key, sort_fields) == Ordering::Less
                })
            }
            None => 0,
        };
        let end = (start + size).min(records.len());

        let next_cursor = if end < records.len() {
            Some(encode_cursor(&records[end], sort_fields))
        } else {
            None
        };
        let prev_cursor = if start > 0 {
            Some(encode_cursor(&records[start.saturating_sub(size)], sort_fields))
        } else {
            None
        };

        Ok(CursorPage {
            records: records[start..end].to_vec(),
            next_cursor,
            prev_cursor,
        })
    }

    /// The first `k` records under the sort order, via a bounded max-heap
    /// (the heap root is the worst retained record). Falls back to a full
    /// sort when `k` covers the input.
    pub fn top_k(&self, records: &[Value], k: usize, sort_fields: &[SortField]) -> Vec<Value> {
        if k == 0 {
            return Vec::new();
        }
        if k >= records.len() {
            return self.apply_sorting(records.to_vec(), sort_fields);
        }

        let mut heap: Vec<Value> = Vec::with_capacity(k);
        for record in records {
            if heap.len() < k {
                heap.push(record.clone());
                let last = heap.len() - 1;
                sift_up(&mut heap, last, sort_fields);
            } else if compare_records(record, &heap[0], sort_fields) == Ordering::Less {
                heap[0] = record.clone();
                sift_down(&mut heap, 0, sort_fields);
            }
        }
        heap.sort_by(|a, b| compare_records(a, b, sort_fields));
        heap
    }
}

/// Compound comparator over all sort fields; equal keys preserve input order
/// through the stable sort.
pub fn compare_records(a: &Value, b: &Value, sort_fields: &[SortField]) -> Ordering {
    for sort_field in sort_fields {
        let va = resolve_field(a, &sort_field.field);
        let vb = resolve_field(b, &sort_field.field);
        let ordering = compare_keyed(&va, &vb, sort_field.order);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// `(null_bucket, value)` comparison: nulls after non-nulls in either
/// direction, direction applied to the value comparison only.
fn compare_keyed(a: &Value, b: &Value, order: SortOrder) -> Ordering {
    match (is_null_like(a), is_null_like(b)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ordering = compare_values(a, b);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        }
    }
}

fn compare_record_to_key(record: &Value, key: &Map<String, Value>, sort_fields: &[SortField]) -> Ordering {
    for sort_field in sort_fields {
        let record_value = resolve_field(record, &sort_field.field);
        let cursor_value = key.get(&sort_field.field).cloned().unwrap_or(Value::Null);
        let ordering = compare_keyed(&record_value, &cursor_value, sort_field.order);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Cursor = URL-safe base64 of the JSON sort-key tuple.
fn encode_cursor(record: &Value, sort_fields: &[SortField]) -> String {
    let mut key = Map::new();
    for sort_field in sort_fields {
        key.insert(sort_field.field.clone(), resolve_field(record, &sort_field.field));
    }
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&Value::Object(key)).unwrap_or_default())
}

fn decode_cursor(cursor: &str) -> Result<Map<String, Value>, QueryError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|err| QueryError::BadCursor(err.to_string()))?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|err| QueryError::BadCursor(err.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(QueryError::BadCursor("cursor is not a key map".to_string())),
    }
}

fn sift_up(heap: &mut [Value], mut index: usize, sort_fields: &[SortField]) {
    while index > 0 {
        let parent = (index - 1) / 2;
        // Max-heap under the comparator: parent is the worst record.
        if compare_records(&heap[index], &heap[parent], sort_fields) == Ordering::Greater {
            heap.swap(index, parent);
            index = parent;
        } else {
            break;
        }
    }
}

fn sift_down(heap: &mut [Value], mut index: usize, sort_fields: &[SortField]) {
    loop {
        let left = 2 * index + 1;
        let right = left + 1;
        let mut largest = index;
        if left < heap.len()
            && compare_records(&heap[left], &heap[largest], sort_fields) == Ordering::Greater
        {
            largest = left;
        }
        if right < heap.len()
            && compare_records(&heap[right], &heap[largest], sort_fields) == Ordering::Greater
        {
            largest = right;
        }
        if largest == index {
            break;
        }
        heap.swap(index, largest);
        index = largest;
    }
}
