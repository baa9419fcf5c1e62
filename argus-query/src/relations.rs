//! Relationship resolution: inline related records across databases.
//!
//! For each include, a record's relation field (a list of ids) is replaced
//! with the related records fetched from the target database, recursively up
//! to the requested depth. A visited set of `(database, id)` pairs breaks
//! cycles: a revisited record is attached as its bare id instead of an
//! embedded object. Ids that resolve to nothing are skipped silently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use argus_store::RecordStore;

use crate::model::RelationshipInclude;
use crate::value::{display_string, resolve_field};

/// Static relation-field → database inference used when an include names no
/// target database.
const FIELD_DATABASES: &[(&str, &str)] = &[
    ("people", "People & Contacts"),
    ("person", "People & Contacts"),
    ("contacts", "People & Contacts"),
    ("members", "People & Contacts"),
    ("owner", "People & Contacts"),
    ("organizations", "Organizations & Bodies"),
    ("organization", "Organizations & Bodies"),
    ("tasks", "Actionable Tasks"),
    ("task", "Actionable Tasks"),
    ("events", "Key Places & Events"),
    ("places", "Key Places & Events"),
    ("documents", "Documents & Evidence"),
    ("evidence", "Documents & Evidence"),
    ("transcripts", "Intelligence & Transcripts"),
    ("transgressions", "Identified Transgressions"),
];

pub fn infer_database(relation_field: &str) -> Option<&'static str> {
    let lower = relation_field.to_lowercase();
    FIELD_DATABASES
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, database)| *database)
}

#[derive(Debug, Default)]
pub struct RelationshipResolver;

impl RelationshipResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve all includes over `records` in place. Returns the number of
    /// related records embedded.
    pub async fn resolve(
        &self,
        store: &Arc<RecordStore>,
        records: &mut [Value],
        includes: &[RelationshipInclude],
    ) -> usize {
        let mut embedded = 0;
        for include in includes {
            let Some(database) = include
                .target_database
                .clone()
                .or_else(|| infer_database(&include.relation_field).map(String::from))
            else {
                debug!(field = %include.relation_field, "no target database for include, skipping");
                continue;
            };

            for record in records.iter_mut() {
                let mut visited = HashSet::new();
                if let (Some(db), Some(id)) = (
                    record.get("_database").map(display_string),
                    record.get("id").map(display_string),
                ) {
                    visited.insert((db, id));
                }
                embedded += attach(
                    store,
                    record,
                    &include.relation_field,
                    &database,
                    include.max_depth.max(1),
                    &mut visited,
                )
                .await;
            }
        }
        embedded
    }
}

/// Replace `record[field]` with the fetched related records, recursing into
/// them while depth remains. Boxed because the recursion is async.
fn attach<'a>(
    store: &'a Arc<RecordStore>,
    record: &'a mut Value,
    field: &'a str,
    database: &'a str,
    depth: usize,
    visited: &'a mut HashSet<(String, String)>,
) -> BoxFuture<'a, usize> {
    async move {
        let ids = match resolve_field(record, field) {
            Value::Array(items) => items.iter().map(display_string).collect::<Vec<_>>(),
            Value::String(id) if !id.is_empty() => vec![id],
            _ => return 0,
        };
        if ids.is_empty() {
            return 0;
        }

        let related = match store.load_database(database).await {
            Ok(related) => related,
            Err(err) => {
                debug!(database, error = %err, "include target failed to load, skipping");
                return 0;
            }
        };
        let by_id: HashMap<String, &Value> = related
            .iter()
            .filter_map(|r| r.get("id").map(|id| (display_string(id), r)))
            .collect();

        let mut embedded = Vec::with_capacity(ids.len());
        let mut count = 0;
        for id in ids {
            let key = (database.to_string(), id.clone());
            if visited.contains(&key) {
                // Cycle: keep the reference, not the object.
                embedded.push(Value::String(id));
                continue;
            }
            let Some(found) = by_id.get(&id) else {
                continue;
            };
            visited.insert(key);
            let mut child = (*found).clone();
            if depth > 1 {
                count += attach(store, &mut child, field, database, depth - 1, visited).await;
            }
            embedded.push(child);
            count += 1;
        }

        if let Value::Object(map) = record {
            map.insert(field.to_string(), Value::Array(embedded));
        }
        count
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_store::StoreConfig;
    use serde_json::json;

    async fn store_with(files: &[(&str, Value)]) -> (tempfile::TempDir, Arc<RecordStore>) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), serde_json::to_vec(content).unwrap()).unwrap();
        }
        let store = Arc::new(RecordStore::new(StoreConfig {
            data_dir: dir.path().to_path_buf(),
            ..StoreConfig::default()
        }));
        (dir, store)
    }

    #[tokio::test]
    async fn embeds_related_records() {
        let (_dir, store) = store_with(&[(
            "people_contacts.json",
            json!([
                {"id": "p1", "name": "Alice"},
                {"id": "p2", "name": "Bob"}
            ]),
        )])
        .await;

        let mut records = vec![json!({
            "id": "t1", "_database": "Actionable Tasks", "people": ["p1", "p2", "missing"]
        })];
        let resolver = RelationshipResolver::new();
        let include = RelationshipInclude {
            relation_field: "people".to_string(),
            target_database: None,
            max_depth: 1,
        };
        let count = resolver.resolve(&store, &mut records, &[include]).await;

        assert_eq!(count, 2);
        let embedded = records[0]["people"].as_array().unwrap();
        assert_eq!(embedded.len(), 2);
        assert_eq!(embedded[0]["name"], json!("Alice"));
    }

    #[tokio::test]
    async fn cycles_attach_id_reference_only() {
        let (_dir, store) = store_with(&[(
            "people_contacts.json",
            json!([
                {"id": "p1", "name": "Alice", "people": ["p2"]},
                {"id": "p2", "name": "Bob", "people": ["p1"]}
            ]),
        )])
        .await;

        let mut records = vec![json!({
            "id": "root", "_database": "Actionable Tasks", "people": ["p1"]
        })];
        let resolver = RelationshipResolver::new();
        let include = RelationshipInclude {
            relation_field: "people".to_string(),
            target_database: Some("People & Contacts".to_string()),
            max_depth: 3,
        };
        resolver.resolve(&store, &mut records, &[include]).await;

        let alice = &records[0]["people"][0];
        assert_eq!(alice["name"], json!("Alice"));
        let bob = &alice["people"][0];
        assert_eq!(bob["name"], json!("Bob"));
        // Bob's back-reference to Alice stays an id.
        assert_eq!(bob["people"][0], json!("p1"));
    }

    #[tokio::test]
    async fn depth_bounds_recursion() {
        let (_dir, store) = store_with(&[(
            "people_contacts.json",
            json!([
                {"id": "p1", "people": ["p2"]},
                {"id": "p2", "people": ["p3"]},
                {"id": "p3", "people": []}
            ]),
        )])
        .await;

        let mut records = vec![json!({"id": "r", "_database": "x", "people": ["p1"]})];
        let resolver = RelationshipResolver::new();
        let include = RelationshipInclude {
            relation_field: "people".to_string(),
            target_database: Some("People & Contacts".to_string()),
            max_depth: 1,
        };
        resolver.resolve(&store, &mut records, &[include]).await;

        let p1 = &records[0]["people"][0];
        assert_eq!(p1["id"], json!("p1"));
        // Depth 1: p1's own relations stay raw ids.
        assert_eq!(p1["people"], json!(["p2"]));
    }

    #[tokio::test]
    async fn unknown_target_is_skipped() {
        let (_dir, store) = store_with(&[]).await;
        let mut records = vec![json!({"id": "r", "widgets": ["w1"]})];
        let resolver = RelationshipResolver::new();
        let include = RelationshipInclude {
            relation_field: "widgets".to_string(),
            target_database: None,
            max_depth: 1,
        };
        let count = resolver.resolve(&store, &mut records, &[include]).await;
        assert_eq!(count, 0);
        assert_eq!(records[0]["widgets"], json!(["w1"]));
    }
}
