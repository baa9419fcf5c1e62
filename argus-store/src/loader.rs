//! JSON database loading with per-file in-memory caching.
//!
//! A loaded database stays cached until the backing file's mtime advances.
//! Refreshes for a given database are serialized by the cache map's entry
//! locking; reads share the cached `Arc` without copying records.

use std::collections::HashMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::names::{canonical_file_name, display_name_for_stem};
use crate::{Record, StoreConfig, StoreError};

/// Wrapper keys accepted around a record array, in precedence order.
const WRAPPER_KEYS: &[&str] = &["items", "results", "data"];

#[derive(Debug, Clone)]
struct CachedFile {
    modified: SystemTime,
    records: Arc<Vec<Record>>,
}

/// Statistics about one database file.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: SystemTime,
    /// Record count when the database is currently cached.
    pub cached_records: Option<usize>,
}

/// File-backed record store with mtime-gated caching.
///
/// `load_database` returns the cached record list as long as the file has not
/// changed on disk; otherwise the file is re-read and the cache entry
/// replaced. Multiple databases can be loaded concurrently with `load_many`;
/// a failure on one database does not fail the others.
#[derive(Debug)]
pub struct RecordStore {
    config: StoreConfig,
    cache: DashMap<String, CachedFile>,
}

impl RecordStore {
    pub fn new(config: StoreConfig) -> Self {
        info!(data_dir = %config.data_dir.display(), "initializing record store");
        Self {
            config,
            cache: DashMap::new(),
        }
    }

    /// Load a database by name, reusing the cached copy when the file is
    /// unchanged.
    pub async fn load_database(&self, database: &str) -> Result<Arc<Vec<Record>>, StoreError> {
        let path = self
            .resolve_file(database)
            .await?
            .ok_or_else(|| StoreError::DatabaseNotFound(database.to_string()))?;

        let modified = tokio::fs::metadata(&path).await?.modified()?;

        if let Some(entry) = self.cache.get(database) {
            if entry.modified == modified {
                debug!(database, "record store cache hit");
                return Ok(Arc::clone(&entry.records));
            }
        }

        let records = Arc::new(self.read_file(&path, database).await?);
        info!(database, records = records.len(), "loaded database from disk");
        self.cache.insert(
            database.to_string(),
            CachedFile {
                modified,
                records: Arc::clone(&records),
            },
        );
        Ok(records)
    }

    /// Load several databases concurrently. Databases that fail to load are
    /// logged and returned as empty lists so one bad file cannot sink a
    /// multi-database query.
    pub async fn load_many(&self, databases: &[String]) -> HashMap<String, Arc<Vec<Record>>> {
        let loads = stream::iter(databases.iter().cloned())
            .map(|name| async move {
                let result = self.load_database(&name).await;
                (name, result)
            })
            .buffer_unordered(self.config.max_concurrent_loads.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut out = HashMap::new();
        for (name, result) in loads {
            match result {
                Ok(records) => {
                    out.insert(name, records);
                }
                Err(err) => {
                    warn!(database = %name, error = %err, "failed to load database");
                    out.insert(name, Arc::new(Vec::new()));
                }
            }
        }
        out
    }

    /// Names of all databases present in the store directory, canonical
    /// display names where recognized, sorted.
    pub async fn available_databases(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.config.data_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                match display_name_for_stem(stem) {
                    Some(display) => names.push(display.to_string()),
                    None => names.push(stem.to_string()),
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Drop the cached copy of one database, or of everything.
    pub fn refresh(&self, database: Option<&str>) {
        match database {
            Some(name) => {
                self.cache.remove(name);
                info!(database = name, "cleared cached database");
            }
            None => {
                self.cache.clear();
                info!("cleared all cached databases");
            }
        }
    }

    /// Warm the cache for the given databases, or for everything on disk.
    pub async fn preload(&self, databases: Option<&[String]>) -> Result<(), StoreError> {
        let names = match databases {
            Some(names) => names.to_vec(),
            None => self.available_databases().await?,
        };
        info!(count = names.len(), "preloading databases");
        self.load_many(&names).await;
        Ok(())
    }

    /// File-level statistics for one database.
    pub async fn database_stats(&self, database: &str) -> Result<DatabaseStats, StoreError> {
        let path = self
            .resolve_file(database)
            .await?
            .ok_or_else(|| StoreError::DatabaseNotFound(database.to_string()))?;
        let meta = tokio::fs::metadata(&path).await?;
        Ok(DatabaseStats {
            size_bytes: meta.len(),
            modified: meta.modified()?,
            cached_records: self.cache.get(database).map(|e| e.records.len()),
            path,
        })
    }

    /// Resolve a database name to its file: canonical mapping first, then a
    /// case-insensitive stem scan of the store directory.
    async fn resolve_file(&self, database: &str) -> Result<Option<PathBuf>, StoreError> {
        let direct = self.config.data_dir.join(canonical_file_name(database));
        if tokio::fs::try_exists(&direct).await? {
            return Ok(Some(direct));
        }

        let wanted = database.to_lowercase();
        let mut dir = match tokio::fs::read_dir(&self.config.data_dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem.to_lowercase() == wanted {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }

    async fn read_file(&self, path: &Path, database: &str) -> Result<Vec<Record>, StoreError> {
        let size = tokio::fs::metadata(path).await?.len();

        let value: Value = if size >= self.config.large_file_bytes {
            // Large files are parsed incrementally on a blocking thread so
            // the whole text never sits in memory next to the parsed tree.
            debug!(database, size, "reading large database through buffered reader");
            let path = path.to_path_buf();
            let name = database.to_string();
            let parsed = tokio::task::spawn_blocking(move || -> Result<Value, StoreError> {
                let file = std::fs::File::open(&path)?;
                serde_json::from_reader(BufReader::new(file)).map_err(|err| {
                    StoreError::BadDatabaseShape {
                        name,
                        reason: err.to_string(),
                    }
                })
            })
            .await
            .map_err(|err| StoreError::Io(std::io::Error::other(err)))?;
            parsed?
        } else {
            let bytes = tokio::fs::read(path).await?;
            serde_json::from_slice(&bytes).map_err(|err| StoreError::BadDatabaseShape {
                name: database.to_string(),
                reason: err.to_string(),
            })?
        };

        let rows = unwrap_records(value, database)?;
        Ok(normalize_records(rows, database))
    }
}

/// Accept a top-level array, or an object carrying the array under one of the
/// recognized wrapper keys (`items` wins over `results` wins over `data`).
fn unwrap_records(value: Value, database: &str) -> Result<Vec<Value>, StoreError> {
    match value {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => {
            for key in WRAPPER_KEYS {
                if let Some(Value::Array(rows)) = map.remove(*key) {
                    return Ok(rows);
                }
            }
            Err(StoreError::BadDatabaseShape {
                name: database.to_string(),
                reason: "expected an array or an object with items/results/data".to_string(),
            })
        }
        other => Err(StoreError::BadDatabaseShape {
            name: database.to_string(),
            reason: format!("expected array or object, found {}", value_kind(&other)),
        }),
    }
}

/// Stamp `_database` and assign `{database}_{index}` ids to records lacking
/// one. Assignment is deterministic in load order.
fn normalize_records(rows: Vec<Value>, database: &str) -> Vec<Record> {
    rows.into_iter()
        .enumerate()
        .map(|(index, mut row)| {
            if let Value::Object(map) = &mut row {
                if !map.contains_key("id") {
                    map.insert("id".to_string(), Value::String(format!("{database}_{index}")));
                }
                map.insert("_database".to_string(), Value::String(database.to_string()));
            }
            row
        })
        .collect()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
