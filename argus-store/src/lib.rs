//! # ArgusDB Record Store
//!
//! File-backed record store for the query engine. Each database is a single
//! UTF-8 JSON file in the store directory; the file stem is the database name.
//! Records are loaded lazily, normalized (synthetic ids, `_database` stamp)
//! and cached in memory until the file's mtime advances.
//!
//! The store is read-only from the engine's point of view: the JSON files are
//! owned by external processes and this crate never writes them.

use std::path::PathBuf;

mod loader;
mod names;

pub use loader::{DatabaseStats, RecordStore};
pub use names::{canonical_file_name, slugify};

/// A single record: one JSON object within a database.
pub type Record = serde_json::Value;

/// Errors surfaced by the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No file in the store directory resolves to the requested name.
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// The file exists but is not valid JSON, or its top-level structure is
    /// neither a list nor an object wrapping one.
    #[error("bad database shape in {name}: {reason}")]
    BadDatabaseShape { name: String, reason: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the record store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory containing the per-database JSON files.
    pub data_dir: PathBuf,

    /// Files at or above this size are parsed through a buffered reader on a
    /// blocking thread instead of being read whole.
    pub large_file_bytes: u64,

    /// Maximum databases loaded concurrently by `load_many`.
    pub max_concurrent_loads: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/json"),
            large_file_bytes: 10 * 1024 * 1024,
            max_concurrent_loads: 4,
        }
    }
}
