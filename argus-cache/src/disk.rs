//! L3 on-disk cache.
//!
//! Values live at `<root>/<shard>/<hash>.cache` where `hash` is the SHA-256
//! hex of the cache key and `shard` its first two characters. A single
//! `index.json` at the root tracks creation time, TTL, size and tags per key.
//! Value files and the index are written atomically (temp file + rename);
//! the index is guarded by a per-process lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{CacheError, CachedResult};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct IndexEntry {
    hash: String,
    created_at: i64,
    ttl: u64,
    size: u64,
    tags: Vec<String>,
}

#[derive(Debug)]
pub struct DiskCache {
    root: PathBuf,
    index: Mutex<HashMap<String, IndexEntry>>,
}

pub(crate) fn key_hash(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl DiskCache {
    /// Open (or create) a disk cache rooted at `root`, loading the index if
    /// one exists. A corrupt index is discarded and rebuilt over time.
    pub async fn open(root: &Path) -> Result<Self, CacheError> {
        tokio::fs::create_dir_all(root).await?;
        let index_path = root.join("index.json");
        let index = match tokio::fs::read(&index_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!(error = %err, "disk cache index corrupt, starting empty");
                HashMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        info!(root = %root.display(), entries = index.len(), "opened disk cache");
        Ok(Self {
            root: root.to_path_buf(),
            index: Mutex::new(index),
        })
    }

    fn value_path(&self, hash: &str) -> PathBuf {
        self.root.join(&hash[..2]).join(format!("{hash}.cache"))
    }

    pub async fn get(&self, key: &str) -> Result<Option<CachedResult>, CacheError> {
        let entry = match self.index.lock().get(key) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };

        if Utc::now().timestamp() - entry.created_at > entry.ttl as i64 {
            debug!(key, "disk cache entry expired");
            self.delete(key).await?;
            return Ok(None);
        }

        let path = self.value_path(&entry.hash);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                // Index said yes but the file is gone; heal the index.
                self.index.lock().remove(key);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let cached: CachedResult = serde_json::from_slice(&bytes)?;
        Ok(Some(cached))
    }

    pub async fn set(&self, key: &str, value: &CachedResult) -> Result<(), CacheError> {
        let hash = key_hash(key);
        let path = self.value_path(&hash);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec(value)?;
        write_atomic(&path, &bytes).await?;

        {
            let mut index = self.index.lock();
            index.insert(
                key.to_string(),
                IndexEntry {
                    hash,
                    created_at: value.created_at,
                    ttl: value.ttl_seconds,
                    size: bytes.len() as u64,
                    tags: value.tags.clone(),
                },
            );
        }
        self.flush_index().await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let entry = self.index.lock().remove(key);
        match entry {
            Some(entry) => {
                let path = self.value_path(&entry.hash);
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
                self.flush_index().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete entries whose key contains `pattern` or whose tags intersect
    /// `tags`. Either selector may be empty.
    pub async fn invalidate(&self, pattern: Option<&str>, tags: &[String]) -> Result<usize, CacheError> {
        let victims: Vec<String> = {
            let index = self.index.lock();
            index
                .iter()
                .filter(|(key, entry)| {
                    pattern.map(|p| key.contains(p)).unwrap_or(false)
                        || entry.tags.iter().any(|t| tags.contains(t))
                })
                .map(|(key, _)| key.clone())
                .collect()
        };
        for key in &victims {
            self.delete(key).await?;
        }
        Ok(victims.len())
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        let keys: Vec<String> = self.index.lock().keys().cloned().collect();
        for key in keys {
            self.delete(&key).await?;
        }
        Ok(())
    }

    /// Drop entries past their TTL. Returns the number removed.
    pub async fn evict_expired(&self) -> Result<usize, CacheError> {
        let now = Utc::now().timestamp();
        let victims: Vec<String> = {
            let index = self.index.lock();
            index
                .iter()
                .filter(|(_, e)| now - e.created_at > e.ttl as i64)
                .map(|(k, _)| k.clone())
                .collect()
        };
        for key in &victims {
            self.delete(key).await?;
        }
        Ok(victims.len())
    }

    /// Persist the index. Also the shutdown flush.
    pub async fn flush_index(&self) -> Result<(), CacheError> {
        let bytes = {
            let index = self.index.lock();
            serde_json::to_vec(&*index)?
        };
        write_atomic(&self.root.join("index.json"), &bytes).await
    }

    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cached(key: &str, ttl: u64) -> CachedResult {
        CachedResult::new(key.to_string(), json!({"k": key}), ttl, vec!["tag-a".to_string()])
    }

    #[tokio::test]
    async fn round_trip_and_shard_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();
        cache.set("query-1", &cached("query-1", 60)).await.unwrap();

        let got = cache.get("query-1").await.unwrap().unwrap();
        assert_eq!(got.result["k"], json!("query-1"));

        let hash = key_hash("query-1");
        let expected = dir.path().join(&hash[..2]).join(format!("{hash}.cache"));
        assert!(expected.exists());
        assert!(dir.path().join("index.json").exists());
    }

    #[tokio::test]
    async fn expired_entries_are_removed_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();
        let mut value = cached("old", 10);
        value.created_at -= 3600;
        cache.set("old", &value).await.unwrap();

        assert!(cache.get("old").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = DiskCache::open(dir.path()).await.unwrap();
            cache.set("persist", &cached("persist", 300)).await.unwrap();
        }
        let reopened = DiskCache::open(dir.path()).await.unwrap();
        let got = reopened.get("persist").await.unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn invalidate_by_pattern_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();
        cache.set("people:1", &cached("people:1", 60)).await.unwrap();
        let mut untagged = cached("tasks:1", 60);
        untagged.tags.clear();
        cache.set("tasks:1", &untagged).await.unwrap();

        let removed = cache.invalidate(Some("people"), &[]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("people:1").await.unwrap().is_none());

        let removed = cache.invalidate(None, &["tag-a".to_string()]).await.unwrap();
        assert_eq!(removed, 0);
        assert!(cache.get("tasks:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_value_file_heals_index() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(dir.path()).await.unwrap();
        cache.set("ghost", &cached("ghost", 60)).await.unwrap();

        let hash = key_hash("ghost");
        std::fs::remove_file(dir.path().join(&hash[..2]).join(format!("{hash}.cache"))).unwrap();

        assert!(cache.get("ghost").await.unwrap().is_none());
        assert!(cache.is_empty());
    }
}
