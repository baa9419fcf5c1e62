//! # ArgusDB Multi-Tier Cache
//!
//! Three cache tiers behind one manager:
//!
//! - **L1 (memory)**: byte-bounded in-process cache with LRU or LFU eviction
//!   and lazy TTL expiry, guarded by a single lock.
//! - **L2 (remote, optional)**: Redis key/value store; values travel as JSON
//!   bytes and every call is wrapped in a timeout, so a slow or dead remote
//!   is just a miss.
//! - **L3 (disk, optional)**: per-key files under a sharded directory with a
//!   JSON index; writes are temp-file + rename.
//!
//! Reads probe L1 → L2 → L3 and promote hits toward the faster tiers before
//! the value is returned (the write-backs themselves may complete after).
//! I/O failures at any tier are recovered locally: a failed read is a miss,
//! a failed write is dropped.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;

mod disk;
mod memory;
mod remote;
mod stats;
mod tiered;

pub use disk::DiskCache;
pub use memory::{CacheEntry, EvictionPolicy, MemoryCache, MemoryStats};
pub use remote::RemoteCache;
pub use stats::{CacheStatistics, LatencyPercentiles, TierSnapshot};
pub use tiered::TieredCache;

/// Which tier satisfied a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CacheTier {
    L1,
    L2,
    L3,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::L3 => "l3",
        }
    }
}

/// A cached query result plus the metadata needed for expiry and
/// invalidation. This is the unit that crosses tier boundaries; L2 and L3
/// store its JSON serialization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CachedResult {
    pub query_hash: String,
    pub result: Value,
    /// Unix timestamp (seconds) of creation.
    pub created_at: i64,
    pub ttl_seconds: u64,
    pub hit_count: u64,
    pub tags: Vec<String>,
}

impl CachedResult {
    pub fn new(query_hash: String, result: Value, ttl_seconds: u64, tags: Vec<String>) -> Self {
        Self {
            query_hash,
            result,
            created_at: Utc::now().timestamp(),
            ttl_seconds,
            hit_count: 0,
            tags,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.age_seconds() > self.ttl_seconds as i64
    }

    pub fn age_seconds(&self) -> i64 {
        Utc::now().timestamp() - self.created_at
    }

    /// Seconds of TTL left, for propagating expiry to remote tiers.
    pub fn remaining_ttl(&self) -> u64 {
        (self.ttl_seconds as i64 - self.age_seconds()).max(0) as u64
    }
}

/// Cache-internal failures. These never propagate past the tier manager: the
/// read path converts them to misses and the write path drops the write.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("remote cache error: {0}")]
    Remote(#[from] redis::RedisError),

    #[error("remote cache timed out")]
    RemoteTimeout,
}

/// Configuration for the tier stack.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// L1 capacity in megabytes.
    pub memory_limit_mb: usize,
    pub policy: EvictionPolicy,
    /// TTL applied when the caller does not supply one.
    pub default_ttl_secs: u64,
    /// Redis endpoint, e.g. `redis://127.0.0.1:6379`. `None` disables L2.
    pub l2_endpoint: Option<String>,
    /// Root directory for the disk tier. `None` disables L3.
    pub l3_dir: Option<PathBuf>,
    /// Budget for each remote-cache call before it is treated as a miss.
    pub remote_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: 256,
            policy: EvictionPolicy::Lru,
            default_ttl_secs: 3600,
            l2_endpoint: None,
            l3_dir: None,
            remote_timeout_ms: 250,
        }
    }
}

/// Approximate in-memory footprint of a cached value: the length of its JSON
/// serialization. Cheap, deterministic, and monotone in the actual size.
pub(crate) fn estimate_size(value: &CachedResult) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}
