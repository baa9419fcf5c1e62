//! L1 in-process cache.
//!
//! Byte-bounded: the sum of entry sizes never exceeds the configured
//! capacity, enforced at insert time. Eviction order comes from a side index
//! keyed by `(rank, seq)`, where rank is the insertion sequence for LRU and
//! the access count for LFU, so the BTreeMap's first entry is always the
//! next victim. Expired entries are evicted lazily on access.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{estimate_size, CachedResult};

/// L1 eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    Lru,
    Lfu,
}

/// One L1 entry with its bookkeeping metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: CachedResult,
    pub size_bytes: usize,
    pub created_at: Instant,
    pub accessed_at: Instant,
    pub access_count: u64,
    order_key: (u64, u64),
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_evictions: u64,
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// Eviction index: first key is the next victim.
    order: BTreeMap<(u64, u64), String>,
    current_bytes: usize,
    seq: u64,
    stats: MemoryStats,
}

/// Byte-bounded memory cache with a single lock around map + eviction
/// bookkeeping. Critical sections only touch the two maps.
#[derive(Debug)]
pub struct MemoryCache {
    capacity_bytes: usize,
    policy: EvictionPolicy,
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new(capacity_mb: usize, policy: EvictionPolicy) -> Self {
        Self {
            capacity_bytes: capacity_mb * 1024 * 1024,
            policy,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                current_bytes: 0,
                seq: 0,
                stats: MemoryStats::default(),
            }),
        }
    }

    /// Construct with an exact byte capacity (used by tests and callers that
    /// size in bytes).
    pub fn with_capacity_bytes(capacity_bytes: usize, policy: EvictionPolicy) -> Self {
        Self {
            capacity_bytes,
            policy,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                current_bytes: 0,
                seq: 0,
                stats: MemoryStats::default(),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<CachedResult> {
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.value.is_expired(),
        };

        if expired {
            Self::remove_entry(&mut inner, key);
            inner.stats.expired_evictions += 1;
            inner.stats.misses += 1;
            return None;
        }

        inner.seq += 1;
        let seq = inner.seq;
        let policy = self.policy;
        let entry = inner.entries.get_mut(key)?;
        entry.accessed_at = Instant::now();
        entry.access_count += 1;
        entry.value.hit_count += 1;
        let old_key = entry.order_key;
        let new_rank = match policy {
            EvictionPolicy::Lru => seq,
            EvictionPolicy::Lfu => entry.access_count,
        };
        entry.order_key = (new_rank, seq);
        let value = entry.value.clone();
        let key_owned = entry.key.clone();
        inner.order.remove(&old_key);
        inner.order.insert((new_rank, seq), key_owned);
        inner.stats.hits += 1;
        Some(value)
    }

    pub fn set(&self, key: &str, value: CachedResult) {
        let size = estimate_size(&value);
        if size > self.capacity_bytes {
            warn!(key, size, "value larger than L1 capacity, not caching");
            return;
        }

        let mut inner = self.inner.lock();
        Self::remove_entry(&mut inner, key);

        while inner.current_bytes + size > self.capacity_bytes {
            let victim = match inner.order.iter().next() {
                Some((_, victim)) => victim.clone(),
                None => break,
            };
            debug!(key = %victim, "evicting L1 entry for capacity");
            Self::remove_entry(&mut inner, &victim);
            inner.stats.evictions += 1;
        }

        inner.seq += 1;
        let seq = inner.seq;
        let rank = match self.policy {
            EvictionPolicy::Lru => seq,
            EvictionPolicy::Lfu => 1,
        };
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            size_bytes: size,
            created_at: Instant::now(),
            accessed_at: Instant::now(),
            access_count: 1,
            order_key: (rank, seq),
        };
        inner.order.insert((rank, seq), key.to_string());
        inner.current_bytes += size;
        inner.entries.insert(key.to_string(), entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        Self::remove_entry(&mut inner, key)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.current_bytes = 0;
    }

    /// Remove every key containing `pattern`. Returns the number removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut inner = self.inner.lock();
        let victims: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.contains(pattern))
            .cloned()
            .collect();
        for key in &victims {
            Self::remove_entry(&mut inner, key);
        }
        victims.len()
    }

    /// Remove every entry whose tag set intersects `tags`.
    pub fn invalidate_tags(&self, tags: &[String]) -> usize {
        let mut inner = self.inner.lock();
        let victims: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.value.tags.iter().any(|t| tags.contains(t)))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &victims {
            Self::remove_entry(&mut inner, key);
        }
        victims.len()
    }

    /// Sweep entries whose TTL has elapsed. Called by the maintenance task.
    pub fn evict_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let victims: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.value.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &victims {
            Self::remove_entry(&mut inner, key);
            inner.stats.expired_evictions += 1;
        }
        victims.len()
    }

    pub fn stats(&self) -> MemoryStats {
        self.inner.lock().stats.clone()
    }

    pub fn current_bytes(&self) -> usize {
        self.inner.lock().current_bytes
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    fn remove_entry(inner: &mut Inner, key: &str) -> bool {
        if let Some(entry) = inner.entries.remove(key) {
            inner.order.remove(&entry.order_key);
            inner.current_bytes -= entry.size_bytes;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cached(key: &str, payload: &str, ttl: u64) -> CachedResult {
        CachedResult::new(key.to_string(), json!({ "payload": payload }), ttl, vec![])
    }

    #[test]
    fn get_set_round_trip() {
        let cache = MemoryCache::new(1, EvictionPolicy::Lru);
        cache.set("k1", cached("k1", "hello", 60));
        let got = cache.get("k1").unwrap();
        assert_eq!(got.result["payload"], json!("hello"));
        assert!(cache.get("absent").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let cache = MemoryCache::with_capacity_bytes(600, EvictionPolicy::Lru);
        for i in 0..20 {
            cache.set(&format!("k{i}"), cached(&format!("k{i}"), "xxxxxxxxxx", 60));
            assert!(cache.current_bytes() <= 600);
        }
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let one = estimate_size(&cached("a", "1234567890", 60));
        let cache = MemoryCache::with_capacity_bytes(one * 2, EvictionPolicy::Lru);
        cache.set("a", cached("a", "1234567890", 60));
        cache.set("b", cached("b", "1234567890", 60));
        cache.get("a");
        cache.set("c", cached("c", "1234567890", 60));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn lfu_evicts_least_frequently_used() {
        let one = estimate_size(&cached("a", "1234567890", 60));
        let cache = MemoryCache::with_capacity_bytes(one * 2, EvictionPolicy::Lfu);
        cache.set("a", cached("a", "1234567890", 60));
        cache.set("b", cached("b", "1234567890", 60));
        cache.get("a");
        cache.get("a");
        cache.get("b");
        cache.set("c", cached("c", "1234567890", 60));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn oversized_value_is_skipped() {
        let cache = MemoryCache::with_capacity_bytes(10, EvictionPolicy::Lru);
        cache.set("big", cached("big", "way too large for ten bytes", 60));
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_are_lazily_evicted() {
        let cache = MemoryCache::new(1, EvictionPolicy::Lru);
        let mut value = cached("k", "old", 10);
        value.created_at -= 3600;
        cache.set("k", value);
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().expired_evictions, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn pattern_invalidation() {
        let cache = MemoryCache::new(1, EvictionPolicy::Lru);
        cache.set("query:people:1", cached("a", "x", 60));
        cache.set("query:tasks:1", cached("b", "x", 60));
        let removed = cache.invalidate_pattern("people");
        assert_eq!(removed, 1);
        assert!(!cache.contains("query:people:1"));
        assert!(cache.contains("query:tasks:1"));
    }

    #[test]
    fn tag_invalidation() {
        let cache = MemoryCache::new(1, EvictionPolicy::Lru);
        let mut tagged = cached("a", "x", 60);
        tagged.tags = vec!["people".to_string()];
        cache.set("a", tagged);
        cache.set("b", cached("b", "x", 60));
        let removed = cache.invalidate_tags(&["people".to_string()]);
        assert_eq!(removed, 1);
        assert!(cache.contains("b"));
    }

    #[test]
    fn overwrite_replaces_size_accounting() {
        let cache = MemoryCache::new(1, EvictionPolicy::Lru);
        cache.set("k", cached("k", "short", 60));
        let first = cache.current_bytes();
        cache.set("k", cached("k", "a much longer payload than before", 60));
        assert!(cache.current_bytes() > first);
        assert_eq!(cache.len(), 1);
    }
}
