//! Tier manager: probe order, promotion, write-through, invalidation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    CacheConfig, CacheStatistics, CacheTier, CachedResult, DiskCache, MemoryCache, RemoteCache,
};

/// Multi-tier cache facade. Reads probe L1 → L2 → L3; a hit at a slower tier
/// schedules write-backs to the faster ones before the value is returned.
/// All tier I/O failures are absorbed here: reads degrade to misses, writes
/// are dropped with a warning.
#[derive(Debug)]
pub struct TieredCache {
    memory: MemoryCache,
    remote: Option<RemoteCache>,
    disk: Option<Arc<DiskCache>>,
    stats: Arc<CacheStatistics>,
    default_ttl: u64,
}

impl TieredCache {
    /// Build the tier stack. L2/L3 are enabled by configuration; a remote
    /// endpoint that cannot be reached disables L2 rather than failing.
    pub async fn new(config: &CacheConfig) -> Self {
        let remote = match &config.l2_endpoint {
            Some(endpoint) => {
                RemoteCache::connect(endpoint, Duration::from_millis(config.remote_timeout_ms)).await
            }
            None => None,
        };
        let disk = match &config.l3_dir {
            Some(dir) => match DiskCache::open(dir).await {
                Ok(disk) => Some(Arc::new(disk)),
                Err(err) => {
                    warn!(error = %err, "disk cache unavailable, running without L3");
                    None
                }
            },
            None => None,
        };
        Self {
            memory: MemoryCache::new(config.memory_limit_mb, config.policy),
            remote,
            disk,
            stats: Arc::new(CacheStatistics::new()),
            default_ttl: config.default_ttl_secs,
        }
    }

    /// Look a key up across the tiers. On a hit the satisfying tier is
    /// reported and the value is promoted to all faster tiers; the remote
    /// write-back is spawned and may complete after this call returns.
    pub async fn get(&self, key: &str) -> Option<(CachedResult, CacheTier)> {
        let start = Instant::now();
        if let Some(value) = self.memory.get(key) {
            self.stats.record_hit(CacheTier::L1);
            self.stats
                .record_latency(CacheTier::L1, start.elapsed().as_secs_f64() * 1000.0);
            return Some((value, CacheTier::L1));
        }
        self.stats.record_miss(CacheTier::L1);

        if let Some(remote) = &self.remote {
            let start = Instant::now();
            match remote.get(key).await {
                Ok(Some(value)) => {
                    self.stats.record_hit(CacheTier::L2);
                    self.stats
                        .record_latency(CacheTier::L2, start.elapsed().as_secs_f64() * 1000.0);
                    self.memory.set(key, value.clone());
                    return Some((value, CacheTier::L2));
                }
                Ok(None) => self.stats.record_miss(CacheTier::L2),
                Err(err) => {
                    debug!(key, error = %err, "remote cache read failed, treating as miss");
                    self.stats.record_error(CacheTier::L2);
                    self.stats.record_miss(CacheTier::L2);
                }
            }
        }

        if let Some(disk) = &self.disk {
            let start = Instant::now();
            match disk.get(key).await {
                Ok(Some(value)) => {
                    self.stats.record_hit(CacheTier::L3);
                    self.stats
                        .record_latency(CacheTier::L3, start.elapsed().as_secs_f64() * 1000.0);
                    // Promote: L1 synchronously, L2 in the background.
                    self.memory.set(key, value.clone());
                    if let Some(remote) = self.remote.clone() {
                        let key = key.to_string();
                        let value_clone = value.clone();
                        tokio::spawn(async move {
                            if let Err(err) = remote.set(&key, &value_clone).await {
                                debug!(key, error = %err, "L2 promotion dropped");
                            }
                        });
                    }
                    return Some((value, CacheTier::L3));
                }
                Ok(None) => self.stats.record_miss(CacheTier::L3),
                Err(err) => {
                    warn!(key, error = %err, "disk cache read failed, treating as miss");
                    self.stats.record_error(CacheTier::L3);
                    self.stats.record_miss(CacheTier::L3);
                }
            }
        }

        None
    }

    /// Store a result at every enabled tier. L1 is written synchronously;
    /// L2/L3 writes complete before this call returns so a subsequent read of
    /// the same key at those tiers observes the value.
    pub async fn set(&self, key: &str, result: Value, ttl: Option<u64>, tags: Vec<String>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let cached = CachedResult::new(key.to_string(), result, ttl, tags);

        self.memory.set(key, cached.clone());

        if let Some(remote) = &self.remote {
            if let Err(err) = remote.set(key, &cached).await {
                debug!(key, error = %err, "remote cache write dropped");
                self.stats.record_error(CacheTier::L2);
            }
        }
        if let Some(disk) = &self.disk {
            if let Err(err) = disk.set(key, &cached).await {
                warn!(key, error = %err, "disk cache write dropped");
                self.stats.record_error(CacheTier::L3);
            }
        }
    }

    /// Remove entries by key-substring pattern and/or tag intersection.
    pub async fn invalidate(&self, pattern: Option<&str>, tags: &[String]) {
        if let Some(pattern) = pattern {
            self.memory.invalidate_pattern(pattern);
        }
        if !tags.is_empty() {
            self.memory.invalidate_tags(tags);
        }
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.invalidate(pattern).await {
                debug!(error = %err, "remote cache invalidation dropped");
            }
        }
        if let Some(disk) = &self.disk {
            if let Err(err) = disk.invalidate(pattern, tags).await {
                warn!(error = %err, "disk cache invalidation dropped");
            }
        }
    }

    /// Drop everything at every enabled tier.
    pub async fn clear(&self) {
        self.memory.clear();
        if let Some(remote) = &self.remote {
            if let Err(err) = remote.clear().await {
                debug!(error = %err, "remote cache clear dropped");
            }
        }
        if let Some(disk) = &self.disk {
            if let Err(err) = disk.clear().await {
                warn!(error = %err, "disk cache clear dropped");
            }
        }
    }

    /// Remove only the L1 copy of a key. Exists for tier-failover paths and
    /// tests that need to observe deeper tiers.
    pub fn drop_from_memory(&self, key: &str) {
        self.memory.delete(key);
    }

    pub fn l1_contains(&self, key: &str) -> bool {
        self.memory.contains(key)
    }

    /// Sweep expired entries in L1 and L3 (L2 expires server-side via TTL).
    pub async fn evict_expired(&self) {
        let removed = self.memory.evict_expired();
        if removed > 0 {
            debug!(removed, "L1 expired entries evicted");
        }
        if let Some(disk) = &self.disk {
            match disk.evict_expired().await {
                Ok(removed) if removed > 0 => debug!(removed, "L3 expired entries evicted"),
                Ok(_) => {}
                Err(err) => warn!(error = %err, "L3 expiry sweep failed"),
            }
        }
    }

    /// Current per-tier statistics, with L1 counters folded in.
    pub fn statistics(&self) -> Arc<CacheStatistics> {
        self.stats.absorb_memory_stats(&self.memory.stats());
        Arc::clone(&self.stats)
    }

    /// Flush persistent state. Part of graceful shutdown.
    pub async fn shutdown(&self) {
        if let Some(disk) = &self.disk {
            if let Err(err) = disk.flush_index().await {
                warn!(error = %err, "failed to flush disk cache index");
            }
        }
    }
}
