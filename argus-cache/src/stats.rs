//! Per-tier cache statistics.
//!
//! Counters are monotonic; latencies go into a bounded ring per tier so
//! percentile queries stay cheap and memory stays fixed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::CacheTier;

const LATENCY_WINDOW: usize = 4096;

#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_evictions: AtomicU64,
    errors: AtomicU64,
}

/// Latency percentiles in milliseconds.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Point-in-time view of one tier.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TierSnapshot {
    pub tier: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_evictions: u64,
    pub errors: u64,
    pub hit_rate: f64,
    pub latency: LatencyPercentiles,
}

/// Shared statistics for the whole tier stack.
#[derive(Debug, Default)]
pub struct CacheStatistics {
    l1: TierCounters,
    l2: TierCounters,
    l3: TierCounters,
    latencies: [Mutex<VecDeque<f64>>; 3],
}

impl CacheStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, tier: CacheTier) -> &TierCounters {
        match tier {
            CacheTier::L1 => &self.l1,
            CacheTier::L2 => &self.l2,
            CacheTier::L3 => &self.l3,
        }
    }

    fn latency_ring(&self, tier: CacheTier) -> &Mutex<VecDeque<f64>> {
        &self.latencies[match tier {
            CacheTier::L1 => 0,
            CacheTier::L2 => 1,
            CacheTier::L3 => 2,
        }]
    }

    pub fn record_hit(&self, tier: CacheTier) {
        self.counters(tier).hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, tier: CacheTier) {
        self.counters(tier).misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, tier: CacheTier, expired: bool) {
        let counters = self.counters(tier);
        if expired {
            counters.expired_evictions.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_error(&self, tier: CacheTier) {
        self.counters(tier).errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, tier: CacheTier, millis: f64) {
        let mut ring = self.latency_ring(tier).lock();
        if ring.len() >= LATENCY_WINDOW {
            ring.pop_front();
        }
        ring.push_back(millis);
    }

    /// Bulk import of L1 counters maintained inside the memory cache.
    pub fn absorb_memory_stats(&self, stats: &crate::memory::MemoryStats) {
        self.l1.hits.store(stats.hits, Ordering::Relaxed);
        self.l1.misses.store(stats.misses, Ordering::Relaxed);
        self.l1.evictions.store(stats.evictions, Ordering::Relaxed);
        self.l1
            .expired_evictions
            .store(stats.expired_evictions, Ordering::Relaxed);
    }

    pub fn snapshot(&self, tier: CacheTier) -> TierSnapshot {
        let counters = self.counters(tier);
        let hits = counters.hits.load(Ordering::Relaxed);
        let misses = counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        TierSnapshot {
            tier: tier.as_str(),
            hits,
            misses,
            evictions: counters.evictions.load(Ordering::Relaxed),
            expired_evictions: counters.expired_evictions.load(Ordering::Relaxed),
            errors: counters.errors.load(Ordering::Relaxed),
            hit_rate: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            latency: self.percentiles(tier),
        }
    }

    pub fn snapshots(&self) -> Vec<TierSnapshot> {
        vec![
            self.snapshot(CacheTier::L1),
            self.snapshot(CacheTier::L2),
            self.snapshot(CacheTier::L3),
        ]
    }

    fn percentiles(&self, tier: CacheTier) -> LatencyPercentiles {
        let ring = self.latency_ring(tier).lock();
        if ring.is_empty() {
            return LatencyPercentiles::default();
        }
        let mut sorted: Vec<f64> = ring.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let at = |p: f64| {
            let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };
        LatencyPercentiles {
            p50: at(0.50),
            p90: at(0.90),
            p95: at(0.95),
            p99: at(0.99),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_and_counters() {
        let stats = CacheStatistics::new();
        stats.record_hit(CacheTier::L1);
        stats.record_hit(CacheTier::L1);
        stats.record_miss(CacheTier::L1);
        let snap = stats.snapshot(CacheTier::L1);
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert!((snap.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn percentiles_over_known_distribution() {
        let stats = CacheStatistics::new();
        for i in 1..=100 {
            stats.record_latency(CacheTier::L3, i as f64);
        }
        let p = stats.snapshot(CacheTier::L3).latency;
        assert!(p.p50 >= 49.0 && p.p50 <= 52.0);
        assert!(p.p99 >= 98.0);
        assert!(p.p90 < p.p95 && p.p95 <= p.p99);
    }

    #[test]
    fn empty_latency_is_zero() {
        let stats = CacheStatistics::new();
        let p = stats.snapshot(CacheTier::L2).latency;
        assert_eq!(p.p50, 0.0);
    }
}
