//! Query-level statistics.
//!
//! Counters are monotonic and updates never block the query path for long:
//! atomics for the totals, one short lock for the maps and the latency ring.
//! Failed attempts land in their own bucket. Queries slower than one second
//! are kept in a bounded slow-query log.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use argus_cache::LatencyPercentiles;

const LATENCY_WINDOW: usize = 4096;
const SLOW_QUERY_MS: f64 = 1000.0;
const SLOW_QUERY_LOG: usize = 100;

#[derive(Debug, Clone, serde::Serialize)]
pub struct SlowQuery {
    pub database: String,
    pub filter_fields: Vec<String>,
    pub execution_time_ms: f64,
    pub from_cache: bool,
}

#[derive(Debug, Default)]
struct Maps {
    popular_databases: HashMap<String, u64>,
    popular_filters: HashMap<String, u64>,
    latencies: VecDeque<f64>,
    slow_queries: VecDeque<SlowQuery>,
    total_time_ms: f64,
}

/// Process-wide query statistics collector.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    total_queries: AtomicU64,
    failed_queries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    maps: Mutex<Maps>,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(
        &self,
        database: &str,
        filter_fields: &[String],
        execution_time_ms: f64,
        from_cache: bool,
    ) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        if from_cache {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let mut maps = self.maps.lock();
        maps.total_time_ms += execution_time_ms;
        *maps.popular_databases.entry(database.to_string()).or_default() += 1;
        for field in filter_fields {
            *maps.popular_filters.entry(field.clone()).or_default() += 1;
        }
        if maps.latencies.len() >= LATENCY_WINDOW {
            maps.latencies.pop_front();
        }
        maps.latencies.push_back(execution_time_ms);

        if execution_time_ms > SLOW_QUERY_MS {
            if maps.slow_queries.len() >= SLOW_QUERY_LOG {
                maps.slow_queries.pop_front();
            }
            maps.slow_queries.push_back(SlowQuery {
                database: database.to_string(),
                filter_fields: filter_fields.to_vec(),
                execution_time_ms,
                from_cache,
            });
        }
    }

    pub fn record_failure(&self, database: &str) {
        self.failed_queries.fetch_add(1, Ordering::Relaxed);
        let mut maps = self.maps.lock();
        *maps.popular_databases.entry(database.to_string()).or_default() += 1;
    }

    pub fn total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::Relaxed)
    }

    pub fn failed_queries(&self) -> u64 {
        self.failed_queries.load(Ordering::Relaxed)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn average_execution_time_ms(&self) -> f64 {
        let total = self.total_queries.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.maps.lock().total_time_ms / total as f64
    }

    /// Top `n` databases by query count, descending.
    pub fn popular_databases(&self, n: usize) -> Vec<(String, u64)> {
        let maps = self.maps.lock();
        let mut out: Vec<(String, u64)> = maps
            .popular_databases
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        out.truncate(n);
        out
    }

    /// Top `n` filter fields by use count, descending.
    pub fn popular_filters(&self, n: usize) -> Vec<(String, u64)> {
        let maps = self.maps.lock();
        let mut out: Vec<(String, u64)> = maps
            .popular_filters
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        out.truncate(n);
        out
    }

    pub fn slow_queries(&self) -> Vec<SlowQuery> {
        self.maps.lock().slow_queries.iter().cloned().collect()
    }

    pub fn latency_percentiles(&self) -> LatencyPercentiles {
        let maps = self.maps.lock();
        if maps.latencies.is_empty() {
            return LatencyPercentiles::default();
        }
        let mut sorted: Vec<f64> = maps.latencies.iter().copied().collect();
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
