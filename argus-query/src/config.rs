//! Query pipeline configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Behavior switches and guardrails for the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Probe and populate the result cache.
    pub enable_cache: bool,
    /// Run the cost-based optimizer before execution.
    pub enable_optimization: bool,
    /// Collect per-stage timings and attach them to results.
    pub enable_profiling: bool,
    /// Per-query deadline.
    pub default_timeout_ms: u64,
    /// TTL for cached results.
    pub cache_ttl_secs: u64,
    /// Complexity guardrails; exceeding any fails the query before execution.
    pub max_filters: usize,
    pub max_includes: usize,
    /// Largest page size allowed for a query with no filters.
    pub max_unfiltered_page: usize,
    /// Database → fields to treat as indexed in the cost model, on top of
    /// the implicit `id` key.
    pub indexed_fields: HashMap<String, Vec<String>>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            enable_optimization: true,
            enable_profiling: true,
            default_timeout_ms: 30_000,
            cache_ttl_secs: 3600,
            max_filters: 20,
            max_includes: 5,
            max_unfiltered_page: 100,
            indexed_fields: HashMap::new(),
        }
    }
}
