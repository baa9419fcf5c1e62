//! System configuration.
//!
//! One root object with a section per subsystem, built from defaults and
//! overridden by environment variables. Recognized variables (all prefixed
//! `ARGUS_`): `CACHE_DIR` (record store directory), `EXPORT_DIR`,
//! `RETENTION_HOURS`, `ENABLE_CACHE`, `ENABLE_OPTIMIZATION`,
//! `ENABLE_PROFILING`, `MEMORY_LIMIT_MB`, `DEFAULT_TTL`,
//! `MAX_CONCURRENT_EXPORTS`, `L2_ENDPOINT`, `L3_ENABLED`, `L3_DIR`.

use std::path::PathBuf;

use argus_cache::CacheConfig;
use argus_query::QueryConfig;
use argus_store::StoreConfig;

/// Export subsystem settings.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub export_dir: PathBuf,
    /// Artifact lifetime before the sweeper deletes it.
    pub retention_hours: i64,
    pub max_concurrent_exports: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("./data/exports"),
            retention_hours: 24,
            max_concurrent_exports: 5,
        }
    }
}

/// Root configuration for the whole engine.
#[derive(Debug, Clone, Default)]
pub struct ArgusConfig {
    pub store: StoreConfig,
    pub query: QueryConfig,
    pub cache: CacheConfig,
    pub export: ExportConfig,
}

impl ArgusConfig {
    /// Defaults overridden by any `ARGUS_*` environment variables present.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(dir) = env_string("ARGUS_CACHE_DIR") {
            config.store.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_string("ARGUS_EXPORT_DIR") {
            config.export.export_dir = PathBuf::from(dir);
        }
        if let Some(hours) = env_parse::<i64>("ARGUS_RETENTION_HOURS") {
            config.export.retention_hours = hours;
        }
        if let Some(enabled) = env_bool("ARGUS_ENABLE_CACHE") {
            config.query.enable_cache = enabled;
        }
        if let Some(enabled) = env_bool("ARGUS_ENABLE_OPTIMIZATION") {
            config.query.enable_optimization = enabled;
        }
        if let Some(enabled) = env_bool("ARGUS_ENABLE_PROFILING") {
            config.query.enable_profiling = enabled;
        }
        if let Some(mb) = env_parse::<usize>("ARGUS_MEMORY_LIMIT_MB") {
            config.cache.memory_limit_mb = mb;
        }
        if let Some(ttl) = env_parse::<u64>("ARGUS_DEFAULT_TTL") {
            config.cache.default_ttl_secs = ttl;
            config.query.cache_ttl_secs = ttl;
        }
        if let Some(max) = env_parse::<usize>("ARGUS_MAX_CONCURRENT_EXPORTS") {
            config.export.max_concurrent_exports = max;
        }
        if let Some(endpoint) = env_string("ARGUS_L2_ENDPOINT") {
            config.cache.l2_endpoint = Some(endpoint);
        }
        if env_bool("ARGUS_L3_ENABLED").unwrap_or(false) {
            let dir = env_string("ARGUS_L3_DIR").unwrap_or_else(|| "./data/query_cache".to_string());
            config.cache.l3_dir = Some(PathBuf::from(dir));
        }

        config
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key)?.parse().ok()
}

fn env_bool(key: &str) -> Option<bool> {
    let value = env_string(key)?;
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = ArgusConfig::default();
        assert!(config.query.enable_cache);
        assert_eq!(config.export.retention_hours, 24);
        assert_eq!(config.export.max_concurrent_exports, 5);
        assert!(config.cache.l2_endpoint.is_none());
        assert!(config.cache.l3_dir.is_none());
    }

    #[test]
    fn env_bool_parsing() {
        assert_eq!(super::env_bool("ARGUS_NO_SUCH_VAR"), None);
        std::env::set_var("ARGUS_TEST_FLAG_A", "true");
        assert_eq!(super::env_bool("ARGUS_TEST_FLAG_A"), Some(true));
        std::env::set_var("ARGUS_TEST_FLAG_A", "off");
        assert_eq!(super::env_bool("ARGUS_TEST_FLAG_A"), Some(false));
        std::env::remove_var("ARGUS_TEST_FLAG_A");
    }
}
