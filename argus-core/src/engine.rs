//! Engine assembly and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::info;

use argus_cache::TieredCache;
use argus_export::{ExportFormat, ExportJob, ExportJobManager};
use argus_query::{
    EngineStatistics, ExecutionContext, QueryExecutor, QueryExecutorDeps, QueryResult,
    StructuredQuery,
};
use argus_store::RecordStore;

use crate::config::ArgusConfig;

/// The assembled engine: record store, cache tiers, query executor and
/// export manager, plus their background maintenance tasks.
pub struct ArgusDb {
    config: ArgusConfig,
    store: Arc<RecordStore>,
    cache: Arc<TieredCache>,
    executor: Arc<QueryExecutor>,
    exports: Arc<ExportJobManager>,
    maintenance: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ArgusDb {
    /// Wire all subsystems from configuration. No background tasks run until
    /// `start`.
    pub async fn new(config: ArgusConfig) -> Result<Self> {
        info!("initializing argusdb engine");
        let store = Arc::new(RecordStore::new(config.store.clone()));
        let cache = Arc::new(TieredCache::new(&config.cache).await);
        let executor = Arc::new(QueryExecutor::new(
            QueryExecutorDeps {
                store: Arc::clone(&store),
                cache: Arc::clone(&cache),
            },
            config.query.clone(),
        ));
        let exports = Arc::new(
            ExportJobManager::new(
                &config.export.export_dir,
                config.export.retention_hours,
                config.export.max_concurrent_exports,
            )
            .await?,
        );

        Ok(Self {
            config,
            store,
            cache,
            executor,
            exports,
            maintenance: Mutex::new(None),
        })
    }

    /// Launch background tasks: the export TTL sweeper and the periodic
    /// cache expiry sweep.
    pub async fn start(&self) -> Result<()> {
        info!("starting argusdb engine");
        self.exports.start();

        let cache = Arc::clone(&self.cache);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                cache.evict_expired().await;
            }
        });
        *self.maintenance.lock() = Some(handle);

        info!("argusdb engine started");
        Ok(())
    }

    /// Graceful shutdown: stop maintenance, cancel in-flight exports with a
    /// grace period, flush the disk cache index.
    pub async fn stop(&self) -> Result<()> {
        info!("stopping argusdb engine");
        if let Some(handle) = self.maintenance.lock().take() {
            handle.abort();
        }
        self.exports.stop(Duration::from_secs(5)).await;
        self.cache.shutdown().await;
        info!("argusdb engine stopped");
        Ok(())
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn executor(&self) -> &Arc<QueryExecutor> {
        &self.executor
    }

    pub fn exports(&self) -> &Arc<ExportJobManager> {
        &self.exports
    }

    pub fn config(&self) -> &ArgusConfig {
        &self.config
    }

    /// Execute a structured query.
    pub async fn execute_structured(&self, query: &StructuredQuery) -> Result<QueryResult> {
        Ok(self
            .executor
            .execute_structured(query, &ExecutionContext::default())
            .await?)
    }

    /// Execute a natural-language query.
    pub async fn execute_natural(&self, text: &str) -> Result<QueryResult> {
        Ok(self
            .executor
            .execute_natural(text, &ExecutionContext::default())
            .await?)
    }

    /// Run a query page by page and queue the full result set for export.
    /// Exports stream from the query pipeline, not from the result cache.
    pub async fn export_query(
        &self,
        query: &StructuredQuery,
        format: ExportFormat,
        filename: Option<&str>,
    ) -> Result<String> {
        let mut page_query = query.clone();
        page_query.pagination.cursor = None;
        page_query.pagination.page = 1;
        page_query.pagination.size = page_query.pagination.clamped_size();

        let mut rows = Vec::new();
        loop {
            let result = self
                .executor
                .execute_structured(&page_query, &ExecutionContext::default())
                .await?;
            let got = result.data.len();
            rows.extend(result.data);
            if got < page_query.pagination.size || rows.len() >= result.total_count {
                break;
            }
            page_query.pagination.page += 1;
        }

        let job_id = self.exports.create(
            stream::iter(rows).boxed(),
            Some(format),
            filename,
            None,
            &serde_json::Value::Object(Default::default()),
        )?;
        info!(job_id, "queued export job");
        Ok(job_id)
    }

    pub fn export_job(&self, job_id: &str) -> Option<ExportJob> {
        self.exports.get_job(job_id)
    }

    /// Query suggestions for a partial input.
    pub fn suggest(&self, partial: &str, max: usize) -> Vec<argus_query::QuerySuggestion> {
        self.executor.suggest(partial, max)
    }

    pub fn statistics(&self) -> EngineStatistics {
        self.executor.get_statistics()
    }
}
