//! Pipeline executor.
//!
//! Single entry point for structured and natural-language queries. Stages:
//! parse (NL only) → cache key → cache probe → optimize → load → filter →
//! search merge → includes → distinct → sort → paginate → assemble → cache
//! store → statistics. Every stage is timed; the slowest is surfaced as the
//! bottleneck. Concurrent identical keys collapse to one execution through a
//! per-key notifier map, and each query runs under a deadline with a
//! cancellation token checked between stages.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use argus_cache::{CacheTier, TieredCache, TierSnapshot};
use argus_nlp::{EntityKind, QueryParser, QuerySuggester, QuerySuggestion, SpellChecker};
use argus_search::{SearchConfig, SearchScorer};
use argus_store::RecordStore;

use crate::config::QueryConfig;
use crate::filter::FilterEngine;
use crate::model::{QueryResult, QueryStageTimings, StructuredQuery};
use crate::optimizer::CostBasedOptimizer;
use crate::relations::RelationshipResolver;
use crate::sort::SortEngine;
use crate::stats::StatisticsCollector;
use crate::value::display_string;
use crate::QueryError;

/// Per-call execution context: deadline override, cancellation signal, cache
/// TTL override.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub timeout_ms: Option<u64>,
    pub cancel: CancellationToken,
    pub cache_ttl_secs: Option<u64>,
}

impl ExecutionContext {
    fn check_cancelled(&self) -> Result<(), QueryError> {
        if self.cancel.is_cancelled() {
            Err(QueryError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// External collaborators handed to the executor.
pub struct QueryExecutorDeps {
    pub store: Arc<RecordStore>,
    pub cache: Arc<TieredCache>,
}

/// Removes a single-flight registration and wakes waiters when the winning
/// execution finishes, errors, times out or is cancelled.
struct FlightGuard<'a> {
    map: &'a dashmap::DashMap<String, Arc<Notify>>,
    key: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if let Some((_, notify)) = self.map.remove(&self.key) {
            notify.notify_waiters();
        }
    }
}

/// Engine-wide statistics summary (the `get_statistics` contract).
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatistics {
    pub total_queries: u64,
    pub failed_queries: u64,
    pub cache_hit_rate: f64,
    pub avg_execution_time_ms: f64,
    pub latency: argus_cache::LatencyPercentiles,
    pub popular_databases: Vec<(String, u64)>,
    pub popular_filters: Vec<(String, u64)>,
    pub tiers: Vec<TierSnapshot>,
}

/// The query pipeline.
pub struct QueryExecutor {
    store: Arc<RecordStore>,
    cache: Arc<TieredCache>,
    filter_engine: FilterEngine,
    sort_engine: SortEngine,
    search: SearchScorer,
    parser: QueryParser,
    resolver: RelationshipResolver,
    optimizer: CostBasedOptimizer,
    stats: Arc<StatisticsCollector>,
    config: QueryConfig,
    inflight: dashmap::DashMap<String, Arc<Notify>>,
    spell: parking_lot::Mutex<SpellChecker>,
    /// Databases whose text has already been fed to the spell checker.
    spell_fed: dashmap::DashMap<String, ()>,
    suggester: QuerySuggester,
}

impl QueryExecutor {
    pub fn new(deps: QueryExecutorDeps, config: QueryConfig) -> Self {
        let optimizer = CostBasedOptimizer::new();
        for (database, fields) in &config.indexed_fields {
            for field in fields {
                optimizer.register_index(database, field);
            }
        }

        Self {
            store: deps.store,
            cache: deps.cache,
            filter_engine: FilterEngine::new(),
            sort_engine: SortEngine::new(),
            search: SearchScorer::new(),
            parser: QueryParser::new(),
            resolver: RelationshipResolver::new(),
            optimizer,
            stats: Arc::new(StatisticsCollector::new()),
            config,
            inflight: dashmap::DashMap::new(),
            spell: parking_lot::Mutex::new(SpellChecker::new()),
            spell_fed: dashmap::DashMap::new(),
            suggester: QuerySuggester::new(),
        }
    }

    /// Query suggestions for a partial input, drawn from executed-query
    /// history and intent templates.
    pub fn suggest(&self, partial: &str, max: usize) -> Vec<QuerySuggestion> {
        self.suggester.suggest(partial, max)
    }

    pub fn optimizer(&self) -> &CostBasedOptimizer {
        &self.optimizer
    }

    pub fn statistics_collector(&self) -> Arc<StatisticsCollector> {
        Arc::clone(&self.stats)
    }

    /// Execute a structured query under the configured deadline.
    pub async fn execute_structured(
        &self,
        query: &StructuredQuery,
        ctx: &ExecutionContext,
    ) -> Result<QueryResult, QueryError> {
        let deadline = Duration::from_millis(ctx.timeout_ms.unwrap_or(self.config.default_timeout_ms));
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(QueryError::Cancelled),
            run = tokio::time::timeout(deadline, self.run(query, ctx, None)) => {
                match run {
                    Ok(result) => result,
                    Err(_) => Err(QueryError::Timeout(deadline.as_millis() as u64)),
                }
            }
        };

        match outcome {
            Ok(result) => Ok(result),
            Err(err) => {
                self.stats.record_failure(&query.database);
                warn!(database = %query.database, elapsed_ms = started.elapsed().as_millis() as u64, error = %err, "query failed");
                Err(err)
            }
        }
    }

    /// Parse and execute a natural-language query. The databases searched
    /// come from the extracted entities, falling back to everything on disk.
    pub async fn execute_natural(
        &self,
        text: &str,
        ctx: &ExecutionContext,
    ) -> Result<QueryResult, QueryError> {
        let parse_started = Instant::now();
        let (corrected, corrections) = self.spell.lock().correct_query(text);
        if !corrections.is_empty() {
            debug!(original = text, corrected = %corrected, "spell-corrected query");
        }
        let parsed = self.parser.parse(&corrected);
        self.suggester.record(&corrected);
        let parse_ms = parse_started.elapsed().as_secs_f64() * 1000.0;

        let databases = self.databases_for_entities(&parsed).await?;
        let query = StructuredQuery::from_parsed(&parsed, databases.join(","));
        debug!(intent = parsed.intent.as_str(), databases = ?databases, "executing natural-language query");

        let deadline = Duration::from_millis(ctx.timeout_ms.unwrap_or(self.config.default_timeout_ms));
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(QueryError::Cancelled),
            run = tokio::time::timeout(deadline, self.run(&query, ctx, Some(&databases))) => {
                match run {
                    Ok(result) => result,
                    Err(_) => Err(QueryError::Timeout(deadline.as_millis() as u64)),
                }
            }
        };

        match outcome {
            Ok(mut result) => {
                if let Some(timings) = &mut result.timings {
                    timings.parse_ms = parse_ms;
                    timings.total_ms += parse_ms;
                }
                Ok(result)
            }
            Err(err) => {
                self.stats.record_failure(&query.database);
                Err(err)
            }
        }
    }

    /// Engine-wide statistics: query counters plus per-tier cache state.
    pub fn get_statistics(&self) -> EngineStatistics {
        let tier_stats = self.cache.statistics();
        EngineStatistics {
            total_queries: self.stats.total_queries(),
            failed_queries: self.stats.failed_queries(),
            cache_hit_rate: self.stats.cache_hit_rate(),
            avg_execution_time_ms: self.stats.average_execution_time_ms(),
            latency: self.stats.latency_percentiles(),
            popular_databases: self.stats.popular_databases(10),
            popular_filters: self.stats.popular_filters(10),
            tiers: tier_stats.snapshots(),
        }
    }

    async fn run(
        &self,
        query: &StructuredQuery,
        ctx: &ExecutionContext,
        databases: Option<&[String]>,
    ) -> Result<QueryResult, QueryError> {
        self.validate_complexity(query)?;
        let started = Instant::now();
        let mut timings = QueryStageTimings::default();
        let filter_fields: Vec<String> = query.filters.iter().map(|f| f.field.clone()).collect();

        let key = self.cache_key(query);

        // Cache probe + single-flight: concurrent identical keys wait for the
        // winner and then re-probe instead of executing again. The guard
        // clears the registration even when this future is dropped by the
        // timeout or cancellation wrapper.
        let _flight_guard = if self.config.enable_cache {
            loop {
                if let Some(result) = self.cache_probe(&key, started).await {
                    self.stats
                        .record_query(&query.database, &filter_fields, result.execution_time_ms, true);
                    return Ok(result);
                }
                match self.inflight.entry(key.clone()) {
                    dashmap::mapref::entry::Entry::Vacant(slot) => {
                        slot.insert(Arc::new(Notify::new()));
                        break Some(FlightGuard {
                            map: &self.inflight,
                            key: key.clone(),
                        });
                    }
                    dashmap::mapref::entry::Entry::Occupied(slot) => {
                        let notify = Arc::clone(slot.get());
                        drop(slot);
                        tokio::select! {
                            _ = notify.notified() => {}
                            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                        }
                        ctx.check_cancelled()?;
                    }
                }
            }
        } else {
            None
        };

        let result = self
            .run_stages(query, ctx, databases, &key, started, &mut timings)
            .await?;
        self.stats
            .record_query(&query.database, &filter_fields, result.execution_time_ms, false);
        if self.config.enable_profiling {
            if let Some(timings) = &result.timings {
                debug!(bottleneck = timings.bottleneck(), total_ms = timings.total_ms, "query stages complete");
            }
        }
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stages(
        &self,
        query: &StructuredQuery,
        ctx: &ExecutionContext,
        databases: Option<&[String]>,
        key: &str,
        started: Instant,
        timings: &mut QueryStageTimings,
    ) -> Result<QueryResult, QueryError> {
        // Optimize. Only the filter reordering feeds execution; sort-field
        // promotion, index hints and the cost estimate are advisory and must
        // not change observable ordering.
        let stage = Instant::now();
        let mut query = query.clone();
        if self.config.enable_optimization {
            query.filters = self.optimizer.optimize(&query).query.filters;
        }
        timings.optimize_ms = stage.elapsed().as_secs_f64() * 1000.0;
        ctx.check_cancelled()?;

        // Load.
        let stage = Instant::now();
        let mut records: Vec<Value> = match databases {
            Some(names) => {
                let loaded = self.store.load_many(names).await;
                let mut merged = Vec::new();
                for name in names {
                    if let Some(rows) = loaded.get(name) {
                        self.feed_spell_checker(name, rows);
                        merged.extend(rows.iter().cloned());
                    }
                }
                merged
            }
            None => {
                let rows = self.store.load_database(&query.database).await?;
                self.optimizer.update_statistics(&query.database, &rows);
                rows.as_ref().clone()
            }
        };
        timings.load_ms = stage.elapsed().as_secs_f64() * 1000.0;
        debug!(rows = records.len(), "records loaded");
        self.feed_spell_checker(&query.database, &records);
        ctx.check_cancelled()?;

        // Filter.
        let stage = Instant::now();
        records = self.filter_engine.apply(&records, &query.filters)?;
        timings.filter_ms = stage.elapsed().as_secs_f64() * 1000.0;
        ctx.check_cancelled()?;

        // Search merge: hits replace the candidate set in relevance order.
        if let Some(source) = query.source_query.as_deref().filter(|s| !s.trim().is_empty()) {
            let stage = Instant::now();
            let hits = self.search.search(source, &records, &SearchConfig::default());
            if !hits.is_empty() {
                records = hits.into_iter().map(|hit| hit.record).collect();
            }
            timings.search_ms = stage.elapsed().as_secs_f64() * 1000.0;
            ctx.check_cancelled()?;
        }

        // Includes.
        if !query.includes.is_empty() {
            let stage = Instant::now();
            let embedded = self
                .resolver
                .resolve(&self.store, &mut records, &query.includes)
                .await;
            timings.relationship_ms = stage.elapsed().as_secs_f64() * 1000.0;
            debug!(embedded, "relationships resolved");
            ctx.check_cancelled()?;
        }

        // Distinct by id, keeping first occurrence.
        if query.distinct {
            let mut seen = HashSet::new();
            records.retain(|r| seen.insert(display_string(&r.get("id").cloned().unwrap_or(Value::Null))));
        }

        // Aggregations run over the full filtered set, before pagination.
        let aggregations = crate::aggregate::compute(&records, &query.aggregations);

        // Sort, then paginate (cursor or offset).
        let stage = Instant::now();
        let sorted = self.sort_engine.apply_sorting(records, &query.sort_fields);
        timings.sort_ms = stage.elapsed().as_secs_f64() * 1000.0;
        ctx.check_cancelled()?;

        let size = query.pagination.clamped_size();
        let (data, total_count, next_cursor, prev_cursor) = match query.pagination.cursor.as_deref() {
            Some(cursor) => {
                let total = sorted.len();
                let page = self.sort_engine.apply_cursor_pagination(
                    &sorted,
                    Some(cursor),
                    size,
                    &query.sort_fields,
                )?;
                (page.records, total, page.next_cursor, page.prev_cursor)
            }
            None if query.sort_fields.is_empty() => {
                let (page, total) =
                    self.sort_engine
                        .apply_pagination(sorted, query.pagination.page, size);
                (page, total, None, None)
            }
            None if query.pagination.page <= 1 => {
                // First page of a sorted query also gets a cursor so callers
                // can switch to cursor iteration.
                let total = sorted.len();
                let page = self
                    .sort_engine
                    .apply_cursor_pagination(&sorted, None, size, &query.sort_fields)?;
                (page.records, total, page.next_cursor, page.prev_cursor)
            }
            None => {
                let (page, total) =
                    self.sort_engine
                        .apply_pagination(sorted, query.pagination.page, size);
                (page, total, None, None)
            }
        };

        timings.total_ms = started.elapsed().as_secs_f64() * 1000.0;
        let result = QueryResult {
            data,
            total_count,
            page: query.pagination.page.max(1),
            page_size: size,
            execution_time_ms: timings.total_ms,
            from_cache: false,
            cache_tier: None,
            next_cursor,
            prev_cursor,
            aggregations,
            timings: self.config.enable_profiling.then(|| timings.clone()),
        };

        // Cache store. Cancellation before this point skipped the write.
        if self.config.enable_cache {
            let ttl = ctx.cache_ttl_secs.or(Some(self.config.cache_ttl_secs));
            let mut tags = vec![query.database.clone()];
            if let Some(intent) = &query.intent {
                tags.push(intent.clone());
            }
            if let Ok(payload) = serde_json::to_value(&result) {
                self.cache.set(key, payload, ttl, tags).await;
            }
        }

        Ok(result)
    }

    async fn cache_probe(&self, key: &str, started: Instant) -> Option<QueryResult> {
        let (cached, tier) = self.cache.get(key).await?;
        let mut result: QueryResult = serde_json::from_value(cached.result).ok()?;
        result.from_cache = true;
        result.cache_tier = Some(tier.as_str().to_string());
        result.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        if tier != CacheTier::L1 {
            info!(key, tier = tier.as_str(), "query served from deeper cache tier");
        }
        Some(result)
    }

    fn validate_complexity(&self, query: &StructuredQuery) -> Result<(), QueryError> {
        if query.filters.len() > self.config.max_filters {
            return Err(QueryError::TooComplex(format!(
                "{} filters exceeds the limit of {}",
                query.filters.len(),
                self.config.max_filters
            )));
        }
        if query.includes.len() > self.config.max_includes {
            return Err(QueryError::TooComplex(format!(
                "{} includes exceeds the limit of {}",
                query.includes.len(),
                self.config.max_includes
            )));
        }
        if query.filters.is_empty() && query.pagination.clamped_size() > self.config.max_unfiltered_page {
            return Err(QueryError::TooComplex(format!(
                "page size {} requires at least one filter",
                query.pagination.clamped_size()
            )));
        }
        Ok(())
    }

    /// Deterministic cache key over the query's observable fields. Filter
    /// order is erased whenever the optimizer is enabled, since reordering
    /// cannot change results. Public so callers can target invalidation.
    pub fn cache_key(&self, query: &StructuredQuery) -> String {
        let mut filters: Vec<(String, String, String, bool)> = query
            .filters
            .iter()
            .map(|f| {
                (
                    f.field.clone(),
                    f.operator.as_str().to_string(),
                    f.value.to_string(),
                    f.case_sensitive,
                )
            })
            .collect();
        if self.config.enable_optimization {
            filters.sort();
        }

        let key_value = serde_json::json!({
            "database": query.database,
            "filters": filters.iter().map(|(field, op, value, case)| {
                serde_json::json!({"field": field, "op": op, "value": value, "case": case})
            }).collect::<Vec<_>>(),
            "sort": query.sort_fields.iter().map(|s| {
                serde_json::json!([s.field, matches!(s.order, crate::model::SortOrder::Desc)])
            }).collect::<Vec<_>>(),
            "page": query.pagination.page,
            "size": query.pagination.clamped_size(),
            "cursor": query.pagination.cursor,
            "includes": query.includes.iter().map(|i| {
                serde_json::json!([i.relation_field, i.target_database, i.max_depth])
            }).collect::<Vec<_>>(),
            "distinct": query.distinct,
            "aggregations": query.aggregations.iter().map(|a| {
                serde_json::json!([a.op, a.field])
            }).collect::<Vec<_>>(),
            "source_query": query.source_query,
        });

        let mut hasher = Sha256::new();
        hasher.update(key_value.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Feed record text into the spell checker's vocabulary, once per
    /// database. Samples the first 500 records to bound the cost.
    fn feed_spell_checker(&self, database: &str, records: &[Value]) {
        if self.spell_fed.contains_key(database) {
            return;
        }
        self.spell_fed.insert(database.to_string(), ());

        let mut spell = self.spell.lock();
        for record in records.iter().take(500) {
            if let Value::Object(map) = record {
                for (field, value) in map {
                    spell.learn_text(field);
                    if let Value::String(text) = value {
                        spell.learn_text(text);
                    }
                }
            }
        }
        debug!(database, vocabulary = spell.vocabulary_size(), "spell vocabulary updated");
    }

    /// Databases implied by the parsed entities; everything on disk when no
    /// entity maps anywhere.
    async fn databases_for_entities(
        &self,
        parsed: &argus_nlp::ParsedQuery,
    ) -> Result<Vec<String>, QueryError> {
        let mut databases: Vec<String> = Vec::new();
        for entity in &parsed.entities {
            let database = match entity.kind {
                EntityKind::Person => Some("People & Contacts"),
                EntityKind::Organization => Some("Organizations & Bodies"),
                EntityKind::Task => Some("Actionable Tasks"),
                EntityKind::Event | EntityKind::Location => Some("Key Places & Events"),
                _ => None,
            };
            if let Some(database) = database {
                if !databases.contains(&database.to_string()) {
                    databases.push(database.to_string());
                }
            }
        }
        if databases.is_empty() {
            databases = self.store.available_databases().await?;
        }
        Ok(databases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Pagination, QueryFilter, QueryOperator, SortField};
    use argus_cache::CacheConfig;
    use argus_store::StoreConfig;
    use serde_json::json;

    async fn executor_with(
        files: &[(&str, Value)],
        config: QueryConfig,
    ) -> (tempfile::TempDir, QueryExecutor) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), serde_json::to_vec(content).unwrap()).unwrap();
        }
        let store = Arc::new(RecordStore::new(StoreConfig {
            data_dir: dir.path().to_path_buf(),
            ..StoreConfig::default()
        }));
        let cache = Arc::new(TieredCache::new(&CacheConfig::default()).await);
        let executor = QueryExecutor::new(QueryExecutorDeps { store, cache }, config);
        (dir, executor)
    }

    fn people_db() -> Value {
        json!([
            {"id": 1, "dept": "Eng", "name": "Alice", "age": 34},
            {"id": 2, "dept": "Sales", "name": "Bob", "age": 41},
            {"id": 3, "dept": "Eng", "name": "Carla", "age": 29}
        ])
    }

    #[tokio::test]
    async fn structured_query_filters_and_paginates() {
        let (_dir, executor) = executor_with(&[("people.json", people_db())], QueryConfig::default()).await;
        let mut query = StructuredQuery::for_database("people");
        query.filters = vec![QueryFilter::new("dept", QueryOperator::Eq, json!("Eng"))];
        query.sort_fields = vec![SortField::asc("age")];

        let result = executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(result.total_count, 2);
        assert_eq!(result.data[0]["name"], json!("Carla"));
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn second_identical_query_hits_cache() {
        let (_dir, executor) = executor_with(&[("people.json", people_db())], QueryConfig::default()).await;
        let mut query = StructuredQuery::for_database("people");
        query.filters = vec![QueryFilter::new("dept", QueryOperator::Eq, json!("Eng"))];

        let first = executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap();
        let second = executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap();
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.cache_tier.as_deref(), Some("l1"));
        assert_eq!(first.data, second.data);
        assert_eq!(first.total_count, second.total_count);
    }

    #[tokio::test]
    async fn filter_permutations_share_results_under_optimization() {
        let (_dir, executor) = executor_with(&[("people.json", people_db())], QueryConfig::default()).await;
        let a = QueryFilter::new("dept", QueryOperator::Eq, json!("Eng"));
        let b = QueryFilter::new("age", QueryOperator::Lt, json!(40));

        let mut forward = StructuredQuery::for_database("people");
        forward.filters = vec![a.clone(), b.clone()];
        let mut backward = StructuredQuery::for_database("people");
        backward.filters = vec![b, a];

        let first = executor
            .execute_structured(&forward, &ExecutionContext::default())
            .await
            .unwrap();
        let second = executor
            .execute_structured(&backward, &ExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(first.data, second.data);
        // Same normalized key: the second execution is a cache hit.
        assert!(second.from_cache);
    }

    async fn depts_sorted_by(config: QueryConfig) -> Vec<String> {
        let rows = json!([
            {"id": 1, "dept": "B"},
            {"id": 2, "dept": "A"}
        ]);
        let (_dir, executor) = executor_with(&[("people.json", rows)], config).await;
        let mut query = StructuredQuery::for_database("people");
        query.filters = vec![QueryFilter::new("id", QueryOperator::IsNotNull, Value::Null)];
        query.sort_fields = vec![SortField::asc("dept"), SortField::asc("id")];
        executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap()
            .data
            .iter()
            .map(|r| r["dept"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn optimization_never_changes_sort_order() {
        // `id` is always indexed, so the optimizer's advisory output promotes
        // it ahead of `dept`; the executed ordering must stay dept-major.
        let with_optimizer = depts_sorted_by(QueryConfig::default()).await;
        let without_optimizer = depts_sorted_by(QueryConfig {
            enable_optimization: false,
            ..QueryConfig::default()
        })
        .await;

        assert_eq!(with_optimizer, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(with_optimizer, without_optimizer);
    }

    #[tokio::test]
    async fn too_many_filters_fail_before_execution() {
        let (_dir, executor) = executor_with(&[("people.json", people_db())], QueryConfig::default()).await;
        let mut query = StructuredQuery::for_database("people");
        query.filters = (0..25)
            .map(|i| QueryFilter::new(&format!("f{i}"), QueryOperator::Eq, json!(i)))
            .collect();
        let err = executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::TooComplex(_)));
    }

    #[tokio::test]
    async fn unfiltered_large_page_is_rejected() {
        let (_dir, executor) = executor_with(&[("people.json", people_db())], QueryConfig::default()).await;
        let mut query = StructuredQuery::for_database("people");
        query.pagination = Pagination {
            page: 1,
            size: 500,
            cursor: None,
        };
        let err = executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::TooComplex(_)));
    }

    #[tokio::test]
    async fn cancelled_query_writes_no_cache() {
        let (_dir, executor) = executor_with(&[("people.json", people_db())], QueryConfig::default()).await;
        let mut query = StructuredQuery::for_database("people");
        query.filters = vec![QueryFilter::new("dept", QueryOperator::Eq, json!("Eng"))];

        let ctx = ExecutionContext::default();
        ctx.cancel.cancel();
        let err = executor.execute_structured(&query, &ctx).await.unwrap_err();
        assert!(matches!(err, QueryError::Cancelled));

        // Fresh context: the cancelled attempt must not have cached anything.
        let result = executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap();
        assert!(!result.from_cache);
    }

    #[tokio::test]
    async fn natural_language_query_runs_end_to_end() {
        let (_dir, executor) = executor_with(
            &[("people_contacts.json", people_db())],
            QueryConfig::default(),
        )
        .await;
        let result = executor
            .execute_natural("find all people", &ExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(result.total_count, 3);
        assert!(result.timings.is_some());
    }

    #[tokio::test]
    async fn search_merge_preserves_relevance_order() {
        let (_dir, executor) = executor_with(&[("people.json", people_db())], QueryConfig::default()).await;
        let mut query = StructuredQuery::for_database("people");
        query.filters = vec![QueryFilter::new("id", QueryOperator::IsNotNull, Value::Null)];
        query.source_query = Some("alice".to_string());

        let result = executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap();
        assert!(!result.data.is_empty());
        assert_eq!(result.data[0]["name"], json!("Alice"));
    }

    #[tokio::test]
    async fn distinct_deduplicates_by_id() {
        let (_dir, executor) = executor_with(
            &[(
                "dupes.json",
                json!([
                    {"id": "x", "v": 1},
                    {"id": "x", "v": 2},
                    {"id": "y", "v": 3}
                ]),
            )],
            QueryConfig::default(),
        )
        .await;
        let mut query = StructuredQuery::for_database("dupes");
        query.filters = vec![QueryFilter::new("id", QueryOperator::IsNotNull, Value::Null)];
        query.distinct = true;

        let result = executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(result.total_count, 2);
    }

    #[tokio::test]
    async fn statistics_count_queries_and_failures() {
        let (_dir, executor) = executor_with(&[("people.json", people_db())], QueryConfig::default()).await;
        let mut query = StructuredQuery::for_database("people");
        query.filters = vec![QueryFilter::new("dept", QueryOperator::Eq, json!("Eng"))];
        executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap();
        executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap();

        let mut missing = StructuredQuery::for_database("absent");
        missing.filters = vec![QueryFilter::new("x", QueryOperator::Eq, json!(1))];
        let _ = executor
            .execute_structured(&missing, &ExecutionContext::default())
            .await;

        let stats = executor.get_statistics();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.failed_queries, 1);
        assert!(stats.cache_hit_rate > 0.0);
        assert_eq!(stats.popular_filters[0].0, "dept");
    }

    #[tokio::test]
    async fn aggregations_attach_to_results() {
        let (_dir, executor) = executor_with(&[("people.json", people_db())], QueryConfig::default()).await;
        let mut query = StructuredQuery::for_database("people");
        query.filters = vec![QueryFilter::new("id", QueryOperator::IsNotNull, Value::Null)];
        query.aggregations = vec![
            crate::model::AggregationSpec {
                op: "count".to_string(),
                field: None,
            },
            crate::model::AggregationSpec {
                op: "avg".to_string(),
                field: Some("age".to_string()),
            },
            crate::model::AggregationSpec {
                op: "group_by".to_string(),
                field: Some("dept".to_string()),
            },
        ];

        let result = executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap();
        let aggregations = result.aggregations.unwrap();
        assert_eq!(aggregations["count"], json!(3));
        assert!((aggregations["avg_age"].as_f64().unwrap() - 34.666).abs() < 0.01);
        assert_eq!(aggregations["group_by_dept"]["Eng"], json!(2));
    }

    #[tokio::test]
    async fn natural_queries_feed_suggestions_and_spelling() {
        let (_dir, executor) = executor_with(
            &[("people_contacts.json", people_db())],
            QueryConfig::default(),
        )
        .await;

        // First query loads the database and feeds the vocabulary.
        executor
            .execute_natural("find all people", &ExecutionContext::default())
            .await
            .unwrap();

        let suggestions = executor.suggest("find all", 5);
        assert!(suggestions.iter().any(|s| s.text == "find all people"));

        // A misspelled record term is corrected against the vocabulary.
        let result = executor
            .execute_natural("find alic", &ExecutionContext::default())
            .await
            .unwrap();
        assert!(result.data.iter().any(|r| r["name"] == json!("Alice")));
    }

    #[tokio::test]
    async fn bad_regex_surfaces_to_caller() {
        let (_dir, executor) = executor_with(&[("people.json", people_db())], QueryConfig::default()).await;
        let mut query = StructuredQuery::for_database("people");
        query.filters = vec![QueryFilter::new("name", QueryOperator::Regex, json!("(open"))];
        let err = executor
            .execute_structured(&query, &ExecutionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::BadRegex { .. }));
    }
}
