//! Cost-based query optimization.
//!
//! Filters are reordered by `cost / max(selectivity, 0.001)` so cheap,
//! selective predicates run first. Selectivity comes from per-database
//! statistics (equi-depth histograms and distinct counts computed from loaded
//! data) with per-operator defaults as fallback. Indexed fields come from a
//! registry: the record store's `id` key is always indexed, and callers
//! register further fields from configuration. The optimizer also promotes
//! indexed sort fields, emits index hints, and can produce an advisory
//! execution plan; only the filter reordering is meant to feed execution,
//! and none of it changes observable results.

use std::collections::HashMap;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::model::{QueryFilter, QueryOperator, SortField, StructuredQuery};
use crate::value::as_number;

const HISTOGRAM_BUCKETS: usize = 10;

/// Equi-depth histogram over a numeric field.
#[derive(Debug, Clone)]
pub struct Histogram {
    pub field: String,
    /// `(min, max, count)` per bucket.
    pub buckets: Vec<(f64, f64, usize)>,
    pub total_count: usize,
}

impl Histogram {
    pub fn from_values(field: &str, mut values: Vec<f64>) -> Self {
        values.sort_by(f64::total_cmp);
        let total_count = values.len();
        let bucket_size = (total_count / HISTOGRAM_BUCKETS).max(1);
        let buckets = values
            .chunks(bucket_size)
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| (chunk[0], chunk[chunk.len() - 1], chunk.len()))
            .collect();
        Self {
            field: field.to_string(),
            buckets,
            total_count,
        }
    }

    /// Estimated fraction of rows equal to `value`, assuming uniform
    /// distribution inside the covering bucket.
    pub fn estimate_frequency(&self, value: f64) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        for (min, max, count) in &self.buckets {
            if *min <= value && value <= *max {
                let bucket_fraction = *count as f64 / self.total_count as f64;
                return bucket_fraction / (*count as f64).max(1.0);
            }
        }
        0.0
    }

    /// Estimated fraction of rows in `[min_value, max_value]` (either bound
    /// open). Partially overlapping buckets contribute half their mass.
    pub fn estimate_range(&self, min_value: Option<f64>, max_value: Option<f64>) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let mut matching = 0.0;
        for (bucket_min, bucket_max, count) in &self.buckets {
            let min_ok = min_value.map_or(true, |m| *bucket_max >= m);
            let max_ok = max_value.map_or(true, |m| *bucket_min <= m);
            if !(min_ok && max_ok) {
                continue;
            }
            let fully_inside = min_value.map_or(true, |m| *bucket_min >= m)
                && max_value.map_or(true, |m| *bucket_max <= m);
            matching += if fully_inside {
                *count as f64
            } else {
                *count as f64 * 0.5
            };
        }
        (matching / self.total_count as f64).min(1.0)
    }
}

/// Per-database statistics backing selectivity estimates.
#[derive(Debug, Clone)]
pub struct TableStatistics {
    pub database_name: String,
    pub row_count: usize,
    pub distinct_values: HashMap<String, usize>,
    pub indexed_fields: Vec<String>,
    pub histograms: HashMap<String, Histogram>,
    pub avg_row_size_bytes: usize,
}

impl TableStatistics {
    pub fn empty(database: &str) -> Self {
        Self {
            database_name: database.to_string(),
            row_count: 10_000,
            distinct_values: HashMap::new(),
            indexed_fields: Vec::new(),
            histograms: HashMap::new(),
            avg_row_size_bytes: 1000,
        }
    }

    /// Compute statistics from loaded records: distinct counts per top-level
    /// field, histograms for numeric fields, sampled average row size.
    pub fn compute(database: &str, records: &[Value]) -> Self {
        let mut stats = Self {
            database_name: database.to_string(),
            row_count: records.len(),
            distinct_values: HashMap::new(),
            indexed_fields: Vec::new(),
            histograms: HashMap::new(),
            avg_row_size_bytes: 1000,
        };
        if records.is_empty() {
            return stats;
        }

        let mut field_values: HashMap<String, Vec<&Value>> = HashMap::new();
        for record in records {
            if let Value::Object(map) = record {
                for (field, value) in map {
                    if !value.is_null() {
                        field_values.entry(field.clone()).or_default().push(value);
                    }
                }
            }
        }

        for (field, values) in &field_values {
            let mut distinct: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            distinct.sort();
            distinct.dedup();
            stats.distinct_values.insert(field.clone(), distinct.len());

            let numeric: Vec<f64> = values.iter().filter_map(|v| as_number(v)).collect();
            if !numeric.is_empty() && numeric.len() == values.len() {
                stats
                    .histograms
                    .insert(field.clone(), Histogram::from_values(field, numeric));
            }
        }

        let sample = records.len().min(100);
        let total: usize = records[..sample]
            .iter()
            .map(|r| serde_json::to_vec(r).map(|v| v.len()).unwrap_or(0))
            .sum();
        if sample > 0 {
            stats.avg_row_size_bytes = (total / sample).max(1);
        }
        stats
    }
}

/// One advisory step of an execution plan.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlanStep {
    pub operation: String,
    pub description: String,
    pub estimated_rows: usize,
    pub estimated_cost: f64,
}

/// Advisory plan; never affects observable results.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionPlan {
    pub database: String,
    pub estimated_cost: f64,
    pub steps: Vec<PlanStep>,
}

/// Optimizer output: the rewritten query plus advisory metadata.
#[derive(Debug, Clone)]
pub struct OptimizedQuery {
    pub query: StructuredQuery,
    pub filters_reordered: bool,
    pub suggested_indexes: Vec<String>,
    pub estimated_cost: f64,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct FilterCost {
    selectivity: f64,
    total_cost: f64,
}

impl FilterCost {
    /// Lower runs earlier: cheap and selective first.
    fn priority(&self) -> f64 {
        self.total_cost / self.selectivity.max(0.001)
    }
}

#[derive(Debug, Default)]
pub struct CostBasedOptimizer {
    statistics: DashMap<String, TableStatistics>,
    /// Per-database indexed fields beyond the implicit `id` key.
    indexes: DashMap<String, Vec<String>>,
}

impl CostBasedOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh statistics for a database from its loaded records.
    pub fn update_statistics(&self, database: &str, records: &[Value]) {
        self.statistics
            .insert(database.to_string(), TableStatistics::compute(database, records));
    }

    /// Declare `field` indexed for `database`. The record store keys every
    /// database by `id`, so `id` is indexed without registration.
    pub fn register_index(&self, database: &str, field: &str) {
        let mut fields = self.indexes.entry(database.to_string()).or_default();
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }

    pub fn table_statistics(&self, database: &str) -> TableStatistics {
        let mut stats = self
            .statistics
            .get(database)
            .map(|s| s.clone())
            .unwrap_or_else(|| TableStatistics::empty(database));

        let mut indexed = vec!["id".to_string()];
        if let Some(extra) = self.indexes.get(database) {
            for field in extra.iter() {
                if !indexed.contains(field) {
                    indexed.push(field.clone());
                }
            }
        }
        stats.indexed_fields = indexed;
        stats
    }

    /// Produce the optimized query: reordered filters, promoted sort fields,
    /// index suggestions and a cost estimate.
    pub fn optimize(&self, query: &StructuredQuery) -> OptimizedQuery {
        let stats = self.table_statistics(&query.database);
        let mut optimized = query.clone();
        let mut notes = Vec::new();

        let mut filters_reordered = false;
        if optimized.filters.len() > 1 {
            let original: Vec<String> = optimized.filters.iter().map(|f| f.field.clone()).collect();
            let mut costed: Vec<(FilterCost, QueryFilter)> = optimized
                .filters
                .iter()
                .map(|f| (self.filter_cost(f, &stats), f.clone()))
                .collect();
            costed.sort_by(|a, b| a.0.priority().total_cmp(&b.0.priority()));
            optimized.filters = costed.into_iter().map(|(_, f)| f).collect();
            let reordered: Vec<String> = optimized.filters.iter().map(|f| f.field.clone()).collect();
            filters_reordered = original != reordered;
            if filters_reordered {
                notes.push(format!(
                    "reordered {} filters by selectivity and cost",
                    optimized.filters.len()
                ));
            }
        }

        if let Some(promoted) = promote_indexed_sort(&optimized.sort_fields, &stats) {
            notes.push(format!("promoted indexed sort field {}", promoted));
            let field = promoted;
            optimized.sort_fields.sort_by_key(|s| s.field != field);
        }

        let suggested_indexes = self.suggest_indexes(query, &stats);
        let estimated_cost = self.estimate_cost(&optimized, &stats);
        debug!(database = %query.database, estimated_cost, "optimized query");

        OptimizedQuery {
            query: optimized,
            filters_reordered,
            suggested_indexes,
            estimated_cost,
            notes,
        }
    }

    fn filter_cost(&self, filter: &QueryFilter, stats: &TableStatistics) -> FilterCost {
        let selectivity = self.estimate_selectivity(filter, stats);
        let cpu = cpu_cost(filter);
        let io = if stats.indexed_fields.contains(&filter.field) {
            1.0
        } else {
            10.0
        };
        FilterCost {
            selectivity,
            total_cost: cpu + io,
        }
    }

    /// Estimated fraction of rows surviving `filter`.
    pub fn estimate_selectivity(&self, filter: &QueryFilter, stats: &TableStatistics) -> f64 {
        if let Some(histogram) = stats.histograms.get(&filter.field) {
            match filter.operator {
                QueryOperator::Eq => {
                    if let Some(v) = as_number(&filter.value) {
                        return histogram.estimate_frequency(v).max(0.001);
                    }
                }
                QueryOperator::Gt | QueryOperator::Gte => {
                    if let Some(v) = as_number(&filter.value) {
                        return histogram.estimate_range(Some(v), None).max(0.001);
                    }
                }
                QueryOperator::Lt | QueryOperator::Lte => {
                    if let Some(v) = as_number(&filter.value) {
                        return histogram.estimate_range(None, Some(v)).max(0.001);
                    }
                }
                QueryOperator::Between => {
                    if let Some(bounds) = filter.value.as_array() {
                        if bounds.len() == 2 {
                            let low = as_number(&bounds[0]);
                            let high = as_number(&bounds[1]);
                            if low.is_some() || high.is_some() {
                                return histogram.estimate_range(low, high).max(0.001);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if let Some(distinct) = stats.distinct_values.get(&filter.field) {
            match filter.operator {
                QueryOperator::Eq => return 1.0 / (*distinct).max(1) as f64,
                QueryOperator::In => {
                    if let Some(items) = filter.value.as_array() {
                        return (items.len() as f64 / (*distinct).max(1) as f64).min(1.0);
                    }
                }
                _ => {}
            }
        }

        default_selectivity(filter.operator)
    }

    fn suggest_indexes(&self, query: &StructuredQuery, stats: &TableStatistics) -> Vec<String> {
        let mut suggestions = Vec::new();
        for filter in &query.filters {
            if stats.indexed_fields.contains(&filter.field) {
                continue;
            }
            if matches!(
                filter.operator,
                QueryOperator::Eq
                    | QueryOperator::Gt
                    | QueryOperator::Gte
                    | QueryOperator::Lt
                    | QueryOperator::Lte
                    | QueryOperator::In
            ) {
                suggestions.push(format!(
                    "CREATE INDEX idx_{}_{} ON {}({})",
                    slug(&query.database),
                    slug(&filter.field),
                    query.database,
                    filter.field
                ));
            }
        }

        // Composite hint: leading filter fields plus the sort fields.
        if query.filters.len() > 1 || !query.sort_fields.is_empty() {
            let mut fields: Vec<String> = query.filters.iter().take(3).map(|f| f.field.clone()).collect();
            for sort in &query.sort_fields {
                if !fields.contains(&sort.field) {
                    fields.push(sort.field.clone());
                }
            }
            if fields.len() > 1 {
                suggestions.push(format!(
                    "CREATE INDEX idx_{}_{} ON {}({})",
                    slug(&query.database),
                    fields.iter().map(|f| slug(f)).collect::<Vec<_>>().join("_"),
                    query.database,
                    fields.join(", ")
                ));
            }
        }

        suggestions.truncate(5);
        suggestions
    }

    /// Base table cost scaled by filter selectivities, plus `n log n` for a
    /// sort and the pagination offset.
    pub fn estimate_cost(&self, query: &StructuredQuery, stats: &TableStatistics) -> f64 {
        let mut cost = stats.row_count as f64;
        for filter in &query.filters {
            cost *= self.estimate_selectivity(filter, stats);
        }
        if !query.sort_fields.is_empty() {
            let n = cost.max(2.0);
            cost += n * n.log2();
        }
        cost += query.pagination.offset() as f64;
        cost
    }

    /// Advisory execution plan for diagnostics.
    pub fn plan(&self, query: &StructuredQuery) -> ExecutionPlan {
        let stats = self.table_statistics(&query.database);
        let optimized = self.optimize(query);
        let mut steps = Vec::new();

        let mut rows = stats.row_count as f64;
        let uses_index = optimized
            .query
            .filters
            .iter()
            .any(|f| stats.indexed_fields.contains(&f.field));
        steps.push(PlanStep {
            operation: if uses_index {
                "index_scan".to_string()
            } else {
                "table_scan".to_string()
            },
            description: format!("scan {}", query.database),
            estimated_rows: stats.row_count,
            estimated_cost: rows,
        });

        for filter in &optimized.query.filters {
            let selectivity = self.estimate_selectivity(filter, &stats);
            rows *= selectivity;
            steps.push(PlanStep {
                operation: "filter".to_string(),
                description: format!("{} {} {}", filter.field, filter.operator.as_str(), filter.value),
                estimated_rows: rows as usize,
                estimated_cost: cpu_cost(filter),
            });
        }

        if !optimized.query.sort_fields.is_empty() {
            let n = rows.max(2.0);
            steps.push(PlanStep {
                operation: "sort".to_string(),
                description: optimized
                    .query
                    .sort_fields
                    .iter()
                    .map(|s| format!("{} {:?}", s.field, s.order))
                    .collect::<Vec<_>>()
                    .join(", "),
                estimated_rows: rows as usize,
                estimated_cost: n * n.log2(),
            });
        }

        let size = optimized.query.pagination.clamped_size();
        steps.push(PlanStep {
            operation: "limit".to_string(),
            description: format!(
                "offset {} limit {}",
                optimized.query.pagination.offset(),
                size
            ),
            estimated_rows: (rows as usize).min(size),
            estimated_cost: optimized.query.pagination.offset() as f64,
        });

        ExecutionPlan {
            database: query.database.clone(),
            estimated_cost: optimized.estimated_cost,
            steps,
        }
    }
}

fn promote_indexed_sort(sort_fields: &[SortField], stats: &TableStatistics) -> Option<String> {
    if sort_fields.len() < 2 {
        return None;
    }
    sort_fields
        .iter()
        .skip(1)
        .find(|s| stats.indexed_fields.contains(&s.field))
        .map(|s| s.field.clone())
}

fn default_selectivity(operator: QueryOperator) -> f64 {
    match operator {
        QueryOperator::Eq => 0.1,
        QueryOperator::Ne => 0.9,
        QueryOperator::Contains => 0.3,
        QueryOperator::NotContains => 0.7,
        QueryOperator::In => 0.2,
        QueryOperator::NotIn => 0.8,
        QueryOperator::Gt | QueryOperator::Lt => 0.3,
        QueryOperator::Gte | QueryOperator::Lte => 0.35,
        QueryOperator::Between => 0.25,
        QueryOperator::IsNull => 0.05,
        QueryOperator::IsNotNull => 0.95,
        QueryOperator::Regex => 0.15,
        QueryOperator::Fuzzy => 0.2,
        QueryOperator::StartsWith | QueryOperator::EndsWith => 0.7,
    }
}

fn cpu_cost(filter: &QueryFilter) -> f64 {
    let base = match filter.operator {
        QueryOperator::Eq | QueryOperator::Ne => 1.0,
        QueryOperator::Contains | QueryOperator::NotContains => 5.0,
        QueryOperator::In | QueryOperator::NotIn => 2.0,
        QueryOperator::Gt | QueryOperator::Gte | QueryOperator::Lt | QueryOperator::Lte => 1.0,
        QueryOperator::Between => 2.0,
        QueryOperator::IsNull | QueryOperator::IsNotNull => 0.5,
        QueryOperator::Regex => 10.0,
        QueryOperator::Fuzzy => 15.0,
        QueryOperator::StartsWith | QueryOperator::EndsWith => 2.0,
    };
    if filter.case_sensitive {
        base
    } else {
        base * 1.5
    }
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pagination;
    use serde_json::json;

    fn query_with(filters: Vec<QueryFilter>) -> StructuredQuery {
        StructuredQuery {
            filters,
            ..StructuredQuery::for_database("people")
        }
    }

    #[test]
    fn cheap_selective_filters_run_first() {
        let optimizer = CostBasedOptimizer::new();
        let query = query_with(vec![
            QueryFilter::new("bio", QueryOperator::Fuzzy, json!("analyst")),
            QueryFilter::new("dept", QueryOperator::Eq, json!("Eng")),
            QueryFilter::new("name", QueryOperator::Regex, json!("^A")),
        ]);
        let optimized = optimizer.optimize(&query);
        assert!(optimized.filters_reordered);
        // eq: (1+10)/0.1 = 110, fuzzy: (15+10)/0.2 = 125, regex: (10+10)/0.15 = 133
        assert_eq!(optimized.query.filters[0].field, "dept");
        assert_eq!(optimized.query.filters.last().unwrap().field, "name");
    }

    #[test]
    fn histogram_sharpens_range_selectivity() {
        let optimizer = CostBasedOptimizer::new();
        let records: Vec<Value> = (0..1000).map(|i| json!({"age": i % 100})).collect();
        optimizer.update_statistics("people", &records);

        let stats = optimizer.table_statistics("people");
        let narrow = QueryFilter::new("age", QueryOperator::Gt, json!(95));
        let wide = QueryFilter::new("age", QueryOperator::Gt, json!(5));
        let narrow_sel = optimizer.estimate_selectivity(&narrow, &stats);
        let wide_sel = optimizer.estimate_selectivity(&wide, &stats);
        assert!(narrow_sel < wide_sel);
        assert!(narrow_sel < 0.2, "narrow selectivity was {narrow_sel}");
    }

    #[test]
    fn distinct_counts_drive_eq_selectivity() {
        let optimizer = CostBasedOptimizer::new();
        let records: Vec<Value> = (0..100)
            .map(|i| json!({"status": if i % 2 == 0 { "open" } else { "closed" }}))
            .collect();
        optimizer.update_statistics("tasks", &records);
        let stats = optimizer.table_statistics("tasks");

        let filter = QueryFilter::new("status", QueryOperator::Eq, json!("open"));
        let sel = optimizer.estimate_selectivity(&filter, &stats);
        assert!((sel - 0.5).abs() < 1e-9);
    }

    #[test]
    fn index_suggestions_cover_filters_and_composites() {
        let optimizer = CostBasedOptimizer::new();
        let mut query = query_with(vec![
            QueryFilter::new("dept", QueryOperator::Eq, json!("Eng")),
            QueryFilter::new("age", QueryOperator::Gt, json!(30)),
        ]);
        query.sort_fields = vec![SortField::asc("name")];
        let optimized = optimizer.optimize(&query);

        assert!(optimized
            .suggested_indexes
            .iter()
            .any(|s| s.contains("idx_people_dept")));
        assert!(optimized.suggested_indexes.iter().any(|s| s.contains("name")));
        assert!(optimized.suggested_indexes.len() <= 5);
    }

    #[test]
    fn cost_grows_with_sort_and_offset() {
        let optimizer = CostBasedOptimizer::new();
        let base = query_with(vec![]);
        let stats = optimizer.table_statistics("people");
        let base_cost = optimizer.estimate_cost(&base, &stats);

        let mut sorted = base.clone();
        sorted.sort_fields = vec![SortField::asc("name")];
        sorted.pagination = Pagination {
            page: 10,
            size: 100,
            cursor: None,
        };
        let sorted_cost = optimizer.estimate_cost(&sorted, &stats);
        assert!(sorted_cost > base_cost);
    }

    #[test]
    fn plan_steps_chain_row_estimates() {
        let optimizer = CostBasedOptimizer::new();
        let records: Vec<Value> = (0..500).map(|i| json!({"age": i % 50, "dept": "Eng"})).collect();
        optimizer.update_statistics("people", &records);

        let query = query_with(vec![QueryFilter::new("age", QueryOperator::Lt, json!(10))]);
        let plan = optimizer.plan(&query);
        assert_eq!(plan.steps[0].operation, "table_scan");
        assert_eq!(plan.steps[1].operation, "filter");
        assert!(plan.steps[1].estimated_rows <= plan.steps[0].estimated_rows);
        assert_eq!(plan.steps.last().unwrap().operation, "limit");
    }

    #[test]
    fn registered_indexes_reach_statistics() {
        let optimizer = CostBasedOptimizer::new();
        optimizer.register_index("people", "age");
        optimizer.register_index("people", "age");
        optimizer.register_index("people", "dept");

        let stats = optimizer.table_statistics("people");
        assert_eq!(stats.indexed_fields, vec!["id", "age", "dept"]);

        // Indexed filters are cheaper to probe, so id equality outranks an
        // unindexed one at equal selectivity.
        let on_id = QueryFilter::new("id", QueryOperator::Eq, json!("p1"));
        let on_name = QueryFilter::new("name", QueryOperator::Eq, json!("x"));
        let id_cost = optimizer.filter_cost(&on_id, &stats);
        let name_cost = optimizer.filter_cost(&on_name, &stats);
        assert!(id_cost.priority() < name_cost.priority());
    }

    #[test]
    fn indexed_filter_turns_scan_into_index_scan() {
        let optimizer = CostBasedOptimizer::new();
        let query = query_with(vec![QueryFilter::new("id", QueryOperator::Eq, json!("p1"))]);
        let plan = optimizer.plan(&query);
        assert_eq!(plan.steps[0].operation, "index_scan");
    }

    #[test]
    fn suggestions_skip_indexed_fields() {
        let optimizer = CostBasedOptimizer::new();
        optimizer.register_index("people", "dept");
        let query = query_with(vec![
            QueryFilter::new("dept", QueryOperator::Eq, json!("Eng")),
            QueryFilter::new("age", QueryOperator::Gt, json!(30)),
        ]);
        let optimized = optimizer.optimize(&query);
        assert!(!optimized
            .suggested_indexes
            .iter()
            .any(|s| s.starts_with("CREATE INDEX idx_people_dept ")));
        assert!(optimized
            .suggested_indexes
            .iter()
            .any(|s| s.contains("idx_people_age")));
    }

    #[test]
    fn registered_sort_field_is_promoted_in_advisory_output() {
        let optimizer = CostBasedOptimizer::new();
        optimizer.register_index("people", "joined");
        let mut query = query_with(vec![]);
        query.sort_fields = vec![SortField::asc("name"), SortField::asc("joined")];
        let optimized = optimizer.optimize(&query);
        assert_eq!(optimized.query.sort_fields[0].field, "joined");
    }

    #[test]
    fn histogram_frequency_and_range_bounds() {
        let histogram = Histogram::from_values("v", (0..100).map(|i| i as f64).collect());
        assert!(histogram.estimate_frequency(50.0) > 0.0);
        assert_eq!(histogram.estimate_frequency(500.0), 0.0);
        let full = histogram.estimate_range(None, None);
        assert!((full - 1.0).abs() < 1e-9);
        let half = histogram.estimate_range(Some(50.0), None);
        assert!(half < 0.7 && half > 0.3);
    }
}
