//! # ArgusDB Query Engine
//!
//! The query execution core: typed query model, filter engine, sort and
//! pagination engine, relationship resolver, cost-based optimizer, statistics
//! collector, and the pipeline executor that wires them to the record store,
//! cache tiers, text search and NL parser.
//!
//! The executor is the single entry point:
//!
//! ```ignore
//! let executor = QueryExecutor::new(deps, config);
//! let result = executor.execute_structured(&query, &ExecutionContext::default()).await?;
//! ```

mod aggregate;
mod builder;
mod config;
mod executor;
mod filter;
mod model;
mod optimizer;
mod relations;
mod sort;
mod stats;
mod value;

pub use builder::QueryBuilder;
pub use config::QueryConfig;
pub use executor::{EngineStatistics, ExecutionContext, QueryExecutor, QueryExecutorDeps};
pub use filter::FilterEngine;
pub use model::{
    AggregationSpec, Pagination, QueryFilter, QueryOperator, QueryResult, QueryStageTimings,
    RelationshipInclude, SortField, SortOrder, StructuredQuery,
};
pub use optimizer::{
    CostBasedOptimizer, ExecutionPlan, Histogram, OptimizedQuery, PlanStep, TableStatistics,
};
pub use relations::RelationshipResolver;
pub use sort::{CursorPage, SortEngine};
pub use stats::StatisticsCollector;
pub use value::{compare_values, is_null_like, resolve_field};

pub use argus_nlp::QuerySuggestion;

/// Query-engine error taxonomy. Cache I/O never appears here: tier failures
/// are recovered inside the cache crate and surface as misses.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] argus_store::StoreError),

    #[error("bad filter shape: {0}")]
    BadFilterShape(String),

    #[error("bad regex {pattern:?}: {reason}")]
    BadRegex { pattern: String, reason: String },

    #[error("bad cursor: {0}")]
    BadCursor(String),

    #[error("query timed out after {0} ms")]
    Timeout(u64),

    #[error("query cancelled")]
    Cancelled,

    #[error("query too complex: {0}")]
    TooComplex(String),
}
