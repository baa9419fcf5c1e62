//! Query model: the typed structures accepted and produced by the executor.

use serde_json::Value;

use argus_nlp::ParsedQuery;

/// The closed operator vocabulary of the filter engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOperator {
    Eq,
    Ne,
    Contains,
    NotContains,
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    IsNull,
    IsNotNull,
    Regex,
    Fuzzy,
    StartsWith,
    EndsWith,
}

impl QueryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Between => "between",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
            Self::Regex => "regex",
            Self::Fuzzy => "fuzzy",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One filter condition: `(field, operator, value)` plus case flag. `field`
/// supports dot notation; numeric path components index into lists.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueryFilter {
    pub field: String,
    pub operator: QueryOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

fn default_true() -> bool {
    true
}

impl QueryFilter {
    pub fn new(field: &str, operator: QueryOperator, value: Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value,
            case_sensitive: true,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortField {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Desc,
        }
    }
}

/// Offset pagination. `page` is 1-based; sizes are clamped to [1, 1000].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_size")]
    pub size: usize,
    /// Opaque cursor; when present it replaces `page`.
    #[serde(default)]
    pub cursor: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_size() -> usize {
    100
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            size: 100,
            cursor: None,
        }
    }
}

impl Pagination {
    pub fn clamped_size(&self) -> usize {
        self.size.clamp(1, 1000)
    }

    pub fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1) * self.clamped_size()
    }
}

/// Request to inline related records.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RelationshipInclude {
    pub relation_field: String,
    #[serde(default)]
    pub target_database: Option<String>,
    #[serde(default = "default_depth")]
    pub max_depth: usize,
}

fn default_depth() -> usize {
    1
}

/// Requested aggregation over the filtered (pre-pagination) set.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AggregationSpec {
    /// `count`, `sum`, `avg`, `min`, `max` or `group_by`.
    pub op: String,
    #[serde(default)]
    pub field: Option<String>,
}

/// The canonical query input.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StructuredQuery {
    pub database: String,
    #[serde(default)]
    pub filters: Vec<QueryFilter>,
    #[serde(default)]
    pub sort_fields: Vec<SortField>,
    #[serde(default)]
    pub includes: Vec<RelationshipInclude>,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub aggregations: Vec<AggregationSpec>,
    /// Free text scored by the search engine when present.
    #[serde(default)]
    pub source_query: Option<String>,
    /// Intent label carried from NL parsing; used for cache tags.
    #[serde(default)]
    pub intent: Option<String>,
}

impl StructuredQuery {
    pub fn for_database(database: &str) -> Self {
        Self {
            database: database.to_string(),
            filters: Vec::new(),
            sort_fields: Vec::new(),
            includes: Vec::new(),
            pagination: Pagination::default(),
            distinct: false,
            aggregations: Vec::new(),
            source_query: None,
            intent: None,
        }
    }

    /// Build a structured query from NL parser output. The entity→database
    /// mapping is the executor's concern; here the first recognizable pieces
    /// are carried over.
    pub fn from_parsed(parsed: &ParsedQuery, database: String) -> Self {
        let filters = parsed
            .filters
            .iter()
            .map(|(field, value)| {
                // NL filter keys ending in a comparison suffix become range
                // filters; everything else is case-insensitive equality.
                if let Some(field) = field.strip_suffix("_gt") {
                    QueryFilter::new(field, QueryOperator::Gt, value.clone())
                } else if let Some(field) = field.strip_suffix("_after") {
                    QueryFilter::new(&timestamp_field(field), QueryOperator::Gt, value.clone())
                } else if let Some(field) = field.strip_suffix("_before") {
                    QueryFilter::new(&timestamp_field(field), QueryOperator::Lt, value.clone())
                } else {
                    QueryFilter::new(field, QueryOperator::Eq, value.clone()).case_insensitive()
                }
            })
            .collect();

        let sort_fields = parsed
            .sort_criteria
            .iter()
            .map(|(field, direction)| SortField {
                field: field.clone(),
                order: if direction == "desc" {
                    SortOrder::Desc
                } else {
                    SortOrder::Asc
                },
            })
            .collect();

        let pagination = Pagination {
            size: parsed.limit.unwrap_or(100).clamp(1, 1000),
            ..Pagination::default()
        };

        Self {
            database,
            filters,
            sort_fields,
            includes: parsed
                .relationships_to_include
                .iter()
                .map(|field| RelationshipInclude {
                    relation_field: field.clone(),
                    target_database: None,
                    max_depth: 1,
                })
                .collect(),
            pagination,
            distinct: false,
            aggregations: parsed
                .aggregations
                .iter()
                .map(|agg| AggregationSpec {
                    op: agg
                        .get("op")
                        .and_then(|v| v.as_str())
                        .unwrap_or("count")
                        .to_string(),
                    field: agg.get("field").and_then(|v| v.as_str()).map(String::from),
                })
                .collect(),
            source_query: Some(parsed.original_text.clone()),
            intent: Some(parsed.intent.as_str().to_string()),
        }
    }
}

/// `created`/`updated` date filters from the NL parser address the
/// conventional `_at` timestamp fields.
fn timestamp_field(field: &str) -> String {
    match field {
        "created" | "updated" | "modified" => format!("{field}_at"),
        other => other.to_string(),
    }
}

/// Per-stage wall-clock timings for one query.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QueryStageTimings {
    pub parse_ms: f64,
    pub optimize_ms: f64,
    pub load_ms: f64,
    pub filter_ms: f64,
    pub search_ms: f64,
    pub relationship_ms: f64,
    pub sort_ms: f64,
    pub total_ms: f64,
}

impl QueryStageTimings {
    /// Name of the slowest stage.
    pub fn bottleneck(&self) -> &'static str {
        let stages = [
            ("parse", self.parse_ms),
            ("optimize", self.optimize_ms),
            ("load", self.load_ms),
            ("filter", self.filter_ms),
            ("search", self.search_ms),
            ("relationship", self.relationship_ms),
            ("sort", self.sort_ms),
        ];
        stages
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| *name)
            .unwrap_or("parse")
    }
}

/// The executor's output.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QueryResult {
    pub data: Vec<Value>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    #[serde(default)]
    pub execution_time_ms: f64,
    #[serde(default)]
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timings: Option<QueryStageTimings>,
}

impl QueryResult {
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.total_count.div_ceil(self.page_size)
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages()
    }
}
