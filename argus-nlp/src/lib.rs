//! # ArgusDB Natural-Language Query Parsing
//!
//! Heuristic parsing of free-form query strings into a structured form the
//! query pipeline understands. Everything here is regex and pattern matching;
//! outputs carry confidences and downstream consumers treat them as advisory.

use std::collections::HashMap;

mod parser;
mod spell;
mod suggester;

pub use parser::QueryParser;
pub use spell::{SpellChecker, SpellCorrection};
pub use suggester::{QuerySuggester, QuerySuggestion};

/// What the user appears to be asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    SearchEntity,
    FindRelationship,
    AggregateData,
    FilterResults,
    SortResults,
    ExplainEntity,
    CompareEntities,
    Unknown,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchEntity => "search_entity",
            Self::FindRelationship => "find_relationship",
            Self::AggregateData => "aggregate_data",
            Self::FilterResults => "filter_results",
            Self::SortResults => "sort_results",
            Self::ExplainEntity => "explain_entity",
            Self::CompareEntities => "compare_entities",
            Self::Unknown => "unknown",
        }
    }
}

/// Kinds of entities the extractor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Location,
    Date,
    Event,
    Task,
    Other,
}

/// One entity pulled out of the query text.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExtractedEntity {
    pub text: String,
    pub kind: EntityKind,
    /// Extraction confidence in [0, 1].
    pub confidence: f64,
    /// Byte span in the original text.
    pub start: usize,
    pub end: usize,
}

/// Requested aggregation, e.g. `{"op": "count"}` or
/// `{"op": "sum", "field": "amount"}`.
pub type Aggregation = HashMap<String, serde_json::Value>;

/// Structured output of the parser. Field semantics follow the query
/// pipeline's expectations: `filters` is a field → value map,
/// `sort_criteria` is `(field, "asc"|"desc")` pairs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ParsedQuery {
    pub original_text: String,
    pub intent: QueryIntent,
    pub entities: Vec<ExtractedEntity>,
    pub filters: HashMap<String, serde_json::Value>,
    pub sort_criteria: Vec<(String, String)>,
    pub limit: Option<usize>,
    pub relationships_to_include: Vec<String>,
    pub aggregations: Vec<Aggregation>,
    /// Overall parse confidence in [0, 1].
    pub confidence: f64,
}

impl ParsedQuery {
    pub fn empty(original: &str) -> Self {
        Self {
            original_text: original.to_string(),
            intent: QueryIntent::Unknown,
            entities: Vec::new(),
            filters: HashMap::new(),
            sort_criteria: Vec::new(),
            limit: None,
            relationships_to_include: Vec::new(),
            aggregations: Vec::new(),
            confidence: 0.0,
        }
    }
}
