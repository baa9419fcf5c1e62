//! # ArgusDB Text Search
//!
//! Lexical relevance scoring over heterogeneous JSON records. The scorer
//! combines exact-phrase, token, synonym, fuzzy, n-gram-phrase and
//! entity-pattern evidence per weighted field, normalizes to [0, 1] and emits
//! highlight snippets. Fuzzy similarity blends Levenshtein, Jaro-Winkler,
//! character n-grams and Soundex.
//!
//! Scoring is purely lexical and heuristic; there is no embedding model
//! anywhere in this crate.

use std::collections::HashMap;

mod fuzzy;
mod scorer;

pub use fuzzy::FuzzyMatcher;
pub use scorer::{SearchScorer, DEFAULT_FIELD_WEIGHTS};

/// Search behavior selector. Each mode enables a superset of the previous
/// one's evidence: `Exact` uses phrases/tokens/entities, `Fuzzy` adds
/// approximate token matching, `Phonetic` adds Soundex token equality, and
/// `Semantic` adds synonym expansion and intent bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Exact,
    Fuzzy,
    Phonetic,
    Semantic,
}

/// Configuration for one search invocation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SearchConfig {
    pub mode: SearchMode,
    /// Results scoring below this are dropped.
    pub min_score: f64,
    pub max_results: usize,
    /// Field path → importance weight. Empty means the built-in defaults.
    pub field_weights: HashMap<String, f64>,
    /// Minimum combined similarity for the fuzzy token step.
    pub fuzzy_threshold: f64,
    pub case_sensitive: bool,
    /// Drop stop words during tokenization (kept when dropping would empty
    /// the token list).
    pub strip_stop_words: bool,
    /// Half-width of highlight snippets, in characters.
    pub context_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::Semantic,
            min_score: 0.0,
            max_results: 50,
            field_weights: HashMap::new(),
            fuzzy_threshold: 0.8,
            case_sensitive: false,
            strip_stop_words: true,
            context_chars: 50,
        }
    }
}

/// One scored record.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: serde_json::Value,
    /// Normalized relevance in [0, 1].
    pub score: f64,
    /// Source database (`_database` field of the record, when present).
    pub database: String,
    /// Field path → highlight snippets (at most 3 per field).
    pub highlights: HashMap<String, Vec<String>>,
    /// Human-readable summary of why the record matched.
    pub explanation: String,
}
