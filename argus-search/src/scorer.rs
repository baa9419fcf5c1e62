//! Field-weighted relevance scoring.
//!
//! Each record is scored field by field against the parsed query. Evidence
//! sources, in decreasing strength: quoted-phrase hits, token overlap
//! (position-discounted), synonym-expanded tokens, fuzzy token pairs, word
//! n-gram phrases, entity patterns and an intent bonus. The sum is normalized
//! by the best theoretically reachable token score so results land in [0, 1].

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::fuzzy::FuzzyMatcher;
use crate::{SearchConfig, SearchHit, SearchMode};

/// Baseline field importance used when the caller supplies no weights.
pub const DEFAULT_FIELD_WEIGHTS: &[(&str, f64)] = &[
    ("properties.Title", 2.0),
    ("properties.Name", 2.0),
    ("properties.Description", 1.5),
    ("properties.Content", 1.0),
    ("properties.Tags", 1.8),
    ("properties.Category", 1.5),
    ("properties.Department", 1.3),
    ("properties.Status", 1.2),
    ("name", 2.0),
    ("title", 2.0),
    ("description", 1.5),
    ("id", 0.5),
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "up", "about", "into", "through", "during", "before", "after", "above", "below",
    "between", "under", "again", "further", "then", "once", "is", "are", "was", "were", "been",
    "be", "have", "has", "had", "do", "does", "did", "will", "would", "could", "should", "may",
    "might", "must", "can", "this", "that", "these", "those", "i", "you", "he", "she", "it",
    "we", "they", "them", "their", "what", "which", "who", "when", "where", "why", "how", "all",
    "each", "every", "some", "any", "few", "more", "most", "other", "such", "no", "nor", "not",
    "only", "own", "same", "so", "than", "too", "very",
];

const SYNONYMS: &[(&str, &[&str])] = &[
    ("meeting", &["conference", "session", "gathering", "assembly"]),
    ("task", &["todo", "action", "assignment", "job"]),
    ("document", &["file", "report", "paper", "record"]),
    ("person", &["contact", "individual", "member", "user"]),
    ("organization", &["company", "firm", "entity", "institution"]),
    ("project", &["initiative", "program", "venture", "effort"]),
    ("issue", &["problem", "concern", "matter", "topic"]),
    ("complete", &["finish", "done", "accomplish", "achieve"]),
    ("create", &["make", "build", "generate", "produce"]),
    ("update", &["modify", "change", "edit", "revise"]),
];

/// Local intent guess used for the intent bonus (step 7). This is a cheap
/// classifier over the query text alone; the full NL parser lives elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryLeaning {
    Person,
    Task,
    Document,
    DateBound,
    General,
}

struct ParsedSearch {
    tokens: Vec<String>,
    expanded: HashSet<String>,
    quoted: Vec<String>,
    phrases: Vec<String>,
    entities: Vec<(String, String)>,
    leaning: QueryLeaning,
}

/// Lexical search scorer. Construct once and reuse; all regexes are compiled
/// up front.
pub struct SearchScorer {
    word_re: Regex,
    quoted_re: Regex,
    entity_patterns: Vec<(&'static str, Regex)>,
    synonyms: HashMap<&'static str, &'static [&'static str]>,
    stop_words: HashSet<&'static str>,
    default_weights: HashMap<String, f64>,
}

impl Default for SearchScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchScorer {
    pub fn new() -> Self {
        let entity_patterns = vec![
            ("email", Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()),
            (
                "phone",
                Regex::new(r"\b(?:\+?1[-.]?)?\(?[0-9]{3}\)?[-.]?[0-9]{3}[-.]?[0-9]{4}\b").unwrap(),
            ),
            (
                "date",
                Regex::new(r"\b\d{4}[-/]\d{1,2}[-/]\d{1,2}\b|\b\d{1,2}[-/]\d{1,2}[-/]\d{4}\b")
                    .unwrap(),
            ),
            ("url", Regex::new(r"https?://\S+").unwrap()),
            ("mention", Regex::new(r"@[A-Za-z0-9_]+").unwrap()),
            ("hashtag", Regex::new(r"#[A-Za-z0-9_]+").unwrap()),
            ("number", Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap()),
            (
                "currency",
                Regex::new(r"\$\d+(?:,\d{3})*(?:\.\d{2})?|\b\d+(?:,\d{3})*(?:\.\d{2})?\s*(?:USD|EUR|GBP)\b")
                    .unwrap(),
            ),
        ];

        Self {
            word_re: Regex::new(r"[A-Za-z0-9]+").unwrap(),
            quoted_re: Regex::new(r#""([^"]+)""#).unwrap(),
            entity_patterns,
            synonyms: SYNONYMS.iter().copied().collect(),
            stop_words: STOP_WORDS.iter().copied().collect(),
            default_weights: DEFAULT_FIELD_WEIGHTS
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    /// Score `records` against `query_text`, returning hits above
    /// `config.min_score` sorted by descending score, capped at
    /// `config.max_results`.
    pub fn search(&self, query_text: &str, records: &[Value], config: &SearchConfig) -> Vec<SearchHit> {
        if query_text.trim().is_empty() || records.is_empty() {
            return Vec::new();
        }

        let parsed = self.parse(query_text, config);
        debug!(tokens = parsed.tokens.len(), phrases = parsed.phrases.len(), "parsed search query");

        let weights = if config.field_weights.is_empty() {
            &self.default_weights
        } else {
            &config.field_weights
        };
        let max_weight = weights.values().copied().fold(1.0_f64, f64::max);

        let mut hits: Vec<SearchHit> = records
            .iter()
            .filter_map(|record| {
                let (score, explanation, highlights) =
                    self.score_record(record, &parsed, config, weights, max_weight);
                if score < config.min_score || score == 0.0 {
                    return None;
                }
                let database = record
                    .get("_database")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Some(SearchHit {
                    record: record.clone(),
                    score,
                    database,
                    highlights,
                    explanation,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(config.max_results);
        hits
    }

    /// Relevance of a single record, without the result assembly.
    pub fn relevance(&self, record: &Value, query_text: &str, config: &SearchConfig) -> f64 {
        let parsed = self.parse(query_text, config);
        let weights = if config.field_weights.is_empty() {
            &self.default_weights
        } else {
            &config.field_weights
        };
        let max_weight = weights.values().copied().fold(1.0_f64, f64::max);
        self.score_record(record, &parsed, config, weights, max_weight).0
    }

    fn parse(&self, query_text: &str, config: &SearchConfig) -> ParsedSearch {
        let normalized = if config.case_sensitive {
            query_text.to_string()
        } else {
            query_text.to_lowercase()
        };

        let tokens = self.tokenize(&normalized, config);
        let mut expanded: HashSet<String> = tokens.iter().cloned().collect();
        if config.mode == SearchMode::Semantic {
            for token in &tokens {
                if let Some(extra) = self.synonyms.get(token.as_str()) {
                    expanded.extend(extra.iter().map(|s| s.to_string()));
                }
            }
        }

        let quoted = self
            .quoted_re
            .captures_iter(query_text)
            .map(|c| c[1].to_string())
            .collect();

        let phrases = self.word_ngrams(&normalized);

        let mut entities = Vec::new();
        for (kind, pattern) in &self.entity_patterns {
            for m in pattern.find_iter(query_text) {
                entities.push((kind.to_string(), m.as_str().to_string()));
            }
        }

        let leaning = self.classify(&normalized, &tokens, &entities);

        ParsedSearch {
            tokens,
            expanded,
            quoted,
            phrases,
            entities,
            leaning,
        }
    }

    fn tokenize(&self, text: &str, config: &SearchConfig) -> Vec<String> {
        let all: Vec<String> = self
            .word_re
            .find_iter(text)
            .map(|m| {
                if config.case_sensitive {
                    m.as_str().to_string()
                } else {
                    m.as_str().to_lowercase()
                }
            })
            .collect();
        if !config.strip_stop_words {
            return all;
        }
        let kept: Vec<String> = all
            .iter()
            .filter(|t| !self.stop_words.contains(t.as_str()))
            .cloned()
            .collect();
        // A query made entirely of stop words still has to match something.
        if kept.is_empty() {
            all
        } else {
            kept
        }
    }

    /// Word bigrams and trigrams, skipping grams made only of stop words.
    fn word_ngrams(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut phrases = Vec::new();
        for n in [2usize, 3] {
            if words.len() < n {
                continue;
            }
            for window in words.windows(n) {
                if window.iter().all(|w| self.stop_words.contains(w)) {
                    continue;
                }
                phrases.push(window.join(" "));
            }
        }
        phrases
    }

    fn classify(&self, query: &str, tokens: &[String], entities: &[(String, String)]) -> QueryLeaning {
        let has = |kind: &str| entities.iter().any(|(k, _)| k == kind);
        let token_in = |set: &[&str]| tokens.iter().any(|t| set.contains(&t.as_str()));

        if has("email") || has("mention") || token_in(&["person", "contact", "user", "who"]) {
            QueryLeaning::Person
        } else if token_in(&["task", "todo", "action"]) {
            QueryLeaning::Task
        } else if token_in(&["document", "file", "report", "evidence"]) {
            QueryLeaning::Document
        } else if has("date") || query.contains("dated") {
            QueryLeaning::DateBound
        } else {
            QueryLeaning::General
        }
    }

    fn score_record(
        &self,
        record: &Value,
        parsed: &ParsedSearch,
        config: &SearchConfig,
        weights: &HashMap<String, f64>,
        max_weight: f64,
    ) -> (f64, String, HashMap<String, Vec<String>>) {
        let mut total = 0.0_f64;
        let mut explanations: Vec<String> = Vec::new();
        let mut highlights: HashMap<String, Vec<String>> = HashMap::new();

        let fields = flatten(record);
        for (path, text) in &fields {
            if text.is_empty() {
                continue;
            }
            let weight = field_weight(weights, path);
            let text_cmp = if config.case_sensitive {
                text.clone()
            } else {
                text.to_lowercase()
            };

            // 1. Exact quoted phrases.
            for quoted in &parsed.quoted {
                let needle = if config.case_sensitive {
                    quoted.clone()
                } else {
                    quoted.to_lowercase()
                };
                if text_cmp.contains(&needle) {
                    total += 5.0 * weight;
                    explanations.push(format!("exact match for \"{quoted}\""));
                    push_highlight(&mut highlights, path, quoted.clone());
                }
            }

            // 2 + 3. Token overlap, position-discounted; synonyms at 0.8x.
            let field_tokens = self.tokenize(&text_cmp, config);
            let mut matched: HashSet<String> = HashSet::new();
            for (pos, token) in field_tokens.iter().enumerate() {
                let discount = 1.0 / (1.0 + 0.1 * pos as f64);
                if parsed.tokens.contains(token) {
                    total += weight * discount;
                    matched.insert(token.clone());
                } else if parsed.expanded.contains(token) {
                    total += weight * discount * 0.8;
                    matched.insert(token.clone());
                }
            }

            // Phonetic token equality.
            if config.mode == SearchMode::Phonetic || config.mode == SearchMode::Semantic {
                for query_token in &parsed.tokens {
                    let code = FuzzyMatcher::soundex(query_token);
                    if code.is_empty() {
                        continue;
                    }
                    for field_token in &field_tokens {
                        if !matched.contains(field_token) && FuzzyMatcher::soundex(field_token) == code {
                            total += weight * 0.6;
                            matched.insert(field_token.clone());
                        }
                    }
                }
            }

            // 4. Fuzzy token pairs.
            if matches!(config.mode, SearchMode::Fuzzy | SearchMode::Phonetic | SearchMode::Semantic) {
                for query_token in &parsed.tokens {
                    let mut best: Option<(&String, f64)> = None;
                    for field_token in &field_tokens {
                        if matched.contains(field_token) {
                            continue;
                        }
                        let sim = FuzzyMatcher::combined_similarity(query_token, field_token);
                        if sim >= config.fuzzy_threshold && best.map_or(true, |(_, s)| sim > s) {
                            best = Some((field_token, sim));
                        }
                    }
                    if let Some((field_token, sim)) = best {
                        total += weight * sim * 0.7;
                        matched.insert(field_token.clone());
                        push_highlight(&mut highlights, path, field_token.clone());
                    }
                }
            }

            // 5. Word n-gram phrases.
            for phrase in &parsed.phrases {
                if text_cmp.contains(phrase.as_str()) {
                    total += weight * 2.0;
                    push_highlight(&mut highlights, path, phrase.clone());
                }
            }

            // 6. Entity patterns from the query found in the field.
            for (kind, entity) in &parsed.entities {
                let needle = entity.to_lowercase();
                let hay = text.to_lowercase();
                let hit = if matches!(kind.as_str(), "email" | "phone" | "url") {
                    hay == needle
                } else {
                    hay.contains(&needle)
                };
                if hit {
                    total += 3.0;
                    explanations.push(format!("contains {kind}: {entity}"));
                }
            }

            // Highlight snippets for plain token matches.
            if !matched.is_empty() {
                for snippet in make_snippets(text, &matched, config.context_chars) {
                    push_highlight(&mut highlights, path, snippet);
                }
            }
        }

        // 7. Intent bonus, capped at 3.
        if config.mode == SearchMode::Semantic {
            let bonus = self.intent_bonus(record, parsed.leaning, &fields);
            if bonus > 0.0 {
                total += bonus;
                explanations.push("intent match".to_string());
            }
        }

        let max_possible = (parsed.tokens.len().max(1) as f64) * max_weight * 5.0;
        let score = (total / max_possible).clamp(0.0, 1.0);

        let explanation = if explanations.is_empty() {
            format!("matched {} tokens", parsed.tokens.len())
        } else {
            explanations.join("; ")
        };
        (score, explanation, highlights)
    }

    fn intent_bonus(&self, record: &Value, leaning: QueryLeaning, fields: &[(String, String)]) -> f64 {
        let database = record.get("_database").and_then(Value::as_str).unwrap_or("");
        let has_field = |fragment: &str| {
            fields
                .iter()
                .any(|(path, _)| path.to_lowercase().contains(fragment))
        };

        let mut bonus = 0.0_f64;
        match leaning {
            QueryLeaning::Person => {
                if database == "People & Contacts" {
                    bonus += 3.0;
                } else if has_field("name") || has_field("email") || has_field("contact") {
                    bonus += 2.0;
                }
            }
            QueryLeaning::Task => {
                if database == "Actionable Tasks" {
                    bonus += 3.0;
                } else if has_field("task") || has_field("status") {
                    bonus += 2.0;
                }
            }
            QueryLeaning::Document => {
                if database == "Documents & Evidence" {
                    bonus += 3.0;
                } else if has_field("document") || has_field("content") {
                    bonus += 2.0;
                }
            }
            QueryLeaning::DateBound => {
                if let Some((_, date_re)) = self.entity_patterns.iter().find(|(k, _)| *k == "date") {
                    if fields.iter().any(|(_, text)| date_re.is_match(text)) {
                        bonus += 1.5;
                    }
                }
            }
            QueryLeaning::General => {}
        }
        bonus.min(3.0)
    }

    /// Complete-query suggestions from a partial input, drawn from record
    /// text. Samples at most 1000 records.
    pub fn suggestions(&self, partial: &str, records: &[Value], max: usize) -> Vec<String> {
        if partial.trim().len() < 2 {
            return Vec::new();
        }
        let needle = partial.to_lowercase();
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for record in records.iter().take(1000) {
            for (_, text) in flatten(record) {
                if !text.to_lowercase().contains(&needle) {
                    continue;
                }
                let words: Vec<&str> = text.split_whitespace().collect();
                for (i, word) in words.iter().enumerate() {
                    if !word.to_lowercase().contains(&needle) {
                        continue;
                    }
                    let start = i.saturating_sub(1);
                    let end = (i + 3).min(words.len());
                    let suggestion = words[start..end].join(" ");
                    if suggestion.len() < 100 && seen.insert(suggestion.clone()) {
                        out.push(suggestion);
                        if out.len() >= max {
                            return out;
                        }
                    }
                }
            }
        }
        out
    }
}

/// Weight for a field path: exact key, else the longest configured key that
/// is a dot-boundary prefix of the path, else 1.0.
fn field_weight(weights: &HashMap<String, f64>, path: &str) -> f64 {
    if let Some(w) = weights.get(path) {
        return *w;
    }
    let mut best: Option<(usize, f64)> = None;
    for (key, w) in weights {
        if path.starts_with(key.as_str()) && path.as_bytes().get(key.len()) == Some(&b'.') {
            if best.map_or(true, |(len, _)| key.len() > len) {
                best = Some((key.len(), *w));
            }
        }
    }
    best.map(|(_, w)| w).unwrap_or(1.0)
}

/// Flatten a record into `(dot.path, text)` pairs. Scalar array items are
/// joined with spaces under the array's path; object items recurse under the
/// same path.
fn flatten(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into(value, String::new(), &mut out);
    out
}

fn flatten_into(value: &Value, path: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                flatten_into(child, child_path, out);
            }
        }
        Value::Array(items) => {
            let scalars: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect();
            if !scalars.is_empty() {
                out.push((path.clone(), scalars.join(" ")));
            }
            for item in items {
                if item.is_object() {
                    flatten_into(item, path.clone(), out);
                }
            }
        }
        Value::String(s) => out.push((path, s.clone())),
        Value::Number(n) => out.push((path, n.to_string())),
        Value::Bool(b) => out.push((path, b.to_string())),
        Value::Null => {}
    }
}

fn push_highlight(highlights: &mut HashMap<String, Vec<String>>, path: &str, snippet: String) {
    let entry = highlights.entry(path.to_string()).or_default();
    if entry.len() < 3 && !entry.contains(&snippet) {
        entry.push(snippet);
    }
}

/// Up to 3 snippets of at most `2 * context_chars` around the first
/// occurrence of each matched token, trimmed to word boundaries and
/// ellipsis-padded.
fn make_snippets(text: &str, matched: &HashSet<String>, context_chars: usize) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut snippets = Vec::new();

    for token in matched {
        if snippets.len() >= 3 {
            break;
        }
        let Some(pos) = lower.find(&token.to_lowercase()) else {
            continue;
        };
        // Case folding can shift byte offsets for non-ASCII text; skip
        // rather than slice off a char boundary.
        if pos + token.len() > text.len() || !text.is_char_boundary(pos) {
            continue;
        }
        let mut start = pos.saturating_sub(context_chars);
        let mut end = (pos + token.len() + context_chars).min(text.len());

        // Clamp to char boundaries, then extend inward to word boundaries.
        while start > 0 && !text.is_char_boundary(start) {
            start -= 1;
        }
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }
        if start > 0 {
            if let Some(offset) = text[start..pos].find(char::is_whitespace) {
                start += offset + 1;
            }
        }
        if end < text.len() {
            if let Some(offset) = text[pos..end].rfind(char::is_whitespace) {
                end = pos + offset;
            }
        }
        if end <= start {
            continue;
        }

        let mut snippet = text[start..end].trim().to_string();
        if snippet.is_empty() {
            continue;
        }
        if start > 0 {
            snippet = format!("...{snippet}");
        }
        if end < text.len() {
            snippet = format!("{snippet}...");
        }
        snippets.push(snippet);
    }
    snippets
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<Value> {
        vec![
            json!({
                "id": "p1",
                "_database": "People & Contacts",
                "name": "Alice Johnson",
                "description": "Senior analyst covering maritime traffic"
            }),
            json!({
                "id": "p2",
                "_database": "People & Contacts",
                "name": "Bob",
                "description": "Logistics coordinator"
            }),
            json!({
                "id": "t1",
                "_database": "Actionable Tasks",
                "title": "Review harbor reports",
                "status": "open"
            }),
        ]
    }

    #[test]
    fn token_match_ranks_relevant_record_first() {
        let scorer = SearchScorer::new();
        let hits = scorer.search("alice johnson", &records(), &SearchConfig::default());
        assert!(!hits.is_empty());
        assert_eq!(hits[0].record["id"], json!("p1"));
        assert!(hits[0].score > 0.0 && hits[0].score <= 1.0);
    }

    #[test]
    fn fuzzy_mode_tolerates_misspellings() {
        let scorer = SearchScorer::new();
        let config = SearchConfig {
            mode: SearchMode::Fuzzy,
            min_score: 0.05,
            ..SearchConfig::default()
        };
        let hits = scorer.search("Alise Jonson", &records(), &config);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].record["id"], json!("p1"));
        assert!(!hits.iter().any(|h| h.record["id"] == json!("p2")));
    }

    #[test]
    fn quoted_phrases_score_highest() {
        let scorer = SearchScorer::new();
        let hits = scorer.search(
            "\"harbor reports\"",
            &records(),
            &SearchConfig {
                min_score: 0.01,
                ..SearchConfig::default()
            },
        );
        assert_eq!(hits[0].record["id"], json!("t1"));
        assert!(hits[0].explanation.contains("exact match"));
    }

    #[test]
    fn min_score_filters_weak_hits() {
        let scorer = SearchScorer::new();
        let config = SearchConfig {
            min_score: 0.99,
            ..SearchConfig::default()
        };
        let hits = scorer.search("alice", &records(), &config);
        assert!(hits.is_empty());
    }

    #[test]
    fn max_results_caps_output() {
        let scorer = SearchScorer::new();
        let config = SearchConfig {
            max_results: 1,
            min_score: 0.0,
            ..SearchConfig::default()
        };
        let hits = scorer.search("analyst coordinator reports", &records(), &config);
        assert!(hits.len() <= 1);
    }

    #[test]
    fn stop_word_only_query_keeps_tokens() {
        let scorer = SearchScorer::new();
        let config = SearchConfig::default();
        let tokens = scorer.tokenize("the of and", &config);
        assert_eq!(tokens, vec!["the", "of", "and"]);
    }

    #[test]
    fn highlights_are_word_bounded_and_capped() {
        let scorer = SearchScorer::new();
        let hits = scorer.search("maritime", &records(), &SearchConfig::default());
        let hit = &hits[0];
        let snippets = hit.highlights.get("description").unwrap();
        assert!(!snippets.is_empty() && snippets.len() <= 3);
        assert!(snippets[0].contains("maritime"));
    }

    #[test]
    fn entity_pattern_boosts_email_match() {
        let scorer = SearchScorer::new();
        let data = vec![json!({"id": "x", "email": "alice@example.com"})];
        let hits = scorer.search("alice@example.com", &data, &SearchConfig::default());
        assert!(!hits.is_empty());
        assert!(hits[0].explanation.contains("email"));
    }

    #[test]
    fn suggestions_surface_surrounding_words() {
        let scorer = SearchScorer::new();
        let out = scorer.suggestions("mari", &records(), 5);
        assert!(out.iter().any(|s| s.contains("maritime")));
        assert!(scorer.suggestions("m", &records(), 5).is_empty());
    }

    #[test]
    fn flatten_handles_typed_cells() {
        let record = json!({
            "properties": {
                "Name": {"title": [{"plain_text": "Alice"}]},
                "Tags": {"multi_select": [{"name": "vip"}]}
            }
        });
        let fields = flatten(&record);
        assert!(fields
            .iter()
            .any(|(path, text)| path.starts_with("properties.Name") && text == "Alice"));
    }
}
