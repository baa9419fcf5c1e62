//! Query suggestions from history and intent templates.
//!
//! Two sources, merged and ranked: previously executed queries with a
//! matching prefix (weighted by recency and frequency), and template
//! completions for common intents ("find all ...", "show latest ...").

use std::collections::HashMap;

use parking_lot::Mutex;

const HISTORY_LIMIT: usize = 500;

const TEMPLATES: &[&str] = &[
    "find all people",
    "find all organizations",
    "find all tasks",
    "show latest documents",
    "show latest transcripts",
    "count tasks where status is open",
    "list people sorted by name",
    "find documents created after",
    "show people and their organizations",
];

/// A ranked query suggestion.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QuerySuggestion {
    pub text: String,
    /// Relative rank in [0, 1].
    pub score: f64,
    /// `history` or `template`.
    pub category: &'static str,
}

/// Suggests complete queries for a partial input.
#[derive(Debug, Default)]
pub struct QuerySuggester {
    history: Mutex<HashMap<String, u64>>,
}

impl QuerySuggester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an executed query so it can be suggested later. History is
    /// bounded; once full, the least-used entry makes room.
    pub fn record(&self, query: &str) {
        let normalized = query.trim().to_lowercase();
        if normalized.len() < 3 {
            return;
        }
        let mut history = self.history.lock();
        if history.len() >= HISTORY_LIMIT && !history.contains_key(&normalized) {
            if let Some(coldest) = history
                .iter()
                .min_by_key(|(_, count)| **count)
                .map(|(q, _)| q.clone())
            {
                history.remove(&coldest);
            }
        }
        *history.entry(normalized).or_default() += 1;
    }

    /// Suggestions for a partial query, best first.
    pub fn suggest(&self, partial: &str, max: usize) -> Vec<QuerySuggestion> {
        let needle = partial.trim().to_lowercase();
        if needle.len() < 2 {
            return Vec::new();
        }

        let mut suggestions: Vec<QuerySuggestion> = Vec::new();

        {
            let history = self.history.lock();
            let max_count = history.values().copied().max().unwrap_or(1).max(1);
            for (query, count) in history.iter() {
                if query.starts_with(&needle) && *query != needle {
                    suggestions.push(QuerySuggestion {
                        text: query.clone(),
                        score: 0.5 + 0.5 * (*count as f64 / max_count as f64),
                        category: "history",
                    });
                } else if query.contains(&needle) {
                    suggestions.push(QuerySuggestion {
                        text: query.clone(),
                        score: 0.3 + 0.3 * (*count as f64 / max_count as f64),
                        category: "history",
                    });
                }
            }
        }

        for template in TEMPLATES {
            if template.starts_with(&needle) || template.contains(&needle) {
                let score = if template.starts_with(&needle) { 0.4 } else { 0.2 };
                suggestions.push(QuerySuggestion {
                    text: template.to_string(),
                    score,
                    category: "template",
                });
            }
        }

        suggestions.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.text.cmp(&b.text)));
        suggestions.dedup_by(|a, b| a.text == b.text);
        suggestions.truncate(max);
        suggestions
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}
