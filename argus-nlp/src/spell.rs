//! Vocabulary-based spelling correction for query terms.
//!
//! The checker learns terms (and their frequencies) from record text and
//! corrects unknown query tokens to the closest known term. Ranking combines
//! normalized edit-distance similarity with how common the candidate is, so
//! frequent field values win over rare near-misses.

use std::collections::HashMap;

use tracing::debug;

/// Query-language words that must never be "corrected" into record terms,
/// or downstream intent and filter extraction would break.
const PROTECTED_WORDS: &[&str] = &[
    "find", "search", "show", "get", "list", "sort", "sorted", "order", "filter", "where",
    "count", "sum", "average", "total", "latest", "newest", "oldest", "earliest", "recent",
    "status", "type", "priority", "created", "updated", "modified", "after", "before",
    "between", "top", "first", "limit", "results", "with", "their", "and", "all", "any",
    "people", "person", "organizations", "organization", "tasks", "task", "documents",
    "document", "events", "event",
];

/// One proposed correction.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SpellCorrection {
    pub original: String,
    pub corrected: String,
    /// Similarity-based confidence in [0, 1].
    pub confidence: f64,
    /// Runner-up candidates with their confidences.
    pub alternatives: Vec<(String, f64)>,
}

/// Edit-distance spell checker over a learned vocabulary.
#[derive(Debug, Default)]
pub struct SpellChecker {
    terms: HashMap<String, u64>,
    /// Corrections below this similarity are suppressed.
    min_confidence: f64,
}

impl SpellChecker {
    pub fn new() -> Self {
        Self {
            terms: HashMap::new(),
            min_confidence: 0.75,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Add terms to the vocabulary. Terms shorter than 3 characters are
    /// ignored; repeated adds raise the term's frequency.
    pub fn learn<I, S>(&mut self, terms: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for term in terms {
            let term = term.as_ref().to_lowercase();
            if term.len() < 3 || !term.chars().all(|c| c.is_alphanumeric()) {
                continue;
            }
            *self.terms.entry(term).or_default() += 1;
        }
    }

    /// Split free text into words and learn each one.
    pub fn learn_text(&mut self, text: &str) {
        self.learn(text.split(|c: char| !c.is_alphanumeric()));
    }

    pub fn vocabulary_size(&self) -> usize {
        self.terms.len()
    }

    pub fn knows(&self, word: &str) -> bool {
        self.terms.contains_key(&word.to_lowercase())
    }

    /// Best correction for a single word, or `None` when the word is already
    /// known (or nothing similar enough exists).
    pub fn correct(&self, word: &str) -> Option<SpellCorrection> {
        let lower = word.to_lowercase();
        if lower.len() < 3
            || PROTECTED_WORDS.contains(&lower.as_str())
            || self.terms.contains_key(&lower)
        {
            return None;
        }

        let mut candidates: Vec<(String, f64)> = self
            .terms
            .iter()
            .filter(|(term, _)| term.len().abs_diff(lower.len()) <= 2)
            .filter_map(|(term, count)| {
                let similarity = strsim::normalized_levenshtein(&lower, term);
                if similarity < self.min_confidence {
                    return None;
                }
                // Frequent terms get a small edge, capped so similarity still
                // dominates.
                let frequency_boost = (*count as f64).ln_1p() * 0.01;
                Some((term.clone(), (similarity + frequency_boost).min(1.0)))
            })
            .collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let (corrected, confidence) = candidates[0].clone();
        let alternatives = candidates.into_iter().skip(1).take(3).collect();
        debug!(original = word, corrected = %corrected, confidence, "spelling correction");
        Some(SpellCorrection {
            original: word.to_string(),
            corrected,
            confidence,
            alternatives,
        })
    }

    /// Correct every unknown word in a query, returning the corrected text
    /// and the corrections applied. Quoted spans are left untouched.
    pub fn correct_query(&self, query: &str) -> (String, Vec<SpellCorrection>) {
        let mut corrections = Vec::new();
        let mut out = String::with_capacity(query.len());
        let mut in_quotes = false;

        for chunk in split_keeping_separators(query) {
            match chunk {
                Chunk::Word(word) if !in_quotes => match self.correct(word) {
                    Some(correction) => {
                        out.push_str(&correction.corrected);
                        corrections.push(correction);
                    }
                    None => out.push_str(word),
                },
                Chunk::Word(word) => out.push_str(word),
                Chunk::Separator(sep) => {
                    if sep.contains('"') {
                        in_quotes = !in_quotes;
                    }
                    out.push_str(sep);
                }
            }
        }
        (out, corrections)
    }
}

enum Chunk<'a> {
    Word(&'a str),
    Separator(&'a str),
}

fn split_keeping_separators(text: &str) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut word = text
        .chars()
        .next()
        .map(|c| c.is_alphanumeric())
        .unwrap_or(false);
    for (idx, c) in text.char_indices() {
        let is_word = c.is_alphanumeric();
        if is_word != word {
            let chunk = &text[start..idx];
            chunks.push(if word { Chunk::Word(chunk) } else { Chunk::Separator(chunk) });
            start = idx;
            word = is_word;
        }
    }
    if start < text.len() {
        let chunk = &text[start..];
        chunks.push(if word { Chunk::Word(chunk) } else { Chunk::Separator(chunk) });
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> SpellChecker {
        let mut checker = SpellChecker::new();
        checker.learn(["meeting", "meeting", "meeting", "taskforce", "harbor", "transcript"]);
        checker
    }

    #[test]
    fn known_words_pass_through() {
        let checker = checker();
        assert!(checker.knows("meeting"));
        assert!(checker.correct("meeting").is_none());
    }

    #[test]
    fn close_misspellings_are_corrected() {
        let checker = checker();
        let correction = checker.correct("meetng").unwrap();
        assert_eq!(correction.corrected, "meeting");
        assert!(correction.confidence > 0.75);
    }

    #[test]
    fn distant_words_are_left_alone() {
        let checker = checker();
        assert!(checker.correct("zzzzqqq").is_none());
    }

    #[test]
    fn query_correction_preserves_structure() {
        let checker = checker();
        let (corrected, fixes) = checker.correct_query("find the meetng about harbr");
        assert_eq!(corrected, "find the meeting about harbor");
        assert_eq!(fixes.len(), 2);
    }

    #[test]
    fn quoted_spans_are_untouched() {
        let checker = checker();
        let (corrected, fixes) = checker.correct_query("search \"meetng notes\" now");
        assert_eq!(corrected, "search \"meetng notes\" now");
        assert!(fixes.is_empty());
    }

    #[test]
    fn learning_from_text_builds_vocabulary() {
        let mut checker = SpellChecker::new();
        checker.learn_text("Quarterly harbor inspection transcript");
        assert!(checker.knows("harbor"));
        assert!(checker.knows("transcript"));
        assert!(!checker.knows("a"));
    }
}
