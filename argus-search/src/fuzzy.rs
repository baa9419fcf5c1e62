//! Approximate string matching.
//!
//! Levenshtein and Jaro-Winkler come from `strsim`; Soundex codes and
//! character n-gram overlap are implemented here. The combined score is the
//! arithmetic mean of the four signals, which tolerates both typos
//! (edit-distance family) and sound-alike spellings.

use std::collections::HashSet;

/// Soundex consonant classes, applied after the first letter.
fn soundex_digit(c: char) -> Option<char> {
    match c {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}

/// Stateless fuzzy matching toolkit.
#[derive(Debug, Default)]
pub struct FuzzyMatcher;

impl FuzzyMatcher {
    /// Normalized Levenshtein similarity in [0, 1].
    pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        strsim::normalized_levenshtein(a, b)
    }

    /// Jaro-Winkler similarity in [0, 1], prefix-boosted.
    pub fn jaro_winkler_similarity(a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(a, b)
    }

    /// Four-character Soundex code of a word. Non-alphabetic characters are
    /// ignored; an empty input yields an empty code.
    pub fn soundex(word: &str) -> String {
        let letters: Vec<char> = word
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let Some(&first) = letters.first() else {
            return String::new();
        };

        let mut code = String::new();
        code.push(first);
        let mut last_digit = soundex_digit(first);
        for &c in &letters[1..] {
            if code.len() >= 4 {
                break;
            }
            let digit = soundex_digit(c);
            match digit {
                Some(d) if last_digit != Some(d) => code.push(d),
                _ => {}
            }
            // Vowels reset the run so repeated consonant classes separated by
            // a vowel encode twice.
            last_digit = digit;
        }
        while code.len() < 4 {
            code.push('0');
        }
        code
    }

    /// Jaccard overlap of character n-grams (default bigrams).
    pub fn ngram_similarity(a: &str, b: &str, n: usize) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        let grams_a = ngrams(a, n);
        let grams_b = ngrams(b, n);
        if grams_a.is_empty() || grams_b.is_empty() {
            return 0.0;
        }
        let intersection = grams_a.intersection(&grams_b).count();
        let union = grams_a.union(&grams_b).count();
        intersection as f64 / union as f64
    }

    /// Mean of Levenshtein, Jaro-Winkler, bigram and Soundex-equality
    /// signals. The go-to score for the `fuzzy` filter operator and the fuzzy
    /// token step of the search scorer.
    pub fn combined_similarity(a: &str, b: &str) -> f64 {
        let lev = Self::levenshtein_similarity(a, b);
        let jw = Self::jaro_winkler_similarity(a, b);
        let ngram = Self::ngram_similarity(a, b, 2);
        let phonetic = if !a.is_empty() && Self::soundex(a) == Self::soundex(b) {
            1.0
        } else {
            0.0
        };
        (lev + jw + ngram + phonetic) / 4.0
    }

    /// Best candidate at or above `threshold`, if any.
    pub fn best_match<'a>(
        query: &str,
        candidates: impl IntoIterator<Item = &'a str>,
        threshold: f64,
    ) -> Option<(&'a str, f64)> {
        let mut best: Option<(&'a str, f64)> = None;
        for candidate in candidates {
            let score = Self::combined_similarity(query, candidate);
            if score >= threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        best
    }
}

fn ngrams(text: &str, n: usize) -> HashSet<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < n {
        let mut set = HashSet::new();
        set.insert(text.to_string());
        return set;
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soundex_classic_examples() {
        assert_eq!(FuzzyMatcher::soundex("Robert"), "R163");
        assert_eq!(FuzzyMatcher::soundex("Rupert"), "R163");
        assert_eq!(FuzzyMatcher::soundex(""), "");
    }

    #[test]
    fn soundex_matches_sound_alikes() {
        assert_eq!(FuzzyMatcher::soundex("Smith"), FuzzyMatcher::soundex("Smyth"));
    }

    #[test]
    fn ngram_similarity_bounds() {
        assert_eq!(FuzzyMatcher::ngram_similarity("alice", "alice", 2), 1.0);
        assert_eq!(FuzzyMatcher::ngram_similarity("", "alice", 2), 0.0);
        let partial = FuzzyMatcher::ngram_similarity("alice", "alise", 2);
        assert!(partial > 0.3 && partial < 1.0);
    }

    #[test]
    fn combined_similarity_catches_typos() {
        let score = FuzzyMatcher::combined_similarity("johnson", "jonson");
        assert!(score > 0.7, "score was {score}");
        let unrelated = FuzzyMatcher::combined_similarity("johnson", "zebra");
        assert!(unrelated < 0.4, "score was {unrelated}");
    }

    #[test]
    fn best_match_respects_threshold() {
        let candidates = ["alice", "bob", "alise"];
        let hit = FuzzyMatcher::best_match("alice", candidates.iter().copied(), 0.7);
        assert_eq!(hit.map(|(c, _)| c), Some("alice"));
        assert!(FuzzyMatcher::best_match("qqq", candidates.iter().copied(), 0.9).is_none());
    }
}
