//! Keyword extraction
//!
//! Entries carry a keyword set extracted at creation; the scoring engine
//! compares it with the keywords of the turn's context. Hosts with a better
//! tokenizer plug in their own [`KeywordExtractor`].

use std::collections::{BTreeSet, HashSet};

/// Extracts a normalized keyword set from free text
pub trait KeywordExtractor: Send + Sync {
    fn extract(&self, text: &str) -> BTreeSet<String>;
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do",
    "does", "did", "will", "would", "could", "should", "may", "might", "must", "this", "that",
    "these", "those", "it", "its", "they", "them", "their", "we", "you", "your", "our", "i",
    "me", "my", "he", "she", "his", "her", "him", "not", "no", "yes", "what", "which", "who",
    "when", "where", "why", "how", "all", "each", "every", "both", "few", "more", "most",
    "other", "some", "such", "than", "too", "very", "just", "also", "only", "then", "there",
    "here", "now", "about", "into", "over", "after", "before", "between", "under", "again",
    "once", "during", "said", "says", "asked", "told",
];

/// Stop-word filtered, lowercased, deduplicated word extraction
#[derive(Debug, Clone)]
pub struct SimpleKeywordExtractor {
    stop_words: HashSet<&'static str>,
    min_word_length: usize,
    max_keywords: usize,
}

impl Default for SimpleKeywordExtractor {
    fn default() -> Self {
        Self::new(3, 24)
    }
}

impl SimpleKeywordExtractor {
    pub fn new(min_word_length: usize, max_keywords: usize) -> Self {
        Self {
            stop_words: STOP_WORDS.iter().copied().collect(),
            min_word_length,
            max_keywords,
        }
    }
}

impl KeywordExtractor for SimpleKeywordExtractor {
    fn extract(&self, text: &str) -> BTreeSet<String> {
        let mut seen = HashSet::new();
        text.split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|word| {
                word.chars().count() >= self.min_word_length
                    && !self.stop_words.contains(word.as_str())
                    && !word.chars().all(|c| c.is_ascii_digit())
                    && seen.insert(word.clone())
            })
            .take(self.max_keywords)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_significant_words() {
        let extractor = SimpleKeywordExtractor::default();
        let keywords = extractor.extract("The raiders set fire to the Kitchen during the night.");

        assert!(keywords.contains("raiders"));
        assert!(keywords.contains("fire"));
        assert!(keywords.contains("kitchen"));
        assert!(keywords.contains("night"));
        assert!(!keywords.contains("the"));
        assert!(!keywords.contains("during"));
    }

    #[test]
    fn test_removes_short_words_and_numbers() {
        let extractor = SimpleKeywordExtractor::default();
        let keywords = extractor.extract("I ate 42 figs at an inn");

        assert!(keywords.contains("ate"));
        assert!(keywords.contains("figs"));
        assert!(keywords.contains("inn"));
        assert!(!keywords.contains("42"));
        assert!(!keywords.contains("at"));
    }

    #[test]
    fn test_deduplicates_case_insensitively() {
        let extractor = SimpleKeywordExtractor::default();
        let keywords = extractor.extract("Fire fire FIRE");
        assert_eq!(keywords.len(), 1);
    }

    #[test]
    fn test_respects_max_keywords() {
        let extractor = SimpleKeywordExtractor::new(3, 2);
        let keywords = extractor.extract("alpha bravo charlie delta");
        assert_eq!(keywords.len(), 2);
    }
}
