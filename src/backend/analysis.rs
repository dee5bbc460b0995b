//! Text analysis for the in-memory backend.
//!
//! Splits on Unicode word boundaries (UAX #29) and lowercases, which is what
//! the default `standard` analyzer of a Lucene based engine does for most
//! western text.

use unicode_segmentation::UnicodeSegmentation;

/// Standard analyzer: Unicode word segmentation followed by lowercasing.
#[derive(Clone, Debug)]
pub struct StandardAnalyzer {
    /// Tokens longer than this many characters are dropped.
    max_token_length: Option<usize>,
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardAnalyzer {
    pub fn new() -> Self {
        StandardAnalyzer {
            max_token_length: Some(255),
        }
    }

    pub fn with_max_token_length(mut self, max: usize) -> Self {
        self.max_token_length = Some(max);
        self
    }

    /// Analyze `text` into a list of terms, in order.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .filter(|word| match self.max_token_length {
                Some(max) => word.chars().count() <= max,
                None => true,
            })
            .map(str::to_lowercase)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze() {
        let analyzer = StandardAnalyzer::new();
        assert_eq!(
            analyzer.analyze("The Matrix: Reloaded!"),
            vec!["the", "matrix", "reloaded"]
        );
    }

    #[test]
    fn test_unicode_words() {
        let analyzer = StandardAnalyzer::new();
        assert_eq!(analyzer.analyze("Amélie, café"), vec!["amélie", "café"]);
    }

    #[test]
    fn test_max_token_length() {
        let analyzer = StandardAnalyzer::new().with_max_token_length(3);
        assert_eq!(analyzer.analyze("one three two"), vec!["one", "two"]);
    }
}
