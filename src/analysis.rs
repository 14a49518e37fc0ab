//! Term analysis for query building and indexing.
//!
//! An [`Analyzer`] turns the raw value of a rewritten query term (or of a
//! document field) into the normalized tokens that are looked up in the
//! index. The same analyzer must be used on both sides, otherwise document
//! frequencies are read for tokens that were never indexed.
//!
//! ```
//! use pilum::analysis::{Analyzer, StandardAnalyzer};
//!
//! let analyzer = StandardAnalyzer::new();
//! assert_eq!(analyzer.analyze("Wi-Fi Router").unwrap(), vec!["wi", "fi", "router"]);
//! ```

use std::fmt::Debug;

use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;

/// Trait for analyzers that convert text into normalized tokens.
pub trait Analyzer: Send + Sync + Debug {
    /// Analyze the given text into tokens, in order of occurrence.
    fn analyze(&self, text: &str) -> Result<Vec<String>>;

    /// Get the name of this analyzer.
    fn name(&self) -> &'static str;
}

/// Splits on Unicode word boundaries and lowercases every word.
#[derive(Debug, Clone, Default)]
pub struct StandardAnalyzer;

impl StandardAnalyzer {
    /// Create a new standard analyzer.
    pub fn new() -> Self {
        StandardAnalyzer
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<Vec<String>> {
        Ok(text.unicode_words().map(|w| w.to_lowercase()).collect())
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// Treats the whole (trimmed) input as a single token.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    /// Create a new keyword analyzer.
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Result<Vec<String>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![trimmed.to_string()])
        }
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_analyzer() {
        let analyzer = StandardAnalyzer::new();

        assert_eq!(
            analyzer.analyze("Notebook Sleeve, 13\"").unwrap(),
            vec!["notebook", "sleeve", "13"]
        );
        assert!(analyzer.analyze("  --  ").unwrap().is_empty());
        assert_eq!(analyzer.name(), "standard");
    }

    #[test]
    fn test_keyword_analyzer() {
        let analyzer = KeywordAnalyzer::new();

        assert_eq!(analyzer.analyze(" Laptop Bag ").unwrap(), vec!["Laptop Bag"]);
        assert!(analyzer.analyze("   ").unwrap().is_empty());
    }
}
