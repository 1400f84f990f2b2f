// ============================================================
// Layer 3 — SentencePair Domain Type
// ============================================================
// One line-aligned example of the parallel corpus: a sentence
// in the source language and its reference translation.
//
// By the time a SentencePair exists the text has already been
// read from disk; tokenisation happens later in Layer 4.
//
// Reference: Rust Book §5 (Structs and Methods)

use serde::{Deserialize, Serialize};

/// A source sentence together with its reference translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentencePair {
    /// Sentence in the source language (e.g. English)
    pub source: String,

    /// Reference translation in the target language (e.g. Vietnamese)
    pub target: String,
}

impl SentencePair {
    /// Create a new pair. Accepts &str or String for either side.
    ///
    /// Example:
    ///   let pair = SentencePair::new("Thank you", "Cảm ơn");
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// A pair is usable for training only if both sides have text.
    pub fn is_complete(&self) -> bool {
        !self.source.trim().is_empty() && !self.target.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_side_is_incomplete() {
        assert!(SentencePair::new("hello", "xin chào").is_complete());
        assert!(!SentencePair::new("hello", "   ").is_complete());
        assert!(!SentencePair::new("", "xin chào").is_complete());
    }
}
