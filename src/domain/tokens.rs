// ============================================================
// Layer 3 — Special Tokens
// ============================================================
// The three token ids every other layer needs to agree on:
//
//   [PAD] — fills sequences up to seq_length
//   [SOS] — first token of every decoder input / candidate
//   [EOS] — marks the end of a sentence
//
// The ids come from the target tokenizer (Layer 6) and are
// passed down explicitly; nothing hard-codes them.

use serde::{Deserialize, Serialize};

/// Token ids of the special markers of one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokens {
    pub pad: u32,
    pub sos: u32,
    pub eos: u32,
}

impl SpecialTokens {
    pub fn new(pad: u32, sos: u32, eos: u32) -> Self {
        Self { pad, sos, eos }
    }

    /// True for [PAD], [SOS] and [EOS]
    pub fn is_special(&self, id: u32) -> bool {
        id == self.pad || id == self.sos || id == self.eos
    }

    /// Copy of `ids` with every special token removed.
    /// Used before scoring a hypothesis against its reference.
    pub fn strip(&self, ids: &[u32]) -> Vec<u32> {
        ids.iter().copied().filter(|&id| !self.is_special(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_removes_markers_only() {
        let tokens = SpecialTokens::new(0, 2, 3);
        assert_eq!(tokens.strip(&[2, 7, 9, 3, 0, 0]), vec![7, 9]);
    }
}
