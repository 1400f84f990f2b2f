// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// One word-level tokenizer per language, saved as
// `tokenizer_<lang>.json` next to the checkpoints so training
// and translation always share the same vocabulary.
//
// In tokenizers 0.15, train_from_files requires Trainer::Model
// to equal ModelWrapper. Instead we count words ourselves and
// write the tokenizer JSON directly, then load it back.
//
// Fixed special ids:
//   [PAD] = 0   [UNK] = 1   [SOS] = 2   [EOS] = 3
//
// Words are split the way the Whitespace pre-tokenizer splits
// them (runs of word characters, runs of punctuation) so every
// counted word is reachable at encode time.

use anyhow::{anyhow, Context, Result};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::domain::tokens::SpecialTokens;

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const SOS_TOKEN: &str = "[SOS]";
pub const EOS_TOKEN: &str = "[EOS]";

const SPECIALS: [&str; 4] = [PAD_TOKEN, UNK_TOKEN, SOS_TOKEN, EOS_TOKEN];

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path_for(&self, lang: &str) -> PathBuf {
        self.dir.join(format!("tokenizer_{lang}.json"))
    }

    /// Load the tokenizer for `lang`, or build it from `texts`.
    pub fn load_or_build(
        &self,
        lang:          &str,
        texts:         &[String],
        vocab_size:    usize,
        min_frequency: usize,
    ) -> Result<Tokenizer> {
        if self.path_for(lang).exists() {
            tracing::info!("Loading existing '{}' tokenizer from disk", lang);
            self.load(lang)
        } else {
            tracing::info!("Building new '{}' tokenizer (vocab_size={})", lang, vocab_size);
            self.build_and_save(lang, texts, vocab_size, min_frequency)
        }
    }

    pub fn load(&self, lang: &str) -> Result<Tokenizer> {
        let path = self.path_for(lang);
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    fn build_and_save(
        &self,
        lang:          &str,
        texts:         &[String],
        vocab_size:    usize,
        min_frequency: usize,
    ) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create tokenizer directory '{}'", self.dir.display()))?;

        // ── Step 1: Count words ───────────────────────────────────────────────
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for word in split_words(text) {
                *freq.entry(word.to_string()).or_insert(0) += 1;
            }
        }

        // Most frequent first; ties alphabetical so rebuilds are stable
        let mut words: Vec<(String, usize)> = freq
            .into_iter()
            .filter(|(w, count)| *count >= min_frequency && !SPECIALS.contains(&w.as_str()))
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size.saturating_sub(SPECIALS.len()));

        // ── Step 2: Vocabulary ────────────────────────────────────────────────
        let mut vocab = serde_json::Map::new();
        for (id, token) in SPECIALS.iter().enumerate() {
            vocab.insert(token.to_string(), serde_json::json!(id));
        }
        for (offset, (word, _)) in words.iter().enumerate() {
            vocab.insert(word.clone(), serde_json::json!(SPECIALS.len() + offset));
        }
        let vocab_len = vocab.len();

        // ── Step 3: Tokenizer JSON in HuggingFace format ──────────────────────
        let added_tokens: Vec<_> = SPECIALS
            .iter()
            .enumerate()
            .map(|(id, token)| serde_json::json!({
                "id": id, "content": token, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            }))
            .collect();

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": {
                "type": "BertNormalizer",
                "clean_text": true,
                "handle_chinese_chars": true,
                "strip_accents": null,
                "lowercase": false
            },
            "pre_tokenizer": {
                "type": "Whitespace"
            },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let tok_path = self.path_for(lang);
        std::fs::write(&tok_path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write tokenizer JSON to '{}'", tok_path.display()))?;

        tracing::info!(
            "'{}' tokenizer built with {} tokens, saved to '{}'",
            lang,
            vocab_len,
            tok_path.display()
        );

        Tokenizer::from_file(&tok_path)
            .map_err(|e| anyhow!("Cannot reload tokenizer: {e}"))
    }
}

/// Runs of word characters and runs of punctuation, like the
/// `Whitespace` pre-tokenizer (`\w+|[^\w\s]+`).
fn split_words(text: &str) -> Vec<&str> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';

    let mut words = Vec::new();
    let mut start: Option<(usize, bool)> = None;

    for (i, c) in text.char_indices() {
        let class = (!c.is_whitespace()).then(|| is_word(c));
        if let Some((s, kind)) = start {
            if class == Some(kind) {
                continue;
            }
            words.push(&text[s..i]);
        }
        start = class.map(|k| (i, k));
    }
    if let Some((s, _)) = start {
        words.push(&text[s..]);
    }
    words
}

/// Ids of [PAD], [SOS] and [EOS] in `tokenizer`.
pub fn special_tokens(tokenizer: &Tokenizer) -> Result<SpecialTokens> {
    let id = |token: &str| {
        tokenizer
            .token_to_id(token)
            .ok_or_else(|| anyhow!("Tokenizer has no '{token}' token"))
    };
    Ok(SpecialTokens::new(id(PAD_TOKEN)?, id(SOS_TOKEN)?, id(EOS_TOKEN)?))
}

/// Token ids of `text` without any special tokens added.
pub fn encode_ids(tokenizer: &Tokenizer, text: &str) -> Result<Vec<u32>> {
    let encoding = tokenizer
        .encode(text, false)
        .map_err(|e| anyhow!("Tokenisation failed: {e}"))?;
    Ok(encoding.get_ids().to_vec())
}

/// Text of `ids` with special tokens skipped.
pub fn decode_ids(tokenizer: &Tokenizer, ids: &[u32]) -> Result<String> {
    tokenizer
        .decode(ids, true)
        .map_err(|e| anyhow!("Detokenisation failed: {e}"))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn corpus() -> Vec<String> {
        vec![
            "the cat sat .".to_string(),
            "the dog sat !".to_string(),
            "the cat ran".to_string(),
        ]
    }

    #[test]
    fn test_split_words_like_whitespace_pre_tokenizer() {
        assert_eq!(split_words("Hello, world!!  it's"), vec!["Hello", ",", "world", "!!", "it", "'", "s"]);
        assert!(split_words("   ").is_empty());
    }

    #[test]
    fn test_special_ids_are_fixed() {
        let dir       = TempDir::new().unwrap();
        let tokenizer = TokenizerStore::new(dir.path()).load_or_build("en", &corpus(), 100, 1).unwrap();

        let tokens = special_tokens(&tokenizer).unwrap();
        assert_eq!(tokens, SpecialTokens::new(0, 2, 3));
        assert_eq!(tokenizer.token_to_id(UNK_TOKEN), Some(1));
    }

    #[test]
    fn test_vocab_respects_size_and_frequency() {
        let dir       = TempDir::new().unwrap();
        let tokenizer = TokenizerStore::new(dir.path()).load_or_build("en", &corpus(), 6, 2).unwrap();

        // specials + "the" (3) + "cat"/"sat" (2 each) → capped at 6
        assert_eq!(tokenizer.get_vocab_size(true), 6);
        assert_eq!(tokenizer.token_to_id("the"), Some(4));
        assert_eq!(tokenizer.token_to_id("cat"), Some(5));
        assert_eq!(tokenizer.token_to_id("dog"), None);
    }

    #[test]
    fn test_encode_decode_and_reload() {
        let dir   = TempDir::new().unwrap();
        let store = TokenizerStore::new(dir.path());
        let built = store.load_or_build("vi", &corpus(), 100, 1).unwrap();
        assert!(store.path_for("vi").exists());

        let ids = encode_ids(&built, "the dog ran").unwrap();
        assert_eq!(ids.len(), 3);
        assert!(!ids.contains(&1));

        // unknown words map to [UNK]
        let unk = encode_ids(&built, "zebra").unwrap();
        assert_eq!(unk, vec![1]);

        let reloaded = store.load_or_build("vi", &[], 100, 1).unwrap();
        assert_eq!(decode_ids(&reloaded, &ids).unwrap(), "the dog ran");
    }
}
