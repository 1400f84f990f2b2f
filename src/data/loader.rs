// ============================================================
// Layer 4 — Parallel Corpus Loader
// ============================================================
// Loads a line-aligned parallel corpus from two plain text files:
//
//   data/
//     train.en     ← line i is the English sentence
//     train.vi     ← line i is its Vietnamese translation
//
// The file names are `<prefix>.<lang>`, so one loader per split
// ("train", "valid", "test") and language pair.
//
// Both files must have the same number of lines. Pairs where
// either side is blank after trimming are dropped.
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::{bail, Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::sentence_pair::SentencePair;
use crate::domain::traits::CorpusSource;

/// Loads `<dir>/<prefix>.<src_lang>` and `<dir>/<prefix>.<tgt_lang>`.
/// Implements the CorpusSource trait from Layer 3.
pub struct ParallelCorpusLoader {
    dir:      PathBuf,
    prefix:   String,
    src_lang: String,
    tgt_lang: String,
}

impl ParallelCorpusLoader {
    pub fn new(
        dir:      impl Into<PathBuf>,
        prefix:   impl Into<String>,
        src_lang: impl Into<String>,
        tgt_lang: impl Into<String>,
    ) -> Self {
        Self {
            dir:      dir.into(),
            prefix:   prefix.into(),
            src_lang: src_lang.into(),
            tgt_lang: tgt_lang.into(),
        }
    }

    /// Path of the file holding one side of the corpus
    pub fn side_path(&self, lang: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.prefix, lang))
    }

    /// True if both sides of this split exist on disk
    pub fn exists(&self) -> bool {
        self.side_path(&self.src_lang).is_file() && self.side_path(&self.tgt_lang).is_file()
    }
}

impl CorpusSource for ParallelCorpusLoader {
    fn load_pairs(&self) -> Result<Vec<SentencePair>> {
        let src_path = self.side_path(&self.src_lang);
        let tgt_path = self.side_path(&self.tgt_lang);

        let src_lines = read_lines(&src_path)?;
        let tgt_lines = read_lines(&tgt_path)?;

        if src_lines.len() != tgt_lines.len() {
            bail!(
                "Corpus sides are not aligned: '{}' has {} lines, '{}' has {}",
                src_path.display(), src_lines.len(),
                tgt_path.display(), tgt_lines.len(),
            );
        }

        let total = src_lines.len();
        let pairs: Vec<SentencePair> = src_lines
            .into_iter()
            .zip(tgt_lines)
            .map(|(src, tgt)| SentencePair::new(src, tgt))
            .filter(SentencePair::is_complete)
            .collect();

        if pairs.len() < total {
            tracing::warn!(
                "Dropped {} incomplete pairs from '{}'",
                total - pairs.len(),
                self.prefix,
            );
        }

        tracing::info!(
            "Loaded {} sentence pairs ({} → {}) from '{}'",
            pairs.len(), self.src_lang, self.tgt_lang, self.dir.display(),
        );
        Ok(pairs)
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read corpus file '{}'", path.display()))?;
    Ok(text.lines().map(str::to_string).collect())
}
