// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between layers. Each trait is implemented by an
// outer layer and consumed by an inner one, so e.g. the
// trainer never knows whether metrics go to a CSV file or
// to an in-memory buffer.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Object Oriented Patterns)

use anyhow::Result;

use crate::domain::sentence_pair::SentencePair;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
/// Any component that can load aligned sentence pairs.
///
/// Implementations:
///   - ParallelCorpusLoader → two line-aligned text files
pub trait CorpusSource {
    /// Load every available pair from this source.
    fn load_pairs(&self) -> Result<Vec<SentencePair>>;
}

// ─── MetricsSink ──────────────────────────────────────────────────────────────
/// Scalar-logging sink used by the trainer and the stats accumulator.
///
/// Implementations:
///   - CsvMetricsSink → appends rows to metrics.csv
///   - MemorySink     → keeps every scalar in memory
pub trait MetricsSink {
    /// Record one scalar value under `name` at `step`.
    fn add_scalar(&mut self, name: &str, value: f64, step: usize) -> Result<()>;

    /// Record several related scalars (e.g. BLEU-1..4) at one step.
    fn add_scalars(&mut self, group: &str, values: &[(String, f64)], step: usize) -> Result<()>;

    /// Push buffered values to their destination.
    /// Called once per processed training batch.
    fn flush(&mut self) -> Result<()>;
}

// ─── BatchSource ──────────────────────────────────────────────────────────────
/// A re-iterable stream of batches.
///
/// The trainer walks the training stream once per epoch and the
/// validation stream once per evaluation, so a plain iterator is
/// not enough.
pub trait BatchSource<T> {
    /// Start a fresh pass over the stream.
    fn batches(&self) -> Box<dyn Iterator<Item = T> + '_>;
}

impl<T: Clone> BatchSource<T> for Vec<T> {
    fn batches(&self) -> Box<dyn Iterator<Item = T> + '_> {
        Box::new(self.iter().cloned())
    }
}

// ─── SentenceTranslator ───────────────────────────────────────────────────────
/// Any component that can translate a sentence.
///
/// Implementations:
///   - TranslateUseCase → tokenises, runs the decoder, detokenises
pub trait SentenceTranslator {
    /// Translate `sentence` from the source to the target language.
    fn translate(&self, sentence: &str) -> Result<String>;
}
