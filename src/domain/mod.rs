// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, traits and numeric helpers that define the
// core concepts of the translation trainer.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, traits and arithmetic
//
// What lives here:
//
//   sentence_pair.rs — one aligned (source, target) sentence
//   tokens.rs        — ids of the [PAD] / [SOS] / [EOS] tokens
//   stats.rs         — running loss / token accuracy accumulator
//   schedule.rs      — Noam learning-rate decay
//   bleu.rs          — corpus-level BLEU-1..4
//   traits.rs        — seams implemented by other layers
//
// Reference: Rust Book §5 (Structs), §10 (Traits)
//            Vaswani et al. (2017) Attention Is All You Need

/// An aligned source/target sentence pair
pub mod sentence_pair;

/// Special token ids shared by the data pipeline and the decoders
pub mod tokens;

/// Loss and accuracy accumulation over a stream of batches
pub mod stats;

/// Noam learning-rate schedule
pub mod schedule;

/// Corpus BLEU scoring
pub mod bleu;

/// Core abstractions (traits) that other layers implement
pub mod traits;
