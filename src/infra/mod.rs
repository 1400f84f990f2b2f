// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on behalf of the
// other layers:
//
//   checkpoint.rs      — Versioned training checkpoints, one
//                        per epoch, with retention. Also
//                        saves/loads TrainConfig as JSON so
//                        translation can rebuild the model.
//
//   tokenizer_store.rs — Per-language word-level tokenizers.
//                        Built from the training corpus if
//                        none exists, loaded otherwise, so
//                        training and translation share one
//                        vocabulary.
//
//   metrics.rs         — MetricsSink implementations: a CSV
//                        file for real runs and an in-memory
//                        buffer.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Training checkpoint persistence
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Scalar metrics sinks
pub mod metrics;
