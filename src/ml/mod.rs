// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All tensor code lives here. Layers 1-4 and 6 only see plain
// Rust types (token ids, stats, checkpoint bytes).
//
//   model.rs      — the Seq2Seq contract and the encoder-decoder
//                   TranslationTransformer
//
//   decoding.rs   — teacher forcing, greedy search, beam search
//                   with length penalty
//
//   optimizer.rs  — adam / adamw behind one ModelOptimizer seam
//
//   scaling.rs    — global gradient norm, clipping, loss scaling
//                   for half-precision backends
//
//   evaluation.rs — validation loss/accuracy and corpus BLEU
//
//   trainer.rs    — the training loop with periodic validation
//                   and per-epoch checkpoints
//
//   translator.rs — loads a checkpoint and translates sentences
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need

/// Model contract and transformer architecture
pub mod model;

/// Greedy and beam search decoding
pub mod decoding;

/// Optimizer construction and state snapshots
pub mod optimizer;

/// Gradient clipping and loss scaling
pub mod scaling;

/// Evaluation pass and BLEU
pub mod evaluation;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Checkpoint-backed sentence translation
pub mod translator;
