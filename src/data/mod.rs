// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from raw parallel text files to tensor batches.
//
//   train.en / train.vi
//       │
//       ▼
//   ParallelCorpusLoader → reads both sides, pairs lines
//       │
//       ▼
//   Preprocessor         → normalises whitespace / entities
//       │
//       ▼
//   Tokenizer (Layer 6)  → words to token ids
//       │
//       ▼
//   TranslationSample    → [SOS]/[EOS]/[PAD] framing, teacher forcing
//       │
//       ▼
//   TranslationDataset   → Burn Dataset
//       │
//       ▼
//   TranslationBatcher   → [batch, seq_length] Int tensors
//       │
//       ▼
//   DataLoader           → BatchSource consumed by the trainer
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads line-aligned parallel text files
pub mod loader;

/// Normalises raw corpus lines
pub mod preprocessor;

/// Fixed-length translation samples and the Burn Dataset over them
pub mod dataset;

/// Burn Batcher producing translation batches
pub mod batcher;

/// Seeded train/validation split
pub mod splitter;
