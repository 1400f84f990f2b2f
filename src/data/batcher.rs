// ============================================================
// Layer 4 — Translation Batcher
// ============================================================
// Implements Burn's Batcher trait to stack TranslationSamples
// into [batch_size, seq_length] Int tensors.
//
//   Input:  Vec of N samples, each row of length S
//   Output: TranslationBatch with three tensors of shape [N, S]
//
// All rows are pre-padded to seq_length by the dataset, so
// batching is a flatten + reshape.
//
// Also adapts a Burn DataLoader to the BatchSource seam the
// trainer consumes.
//
// Reference: Burn Book §4 (Batcher)

use std::sync::Arc;

use burn::{
    data::dataloader::{batcher::Batcher, DataLoader},
    prelude::*,
};

use crate::data::dataset::TranslationSample;
use crate::domain::traits::BatchSource;

// ─── TranslationBatch ─────────────────────────────────────────────────────────
/// A batch ready for the forward pass. All tensors are
/// [batch_size, seq_length].
#[derive(Debug, Clone)]
pub struct TranslationBatch<B: Backend> {
    pub encoder_input: Tensor<B, 2, Int>,
    pub decoder_input: Tensor<B, 2, Int>,
    pub labels:        Tensor<B, 2, Int>,
}

// ─── TranslationBatcher ───────────────────────────────────────────────────────
/// Holds the target device so tensors land on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct TranslationBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> TranslationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack(&self, rows: Vec<&[u32]>) -> Tensor<B, 2, Int> {
        let batch_size = rows.len();
        let seq_length = rows.first().map_or(0, |r| r.len());

        let flat: Vec<i32> = rows
            .iter()
            .flat_map(|row| row.iter().map(|&id| id as i32))
            .collect();

        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([batch_size, seq_length])
    }
}

impl<B: Backend> Batcher<TranslationSample, TranslationBatch<B>> for TranslationBatcher<B> {
    fn batch(&self, items: Vec<TranslationSample>) -> TranslationBatch<B> {
        let encoder_input = self.stack(items.iter().map(|s| s.encoder_input.as_slice()).collect());
        let decoder_input = self.stack(items.iter().map(|s| s.decoder_input.as_slice()).collect());
        let labels        = self.stack(items.iter().map(|s| s.labels.as_slice()).collect());

        TranslationBatch { encoder_input, decoder_input, labels }
    }
}

// ─── DataLoader adapter ───────────────────────────────────────────────────────
/// Every call to `batches()` starts a new pass of the loader
/// (reshuffled if the loader was built with `.shuffle(seed)`).
impl<O: 'static> BatchSource<O> for Arc<dyn DataLoader<O>> {
    fn batches(&self) -> Box<dyn Iterator<Item = O> + '_> {
        Box::new(self.iter())
    }
}
