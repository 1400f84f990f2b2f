// ============================================================
// Layer 4 — Translation Samples and Dataset
// ============================================================
// One tokenised, fixed-length training example:
//
//   encoder_input  [SOS] s1 s2 ... sN [EOS] [PAD] ...
//   decoder_input  [SOS] t1 t2 ... tM [PAD] ...
//   labels         t1    t2 ... tM [EOS] [PAD] ...
//
// `labels` is `decoder_input` shifted one position ahead, so at
// position i the decoder sees t1..ti and must predict t(i+1)
// (teacher forcing). All three rows have exactly seq_length ids;
// over-long sentences are truncated, keeping the markers.
//
// Reference: Burn Book §4 (Datasets)

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::tokens::SpecialTokens;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationSample {
    pub encoder_input: Vec<u32>,
    pub decoder_input: Vec<u32>,
    pub labels:        Vec<u32>,
}

impl TranslationSample {
    /// Build a sample from raw (un-marked) token ids.
    ///
    /// Needs `seq_length >= 2` so the encoder row can hold both
    /// markers.
    pub fn encode(
        src_ids:    &[u32],
        tgt_ids:    &[u32],
        tokens:     &SpecialTokens,
        seq_length: usize,
    ) -> Self {
        assert!(seq_length >= 2, "seq_length must leave room for [SOS] and [EOS]");

        let src = &src_ids[..src_ids.len().min(seq_length - 2)];
        let tgt = &tgt_ids[..tgt_ids.len().min(seq_length - 1)];

        let mut encoder_input = Vec::with_capacity(seq_length);
        encoder_input.push(tokens.sos);
        encoder_input.extend_from_slice(src);
        encoder_input.push(tokens.eos);

        let mut decoder_input = Vec::with_capacity(seq_length);
        decoder_input.push(tokens.sos);
        decoder_input.extend_from_slice(tgt);

        let mut labels = Vec::with_capacity(seq_length);
        labels.extend_from_slice(tgt);
        labels.push(tokens.eos);

        for row in [&mut encoder_input, &mut decoder_input, &mut labels] {
            row.resize(seq_length, tokens.pad);
        }

        Self { encoder_input, decoder_input, labels }
    }

    /// Source ids without trailing padding, as fed to the decoders.
    pub fn source_ids(&self, tokens: &SpecialTokens) -> Vec<u32> {
        let len = self
            .encoder_input
            .iter()
            .rposition(|&id| id != tokens.pad)
            .map_or(0, |last| last + 1);
        self.encoder_input[..len].to_vec()
    }

    /// Reference translation: the labels without markers or padding.
    pub fn reference_ids(&self, tokens: &SpecialTokens) -> Vec<u32> {
        tokens.strip(&self.labels)
    }
}

pub struct TranslationDataset {
    samples: Vec<TranslationSample>,
}

impl TranslationDataset {
    pub fn new(samples: Vec<TranslationSample>) -> Self { Self { samples } }

    pub fn samples(&self) -> &[TranslationSample] { &self.samples }
}

impl Dataset<TranslationSample> for TranslationDataset {
    fn get(&self, index: usize) -> Option<TranslationSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const TOKENS: SpecialTokens = SpecialTokens { pad: 0, sos: 2, eos: 3 };

    #[test]
    fn test_rows_are_padded_and_shifted() {
        let sample = TranslationSample::encode(&[10, 11], &[20, 21, 22], &TOKENS, 6);
        assert_eq!(sample.encoder_input, vec![2, 10, 11, 3, 0, 0]);
        assert_eq!(sample.decoder_input, vec![2, 20, 21, 22, 0, 0]);
        assert_eq!(sample.labels,        vec![20, 21, 22, 3, 0, 0]);
    }

    #[test]
    fn test_long_sentences_are_truncated_keeping_markers() {
        let sample = TranslationSample::encode(&[10, 11, 12, 13, 14], &[20, 21, 22, 23, 24], &TOKENS, 4);
        assert_eq!(sample.encoder_input, vec![2, 10, 11, 3]);
        assert_eq!(sample.decoder_input, vec![2, 20, 21, 22]);
        assert_eq!(sample.labels,        vec![20, 21, 22, 3]);
    }

    #[test]
    fn test_source_and_reference_views() {
        let sample = TranslationSample::encode(&[10, 11], &[20, 21], &TOKENS, 6);
        assert_eq!(sample.source_ids(&TOKENS), vec![2, 10, 11, 3]);
        assert_eq!(sample.reference_ids(&TOKENS), vec![20, 21]);
    }

    #[test]
    fn test_dataset_indexing() {
        let sample  = TranslationSample::encode(&[10], &[20], &TOKENS, 4);
        let dataset = TranslationDataset::new(vec![sample.clone()]);
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.get(0), Some(sample));
        assert_eq!(dataset.get(1), None);
    }
}
