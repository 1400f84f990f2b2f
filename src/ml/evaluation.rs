// ============================================================
// Layer 5 — Evaluation Pass
// ============================================================
// Runs on the inner (non-autodiff) backend with dropout off:
// the trainer hands in `model.valid()`.
//
//   evaluate()              → loss + token accuracy over the
//                             validation stream; accuracy counts
//                             every label position, padding included
//   compute_dataset_bleu()  → corpus BLEU-1..n of decoded
//                             translations against references
//
// Loss is computed the same way as in training: logits and
// labels are flattened to [batch * seq_length, vocab] and
// [batch * seq_length] and fed to a cross-entropy criterion that
// skips the target pad id.
//
// Reference: Papineni et al. (2002) BLEU

use anyhow::{anyhow, Result};
use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    prelude::*,
};

use crate::data::{batcher::TranslationBatch, dataset::TranslationSample};
use crate::domain::{bleu::corpus_bleu, stats::StatsAccumulator, tokens::SpecialTokens, traits::BatchSource};
use crate::ml::decoding::{beam_decode, decode_with_teacher_forcing, greedy_decode};
use crate::ml::model::Seq2Seq;

/// Criterion for translation: cross-entropy over the target
/// vocabulary, pad positions excluded, optional label smoothing.
pub fn criterion_config(target_pad_id: u32, label_smoothing: f32) -> CrossEntropyLossConfig {
    let smoothing = (label_smoothing > 0.0).then_some(label_smoothing);
    CrossEntropyLossConfig::new()
        .with_pad_tokens(Some(vec![target_pad_id as usize]))
        .with_smoothing(smoothing)
}

/// Loss over every position of the batch, batch and sequence
/// dimensions flattened.
pub fn sequence_loss<B: Backend>(
    criterion: &CrossEntropyLoss<B>,
    logits:    Tensor<B, 3>,
    labels:    Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let [batch_size, seq_length, vocab] = logits.dims();
    let rows = batch_size * seq_length;
    criterion.forward(logits.reshape([rows, vocab]), labels.reshape([rows]))
}

/// Pull an Int tensor to the host as flat i64 values.
pub fn to_host_ids<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Result<Vec<i64>> {
    tensor
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow!("Cannot read token ids from tensor: {e:?}"))
}

/// Loss and token accuracy of `model` over one pass of `batches`.
pub fn evaluate<B: Backend, M: Seq2Seq<B>>(
    model:     &M,
    criterion: &CrossEntropyLossConfig,
    batches:   &dyn BatchSource<TranslationBatch<B>>,
) -> Result<StatsAccumulator> {
    let criterion = criterion.init::<B>(&model.device());
    let mut stats = StatsAccumulator::counting_all();

    for batch in batches.batches() {
        let output = decode_with_teacher_forcing(model, batch.encoder_input, batch.decoder_input);
        let loss   = sequence_loss(&criterion, output.logits, batch.labels.clone());

        let loss_value  = loss.into_scalar().elem::<f64>();
        let predictions = to_host_ids(output.predictions)?;
        let labels      = to_host_ids(batch.labels)?;

        stats.update_step(loss_value, &predictions, &labels);
    }

    tracing::debug!(
        "Evaluation: {} batches, loss={:.4}, acc={:.4}",
        stats.step_count(), stats.average_loss(), stats.accuracy(),
    );
    Ok(stats)
}

/// Corpus BLEU-1..=`max_order` of the model's translations of
/// `samples`. Greedy search when `beam_size <= 1`.
pub fn compute_dataset_bleu<B: Backend, M: Seq2Seq<B>>(
    model:      &M,
    samples:    &[TranslationSample],
    tokens:     &SpecialTokens,
    max_length: usize,
    beam_size:  usize,
    max_order:  usize,
) -> Result<Vec<f64>> {
    let mut candidates = Vec::with_capacity(samples.len());
    let mut references = Vec::with_capacity(samples.len());

    for sample in samples {
        let source = sample.source_ids(tokens);
        let output = if beam_size <= 1 {
            greedy_decode(model, &source, tokens, max_length)?
        } else {
            beam_decode(model, &source, tokens, beam_size, max_length, 1)?
                .into_iter()
                .next()
                .unwrap_or_default()
        };

        candidates.push(tokens.strip(&output));
        references.push(sample.reference_ids(tokens));
    }

    Ok(corpus_bleu(&candidates, &references, max_order))
}
