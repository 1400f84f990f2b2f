// ============================================================
// Layer 5 — Translator
// ============================================================
// Loads the latest checkpoint on the Wgpu backend and
// translates single sentences:
//
//   text → Preprocessor → source tokenizer → [SOS] ids [EOS]
//        → greedy (beam_size <= 1) or beam search
//        → strip [SOS]/[EOS]/[PAD] → target tokenizer → text
//
// The architecture is rebuilt from train_config.json and the
// tokenizers' vocabulary sizes, then the weights are loaded
// from the checkpoint's model state.

use anyhow::{anyhow, Context, Result};
use burn::{
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
};
use tokenizers::Tokenizer;

use crate::data::preprocessor::Preprocessor;
use crate::domain::tokens::SpecialTokens;
use crate::infra::{
    checkpoint::CheckpointStore,
    tokenizer_store::{decode_ids, encode_ids, special_tokens, TokenizerStore},
};
use crate::ml::{
    decoding::{beam_decode, greedy_decode},
    model::{Seq2Seq, TranslationTransformer},
};

type InferBackend = burn::backend::Wgpu;

/// Translate raw source ids into target ids with the markers
/// stripped. The source is framed and truncated the same way as
/// during training.
pub fn translate_ids<B: Backend, M: Seq2Seq<B>>(
    model:         &M,
    source_ids:    &[u32],
    source_tokens: &SpecialTokens,
    target_tokens: &SpecialTokens,
    seq_length:    usize,
    beam_size:     usize,
) -> Result<Vec<u32>> {
    let keep = seq_length.saturating_sub(2).min(source_ids.len());

    let mut source = Vec::with_capacity(keep + 2);
    source.push(source_tokens.sos);
    source.extend_from_slice(&source_ids[..keep]);
    source.push(source_tokens.eos);

    let output = if beam_size <= 1 {
        greedy_decode(model, &source, target_tokens, seq_length)?
    } else {
        beam_decode(model, &source, target_tokens, beam_size, seq_length, 1)?
            .into_iter()
            .next()
            .unwrap_or_default()
    };

    Ok(target_tokens.strip(&output))
}

pub struct Translator {
    model:            TranslationTransformer<InferBackend>,
    src_tokenizer:    Tokenizer,
    target_tokenizer: Tokenizer,
    src_tokens:       SpecialTokens,
    target_tokens:    SpecialTokens,
    preprocessor:     Preprocessor,
    seq_length:       usize,
    beam_size:        usize,
}

impl Translator {
    /// `beam_size` overrides the beam width saved in the config.
    pub fn from_checkpoint(store: &CheckpointStore, beam_size: Option<usize>) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let cfg    = store.load_config()?;

        let tokenizers       = TokenizerStore::new(store.dir());
        let src_tokenizer    = tokenizers.load(&cfg.src_lang)?;
        let target_tokenizer = tokenizers.load(&cfg.tgt_lang)?;
        let src_tokens       = special_tokens(&src_tokenizer)?;
        let target_tokens    = special_tokens(&target_tokenizer)?;

        let model_cfg = cfg
            .model_config(
                src_tokenizer.get_vocab_size(true),
                target_tokenizer.get_vocab_size(true),
                src_tokens.pad,
                target_tokens.pad,
            )
            .with_dropout(0.0);
        let model: TranslationTransformer<InferBackend> = model_cfg.init(&device);

        let checkpoint = store
            .load_latest()?
            .context("No checkpoint found. Have you trained the model first?")?;
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record   = <BinBytesRecorder<FullPrecisionSettings> as Recorder<InferBackend>>::load(
            &recorder,
            checkpoint.model_state,
            &device,
        )
        .map_err(|e| anyhow!("Cannot load model weights from epoch {}: {e:?}", checkpoint.epoch))?;
        let model = model.load_record(record);

        tracing::info!("Model loaded from checkpoint (epoch {})", checkpoint.epoch);

        Ok(Self {
            model,
            src_tokenizer,
            target_tokenizer,
            src_tokens,
            target_tokens,
            preprocessor: Preprocessor::new().with_lowercase(cfg.lowercase),
            seq_length: cfg.seq_length,
            beam_size: beam_size.unwrap_or(cfg.beam_size),
        })
    }

    pub fn translate(&self, text: &str) -> Result<String> {
        let cleaned    = self.preprocessor.clean(text);
        let source_ids = encode_ids(&self.src_tokenizer, &cleaned)?;

        let target_ids = translate_ids(
            &self.model,
            &source_ids,
            &self.src_tokens,
            &self.target_tokens,
            self.seq_length,
            self.beam_size,
        )?;

        let translation = decode_ids(&self.target_tokenizer, &target_ids)?;
        tracing::debug!("'{}' → {:?} → '{}'", cleaned, target_ids, translation);
        Ok(translation)
    }
}
