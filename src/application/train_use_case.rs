// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load parallel corpus       (Layer 4 - data)
//   Step 2: Clean both sides           (Layer 4 - data)
//   Step 3: Build/load tokenizers      (Layer 6 - infra)
//   Step 4: Encode translation samples (Layer 4 - data)
//   Step 5: Train/validation data      (Layer 4 - data)
//   Step 6: Save config                (Layer 6 - infra)
//   Step 7: Open metrics sink          (Layer 6 - infra)
//   Step 8: Run training loop          (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::data::{
    dataset::{TranslationDataset, TranslationSample},
    loader::ParallelCorpusLoader,
    preprocessor::Preprocessor,
    splitter::split_train_val,
};
use crate::domain::{
    sentence_pair::SentencePair,
    tokens::SpecialTokens,
    traits::{CorpusSource, MetricsSink},
};
use crate::infra::{
    checkpoint::CheckpointStore,
    metrics::CsvMetricsSink,
    tokenizer_store::{encode_ids, special_tokens, TokenizerStore},
};
use crate::ml::{
    model::TranslationTransformerConfig,
    optimizer::OptimizerSettings,
    trainer::{run_training, NonFinitePolicy, TrainingData},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved as train_config.json next to the checkpoints so the
// translator can rebuild the same model and tokenizers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    // ── data ──
    pub data_dir:            String,
    pub train_prefix:        String,
    /// Separate validation split; carved out of training data if absent
    pub valid_prefix:        Option<String>,
    pub src_lang:            String,
    pub tgt_lang:            String,
    pub lowercase:           bool,
    pub vocab_size:          usize,
    pub min_frequency:       usize,
    pub val_fraction:        f64,
    pub seed:                u64,

    // ── checkpoints ──
    pub checkpoints_dir:     String,
    pub model_dir:           String,
    pub model_basename:      String,
    /// Checkpoints kept on disk; 0 keeps all
    pub keep_checkpoints:    usize,
    pub resume:              bool,

    // ── model ──
    pub d_model:             usize,
    pub num_heads:           usize,
    pub num_layers:          usize,
    pub d_ffn:               usize,
    pub dropout:             f64,

    // ── optimisation ──
    pub optimizer:           String,
    pub learning_rate:       f64,
    pub beta_1:              f32,
    pub beta_2:              f32,
    pub epsilon:             f32,
    pub weight_decay:        f32,
    /// Noam warm-up steps; 0 means a constant learning rate
    pub warmup_steps:        usize,
    pub label_smoothing:     f32,
    pub max_grad_norm:       f64,
    pub fp16:                bool,
    pub non_finite:          NonFinitePolicy,

    // ── training ──
    pub batch_size:          usize,
    pub num_epochs:          usize,
    pub seq_length:          usize,
    pub validation_interval: usize,
    pub beam_size:           usize,
    pub bleu_samples:        usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:            "data".to_string(),
            train_prefix:        "train".to_string(),
            valid_prefix:        None,
            src_lang:            "en".to_string(),
            tgt_lang:            "vi".to_string(),
            lowercase:           false,
            vocab_size:          30000,
            min_frequency:       2,
            val_fraction:        0.1,
            seed:                42,

            checkpoints_dir:     "checkpoints".to_string(),
            model_dir:           "weights".to_string(),
            model_basename:      "transformer".to_string(),
            keep_checkpoints:    5,
            resume:              false,

            d_model:             512,
            num_heads:           8,
            num_layers:          6,
            d_ffn:               2048,
            dropout:             0.1,

            optimizer:           "adam".to_string(),
            learning_rate:       1e-4,
            beta_1:              0.9,
            beta_2:              0.98,
            epsilon:             1e-9,
            weight_decay:        0.0,
            warmup_steps:        0,
            label_smoothing:     0.1,
            max_grad_norm:       1.0,
            fp16:                false,
            non_finite:          NonFinitePolicy::Skip,

            batch_size:          32,
            num_epochs:          10,
            seq_length:          120,
            validation_interval: 3000,
            beam_size:           5,
            bleu_samples:        5,
        }
    }
}

impl TrainConfig {
    /// Parse and validate the optimizer section.
    pub fn optimizer_settings(&self) -> Result<OptimizerSettings> {
        let settings = OptimizerSettings {
            kind:          self.optimizer.parse()?,
            learning_rate: self.learning_rate,
            betas:         (self.beta_1, self.beta_2),
            epsilon:       self.epsilon,
            weight_decay:  self.weight_decay,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn model_config(
        &self,
        src_vocab_size:    usize,
        target_vocab_size: usize,
        src_pad_id:        u32,
        target_pad_id:     u32,
    ) -> TranslationTransformerConfig {
        TranslationTransformerConfig::new(
            src_vocab_size,
            target_vocab_size,
            self.seq_length,
            src_pad_id,
            target_pad_id,
        )
        .with_d_model(self.d_model)
        .with_num_heads(self.num_heads)
        .with_num_layers(self.num_layers)
        .with_d_ffn(self.d_ffn)
        .with_dropout(self.dropout)
    }

    /// Checks that need no data; run before anything is loaded.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.seq_length >= 2, "seq_length must be at least 2, got {}", self.seq_length);
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(
            self.num_heads > 0 && self.d_model % self.num_heads == 0,
            "d_model ({}) must be divisible by num_heads ({})",
            self.d_model,
            self.num_heads
        );
        ensure!(
            (0.0..1.0).contains(&self.label_smoothing),
            "label_smoothing must lie in [0, 1), got {}",
            self.label_smoothing
        );
        self.optimizer_settings()?;
        Ok(())
    }

    /// Checks that depend on the built target tokenizer.
    pub fn validate_vocab(&self, target_vocab_size: usize) -> Result<()> {
        ensure!(
            self.beam_size <= target_vocab_size,
            "beam_size ({}) exceeds the target vocabulary ({} tokens)",
            self.beam_size,
            target_vocab_size
        );
        Ok(())
    }

    pub fn checkpoint_store(&self) -> Result<CheckpointStore> {
        CheckpointStore::new(
            &self.checkpoints_dir,
            &self.model_dir,
            self.model_basename.clone(),
            self.keep_checkpoints,
        )
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Load the training corpus ─────────────────────────────────
        let train_loader = ParallelCorpusLoader::new(&cfg.data_dir, &cfg.train_prefix, &cfg.src_lang, &cfg.tgt_lang);
        let raw_pairs    = train_loader.load_pairs()?;

        // ── Step 2: Clean / normalise both sides ──────────────────────────────
        let preprocessor = Preprocessor::new().with_lowercase(cfg.lowercase);
        let train_pairs  = clean_pairs(&preprocessor, raw_pairs);
        ensure!(!train_pairs.is_empty(), "No usable sentence pairs in '{}'", train_loader.side_path(&cfg.src_lang).display());

        // ── Step 3: Build / load one tokenizer per language ───────────────────
        let store      = cfg.checkpoint_store()?;
        let tokenizers = TokenizerStore::new(store.dir());

        let src_texts: Vec<String> = train_pairs.iter().map(|p| p.source.clone()).collect();
        let tgt_texts: Vec<String> = train_pairs.iter().map(|p| p.target.clone()).collect();
        let src_tokenizer = tokenizers.load_or_build(&cfg.src_lang, &src_texts, cfg.vocab_size, cfg.min_frequency)?;
        let tgt_tokenizer = tokenizers.load_or_build(&cfg.tgt_lang, &tgt_texts, cfg.vocab_size, cfg.min_frequency)?;

        let src_tokens = special_tokens(&src_tokenizer)?;
        let tgt_tokens = special_tokens(&tgt_tokenizer)?;
        ensure!(
            src_tokens == tgt_tokens,
            "Source and target tokenizers disagree on special token ids ({src_tokens:?} vs {tgt_tokens:?})"
        );
        cfg.validate_vocab(tgt_tokenizer.get_vocab_size(true))?;

        // ── Step 4: Encode samples ────────────────────────────────────────────
        let encoder = SampleEncoder {
            src:        &src_tokenizer,
            tgt:        &tgt_tokenizer,
            tokens:     tgt_tokens,
            seq_length: cfg.seq_length,
        };
        let samples = encoder.encode_all(&train_pairs)?;
        tracing::info!("Built {} training samples", samples.len());

        // ── Step 5: Validation data ───────────────────────────────────────────
        let valid_loader = cfg
            .valid_prefix
            .as_ref()
            .map(|prefix| ParallelCorpusLoader::new(&cfg.data_dir, prefix, &cfg.src_lang, &cfg.tgt_lang));

        let (train_samples, val_samples) = match valid_loader {
            Some(loader) if loader.exists() => {
                let pairs = clean_pairs(&preprocessor, loader.load_pairs()?);
                (samples, encoder.encode_all(&pairs)?)
            }
            other => {
                if other.is_some() {
                    tracing::warn!("Validation files not found, splitting the training data instead");
                }
                split_train_val(samples, 1.0 - cfg.val_fraction, cfg.seed)
            }
        };
        tracing::info!("Split: {} train, {} validation", train_samples.len(), val_samples.len());

        let data = TrainingData {
            train:             TranslationDataset::new(train_samples),
            valid:             TranslationDataset::new(val_samples),
            src_vocab_size:    src_tokenizer.get_vocab_size(true),
            target_vocab_size: tgt_tokenizer.get_vocab_size(true),
            src_tokens,
            target_tokens:     tgt_tokens,
        };

        // ── Step 6: Save config for translation ───────────────────────────────
        store.save_config(cfg)?;

        // ── Step 7: Metrics sink ──────────────────────────────────────────────
        let sink = CsvMetricsSink::new(store.dir()).context("Cannot open metrics sink")?;
        tracing::info!("Metrics written to '{}'", sink.csv_path().display());
        let sink: Box<dyn MetricsSink> = Box::new(sink);

        // ── Step 8: Run training loop (Layer 5) ───────────────────────────────
        run_training(cfg, data, store, Some(sink))
    }
}

fn clean_pairs(preprocessor: &Preprocessor, pairs: Vec<SentencePair>) -> Vec<SentencePair> {
    pairs
        .into_iter()
        .map(|p| SentencePair::new(preprocessor.clean(&p.source), preprocessor.clean(&p.target)))
        .filter(SentencePair::is_complete)
        .collect()
}

/// Tokenises sentence pairs into fixed-length samples.
struct SampleEncoder<'a> {
    src:        &'a Tokenizer,
    tgt:        &'a Tokenizer,
    tokens:     SpecialTokens,
    seq_length: usize,
}

impl SampleEncoder<'_> {
    fn encode_all(&self, pairs: &[SentencePair]) -> Result<Vec<TranslationSample>> {
        pairs
            .iter()
            .map(|pair| {
                let src_ids = encode_ids(self.src, &pair.source)?;
                let tgt_ids = encode_ids(self.tgt, &pair.target)?;
                Ok(TranslationSample::encode(&src_ids, &tgt_ids, &self.tokens, self.seq_length))
            })
            .collect()
    }
}
