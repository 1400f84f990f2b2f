// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `translate`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::ml::trainer::NonFinitePolicy;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the translation model on a parallel corpus
    Train(TrainArgs),

    /// Translate text with the latest checkpoint
    Translate(TranslateArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory holding `<prefix>.<lang>` corpus files
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Training split file prefix (train.en / train.vi)
    #[arg(long, default_value = "train")]
    pub train_prefix: String,

    /// Validation split file prefix; omit to carve one out of training data
    #[arg(long)]
    pub valid_prefix: Option<String>,

    #[arg(long, default_value = "en")]
    pub src_lang: String,

    #[arg(long, default_value = "vi")]
    pub tgt_lang: String,

    /// Lowercase both sides before tokenising
    #[arg(long)]
    pub lowercase: bool,

    /// Maximum tokenizer vocabulary per language (specials included)
    #[arg(long, default_value_t = 30000)]
    pub vocab_size: usize,

    /// Words seen fewer times than this map to [UNK]
    #[arg(long, default_value_t = 2)]
    pub min_frequency: usize,

    /// Share of the training data held out when no validation split is given
    #[arg(long, default_value_t = 0.1)]
    pub val_fraction: f64,

    /// Seed for shuffling and the train/validation split
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoints_dir: String,

    #[arg(long, default_value = "weights")]
    pub model_dir: String,

    #[arg(long, default_value = "transformer")]
    pub model_basename: String,

    /// Checkpoints kept on disk (0 keeps all)
    #[arg(long, default_value_t = 5)]
    pub keep_checkpoints: usize,

    /// Continue from the latest checkpoint
    #[arg(long)]
    pub resume: bool,

    /// Hidden dimension of the transformer (d_model in the paper)
    #[arg(long, default_value_t = 512)]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    /// Encoder and decoder layers each
    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    /// Inner dimension of the feed-forward network
    #[arg(long, default_value_t = 2048)]
    pub d_ffn: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// adam or adamw
    #[arg(long, default_value = "adam")]
    pub optimizer: String,

    /// Base learning rate (scaled by the Noam factor when --warmup-steps > 0)
    #[arg(long, default_value_t = 1e-4)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 0.9)]
    pub beta_1: f32,

    #[arg(long, default_value_t = 0.98)]
    pub beta_2: f32,

    #[arg(long, default_value_t = 1e-9)]
    pub epsilon: f32,

    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f32,

    /// Noam schedule warm-up; 0 keeps the learning rate constant
    #[arg(long, default_value_t = 0)]
    pub warmup_steps: usize,

    #[arg(long, default_value_t = 0.1)]
    pub label_smoothing: f32,

    /// Global gradient norm limit; 0 disables clipping
    #[arg(long, default_value_t = 1.0)]
    pub max_grad_norm: f64,

    /// Train in f16 on WGPU with dynamic loss scaling
    #[arg(long)]
    pub fp16: bool,

    /// What to do with a NaN/inf loss: skip or abort
    #[arg(long, default_value = "skip")]
    pub non_finite: NonFinitePolicy,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub num_epochs: usize,

    /// Tokens per encoder/decoder row, markers included
    #[arg(long, default_value_t = 120)]
    pub seq_length: usize,

    /// Validate every N optimizer steps
    #[arg(long, default_value_t = 3000)]
    pub validation_interval: usize,

    /// Beam width for validation BLEU (1 = greedy)
    #[arg(long, default_value_t = 5)]
    pub beam_size: usize,

    /// Validation sentences decoded for BLEU
    #[arg(long, default_value_t = 5)]
    pub bleu_samples: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:            a.data_dir,
            train_prefix:        a.train_prefix,
            valid_prefix:        a.valid_prefix,
            src_lang:            a.src_lang,
            tgt_lang:            a.tgt_lang,
            lowercase:           a.lowercase,
            vocab_size:          a.vocab_size,
            min_frequency:       a.min_frequency,
            val_fraction:        a.val_fraction,
            seed:                a.seed,
            checkpoints_dir:     a.checkpoints_dir,
            model_dir:           a.model_dir,
            model_basename:      a.model_basename,
            keep_checkpoints:    a.keep_checkpoints,
            resume:              a.resume,
            d_model:             a.d_model,
            num_heads:           a.num_heads,
            num_layers:          a.num_layers,
            d_ffn:               a.d_ffn,
            dropout:             a.dropout,
            optimizer:           a.optimizer,
            learning_rate:       a.learning_rate,
            beta_1:              a.beta_1,
            beta_2:              a.beta_2,
            epsilon:             a.epsilon,
            weight_decay:        a.weight_decay,
            warmup_steps:        a.warmup_steps,
            label_smoothing:     a.label_smoothing,
            max_grad_norm:       a.max_grad_norm,
            fp16:                a.fp16,
            non_finite:          a.non_finite,
            batch_size:          a.batch_size,
            num_epochs:          a.num_epochs,
            seq_length:          a.seq_length,
            validation_interval: a.validation_interval,
            beam_size:           a.beam_size,
            bleu_samples:        a.bleu_samples,
        }
    }
}

/// All arguments for the `translate` command
#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// Sentence to translate; reads one sentence per line from stdin if omitted
    #[arg(long)]
    pub text: Option<String>,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoints_dir: String,

    #[arg(long, default_value = "weights")]
    pub model_dir: String,

    #[arg(long, default_value = "transformer")]
    pub model_basename: String,

    /// Override the beam width saved with the model (1 = greedy)
    #[arg(long)]
    pub beam_size: Option<usize>,
}
