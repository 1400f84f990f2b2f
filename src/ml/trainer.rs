// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch/batch loop for any Seq2Seq model, generic over the
// autodiff backend so tests run on NdArray and the CLI on Wgpu
// (f32, or f16 when mixed precision is requested).
//
// Per batch:
//   1. teacher-forced forward → logits [batch, seq, vocab]
//   2. cross-entropy over batch*seq positions (pad ignored,
//      label smoothing)
//   3. loss scaling strategy → backward → unscale
//   4. global-norm clipping when max_grad_norm > 0
//   5. optimizer step, then Noam schedule step (the rate used
//      is logged as learning_rate/group-0 first)
//   6. running train stats, progress callback, sink flush
//
// Every `validation_interval` steps ((global_step + 1) % n == 0)
// and only when a metrics sink is attached:
//   model.valid() → evaluation pass + BLEU-1..4 on a sample of
//   the validation set → report train / valid / valid_bleu →
//   fresh train accumulator.
//
// One checkpoint at the end of every epoch. Resuming restores
// model, optimizer, schedule, stats and counters and continues
// with the epoch after the saved one.
//
// Key Burn insight:
//   - Training uses B (Autodiff<...>) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - Validation batches must live on the inner backend too
//
// Reference: Burn Book §5, Vaswani et al. (2017) §5.3

use anyhow::{anyhow, bail, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{TranslationBatch, TranslationBatcher},
    dataset::{TranslationDataset, TranslationSample},
};
use crate::domain::{
    schedule::NoamSchedule,
    stats::StatsAccumulator,
    tokens::SpecialTokens,
    traits::{BatchSource, MetricsSink},
};
use crate::infra::checkpoint::{CheckpointStore, TrainingCheckpoint, CHECKPOINT_FORMAT_VERSION};
use crate::ml::{
    decoding::decode_with_teacher_forcing,
    evaluation::{compute_dataset_bleu, criterion_config, evaluate, sequence_loss, to_host_ids},
    model::{Seq2Seq, TranslationTransformer},
    optimizer::{make_optimizer, ModelOptimizer, OptimizerSettings},
    scaling::{clip_to_norm, global_grad_norm, select_loss_scaling, LossScaling},
};

type MyBackend     = burn::backend::Autodiff<burn::backend::Wgpu>;
type MyHalfBackend = burn::backend::Autodiff<burn::backend::Wgpu<burn::tensor::f16, i32>>;

type ModelRecorder = BinBytesRecorder<FullPrecisionSettings>;

const BLEU_MAX_ORDER: usize = 4;

// ─── Options ──────────────────────────────────────────────────────────────────
/// What to do with a batch whose loss is NaN or infinite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonFinitePolicy {
    /// Drop the batch (no backward, no stats) and keep going
    #[default]
    Skip,
    /// Stop training with an error
    Abort,
}

impl FromStr for NonFinitePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip"  => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other   => Err(anyhow!("Unknown non-finite loss policy '{other}' (expected skip or abort)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainerOptions {
    pub num_epochs:      usize,
    /// Clipping is off when <= 0
    pub max_grad_norm:   f64,
    pub fp16:            bool,
    /// Maximum decoding length for BLEU
    pub seq_length:      usize,
    /// Greedy decoding when <= 1
    pub beam_size:       usize,
    /// Validation samples decoded for BLEU
    pub bleu_samples:    usize,
    pub label_smoothing: f32,
    pub non_finite:      NonFinitePolicy,
    /// Target-side special tokens
    pub tokens:          SpecialTokens,
}

/// Counters owned by the trainer and saved in every checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingProgress {
    /// First epoch the next call to `train` runs
    pub initial_epoch: usize,
    pub global_step:   usize,
    pub skipped_steps: usize,
}

/// Passed to the progress callback after every batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchProgress {
    pub epoch:       usize,
    pub num_epochs:  usize,
    pub global_step: usize,
    pub loss:        f64,
}

/// Validation data on the inner backend: batches for the
/// evaluation pass, raw samples for BLEU.
pub struct ValidationSet<'a, B: Backend> {
    pub batches: &'a dyn BatchSource<TranslationBatch<B>>,
    pub samples: &'a [TranslationSample],
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
pub struct Trainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    model:              M,
    optimizer:          Box<dyn ModelOptimizer<M, B>>,
    optimizer_settings: OptimizerSettings,
    scaling:            Box<dyn LossScaling<B, M>>,
    schedule:           Option<NoamSchedule>,
    criterion:          CrossEntropyLossConfig,
    progress:           TrainingProgress,
    train_stats:        StatsAccumulator,
    sink:               Option<Box<dyn MetricsSink>>,
    on_batch:           Option<Box<dyn FnMut(&BatchProgress)>>,
    store:              CheckpointStore,
    options:            TrainerOptions,
}

impl<B, M> Trainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Seq2Seq<B> + 'static,
    M::InnerModule: Seq2Seq<B::InnerBackend>,
{
    /// Fails if the optimizer settings are invalid.
    pub fn new(
        model:              M,
        optimizer_settings: OptimizerSettings,
        schedule:           Option<NoamSchedule>,
        store:              CheckpointStore,
        options:            TrainerOptions,
    ) -> Result<Self> {
        let optimizer   = make_optimizer::<B, M>(&optimizer_settings)?;
        let scaling     = select_loss_scaling::<B, M>(options.fp16);
        let criterion   = criterion_config(model.target_pad_id(), options.label_smoothing);
        let train_stats = StatsAccumulator::ignoring_padding(model.target_pad_id());

        Ok(Self {
            model,
            optimizer,
            optimizer_settings,
            scaling,
            schedule,
            criterion,
            progress: TrainingProgress::default(),
            train_stats,
            sink: None,
            on_batch: None,
            store,
            options,
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, callback: impl FnMut(&BatchProgress) + 'static) -> Self {
        self.on_batch = Some(Box::new(callback));
        self
    }

    pub fn model(&self) -> &M { &self.model }

    pub fn into_model(self) -> M { self.model }

    pub fn progress(&self) -> TrainingProgress { self.progress }

    pub fn train_stats(&self) -> &StatsAccumulator { &self.train_stats }

    pub fn schedule(&self) -> Option<&NoamSchedule> { self.schedule.as_ref() }

    pub fn store(&self) -> &CheckpointStore { &self.store }

    /// Run the remaining epochs.
    pub fn train(
        &mut self,
        train:               &dyn BatchSource<TranslationBatch<B>>,
        valid:               &ValidationSet<'_, B::InnerBackend>,
        validation_interval: usize,
        resume:              Option<TrainingCheckpoint>,
    ) -> Result<()> {
        if let Some(checkpoint) = resume {
            self.restore(checkpoint)?;
        }

        let interval   = validation_interval.max(1);
        let num_epochs = self.options.num_epochs;
        let criterion  = self.criterion.init::<B>(&self.model.device());

        for epoch in self.progress.initial_epoch..num_epochs {
            tracing::info!("Processing epoch {:02}/{:02}", epoch + 1, num_epochs);

            for batch in train.batches() {
                let step = self.progress.global_step;
                let loss = self.train_step(&criterion, batch)?;

                if let Some(callback) = self.on_batch.as_mut() {
                    callback(&BatchProgress { epoch, num_epochs, global_step: step, loss });
                }

                if self.sink.is_some() {
                    if (step + 1) % interval == 0 {
                        self.validate(valid, step + 1)?;
                    }
                    if let Some(sink) = self.sink.as_mut() {
                        sink.flush()?;
                    }
                }

                self.progress.global_step += 1;
            }

            self.save_checkpoint(epoch)?;
            self.progress.initial_epoch = epoch + 1;
        }

        tracing::info!(
            "Training complete: {} steps ({} skipped)",
            self.progress.global_step,
            self.progress.skipped_steps,
        );
        Ok(())
    }

    // ── One optimisation step ─────────────────────────────────────────────────
    /// Returns the batch loss (NaN/inf for a skipped batch).
    fn train_step(&mut self, criterion: &CrossEntropyLoss<B>, batch: TranslationBatch<B>) -> Result<f64> {
        let step = self.progress.global_step;

        let output     = decode_with_teacher_forcing(&self.model, batch.encoder_input, batch.decoder_input);
        let loss       = sequence_loss(criterion, output.logits, batch.labels.clone());
        let loss_value = loss.clone().into_scalar().elem::<f64>();

        if !loss_value.is_finite() {
            match self.options.non_finite {
                NonFinitePolicy::Abort => bail!("Non-finite loss ({loss_value}) at global step {step}"),
                NonFinitePolicy::Skip => {
                    self.progress.skipped_steps += 1;
                    tracing::warn!("Non-finite loss ({}) at global step {}, batch skipped", loss_value, step);
                    return Ok(loss_value);
                }
            }
        }

        // ── Backward, unscale, clip ───────────────────────────────────────────
        let grads = self.scaling.scale_and_backward(loss, &self.model);
        let grads = self.scaling.unscale_before_clip(&self.model, grads);

        let max_norm = self.options.max_grad_norm;
        let norm = if max_norm > 0.0 || self.scaling.tracks_overflow() {
            global_grad_norm::<B, M>(&self.model, &grads)
        } else {
            0.0
        };

        if self.scaling.update(norm.is_finite()) {
            let grads = if max_norm > 0.0 {
                clip_to_norm::<B, M>(&self.model, grads, norm, max_norm)
            } else {
                grads
            };
            let lr = self.current_lr();
            self.model = self.optimizer.step(lr, self.model.clone(), grads);
        } else {
            tracing::debug!("Optimizer step skipped at global step {} (gradient overflow)", step);
        }

        // ── Schedule ──────────────────────────────────────────────────────────
        if let Some(schedule) = self.schedule.as_mut() {
            if let Some(sink) = self.sink.as_mut() {
                for (group, lr) in schedule.last_lrs().into_iter().enumerate() {
                    sink.add_scalar(&format!("learning_rate/group-{group}"), lr, step)?;
                }
            }
            schedule.step();
        }

        // ── Stats ─────────────────────────────────────────────────────────────
        let predictions = to_host_ids(output.predictions)?;
        let labels      = to_host_ids(batch.labels)?;
        self.train_stats.update_step(loss_value, &predictions, &labels);

        if let Some(sink) = self.sink.as_mut() {
            sink.add_scalar("loss/train_batch_loss", loss_value, step)?;
        }

        Ok(loss_value)
    }

    fn current_lr(&self) -> f64 {
        self.schedule
            .as_ref()
            .map_or(self.optimizer_settings.learning_rate, NoamSchedule::current_lr)
    }

    // ── Validation ────────────────────────────────────────────────────────────
    fn validate(&mut self, valid: &ValidationSet<'_, B::InnerBackend>, step: usize) -> Result<()> {
        // model.valid() → M::InnerModule, dropout disabled
        let model_valid = self.model.valid();

        let valid_stats = evaluate::<B::InnerBackend, _>(&model_valid, &self.criterion, valid.batches)?;

        let sample_count = self.options.bleu_samples.min(valid.samples.len());
        let valid_bleu   = compute_dataset_bleu::<B::InnerBackend, _>(
            &model_valid,
            &valid.samples[..sample_count],
            &self.options.tokens,
            self.options.seq_length,
            self.options.beam_size,
            BLEU_MAX_ORDER,
        )?;

        self.report(step, &valid_stats, &valid_bleu)
    }

    fn report(&mut self, step: usize, valid_stats: &StatsAccumulator, valid_bleu: &[f64]) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };

        self.train_stats.report(sink.as_mut(), "train", step)?;
        valid_stats.report(sink.as_mut(), "valid", step)?;

        let bleu: Vec<(String, f64)> = valid_bleu
            .iter()
            .enumerate()
            .map(|(i, &score)| (format!("BLEU-{}", i + 1), score))
            .collect();
        sink.add_scalars("valid_bleu", &bleu, step)?;

        tracing::info!(
            "Step {:>7} | train_loss={:.4} | train_acc={:.1}% | val_loss={:.4} | val_acc={:.1}% | BLEU-4={:.2}",
            step,
            self.train_stats.average_loss(),
            self.train_stats.accuracy() * 100.0,
            valid_stats.average_loss(),
            valid_stats.accuracy() * 100.0,
            valid_bleu.last().copied().unwrap_or(0.0) * 100.0,
        );

        self.train_stats = self.train_stats.reset();
        Ok(())
    }

    // ── Checkpointing ─────────────────────────────────────────────────────────
    fn save_checkpoint(&self, epoch: usize) -> Result<()> {
        let model_state = <ModelRecorder as Recorder<B>>::record(
            &ModelRecorder::default(),
            self.model.clone().into_record(),
            (),
        )
        .map_err(|e| anyhow!("Cannot serialise model state: {e:?}"))?;

        let checkpoint = TrainingCheckpoint {
            format_version:  CHECKPOINT_FORMAT_VERSION,
            epoch,
            global_step:     self.progress.global_step,
            skipped_steps:   self.progress.skipped_steps,
            train_stats:     self.train_stats.clone(),
            model_state,
            optimizer_state: self.optimizer.snapshot()?,
            schedule_state:  self.schedule.clone(),
        };

        self.store.save(&checkpoint)?;
        Ok(())
    }

    fn restore(&mut self, checkpoint: TrainingCheckpoint) -> Result<()> {
        let device = self.model.device();

        if checkpoint.model_state.is_empty() {
            bail!("Checkpoint for epoch {} has no model state", checkpoint.epoch);
        }
        let record = <ModelRecorder as Recorder<B>>::load::<M::Record>(
            &ModelRecorder::default(),
            checkpoint.model_state,
            &device,
        )
        .map_err(|e| anyhow!("Cannot restore model state from epoch {}: {e:?}", checkpoint.epoch))?;
        self.model = self.model.clone().load_record(record);

        let fresh = make_optimizer::<B, M>(&self.optimizer_settings)?;
        self.optimizer = fresh.restore(checkpoint.optimizer_state, &device)?;

        match (self.schedule.as_mut(), checkpoint.schedule_state) {
            (Some(schedule), Some(saved)) => *schedule = saved,
            (Some(_), None) => {
                tracing::warn!("Checkpoint has no schedule state; the learning-rate schedule restarts from step 0");
            }
            (None, Some(_)) => {
                tracing::debug!("Checkpoint schedule state ignored: no schedule configured");
            }
            (None, None) => {}
        }

        self.train_stats = checkpoint.train_stats;
        self.progress = TrainingProgress {
            initial_epoch: checkpoint.epoch + 1,
            global_step:   checkpoint.global_step,
            skipped_steps: checkpoint.skipped_steps,
        };

        tracing::info!(
            "Resumed from epoch {} (global step {})",
            checkpoint.epoch,
            checkpoint.global_step,
        );
        Ok(())
    }
}

// ─── Wgpu entry point ─────────────────────────────────────────────────────────
/// Everything the CLI prepares before training starts.
pub struct TrainingData {
    pub train:             TranslationDataset,
    pub valid:             TranslationDataset,
    pub src_vocab_size:    usize,
    pub target_vocab_size: usize,
    pub src_tokens:        SpecialTokens,
    pub target_tokens:     SpecialTokens,
}

/// Train on the default WGPU device. `fp16` selects the
/// half-precision float backend, so dynamic loss scaling is active;
/// otherwise training runs in f32.
pub fn run_training(
    cfg:   &TrainConfig,
    data:  TrainingData,
    store: CheckpointStore,
    sink:  Option<Box<dyn MetricsSink>>,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();

    if cfg.fp16 {
        tracing::info!("Using WGPU device: {:?} (f16, dynamic loss scaling)", device);
        train_on_backend::<MyHalfBackend>(cfg, data, store, sink, device)
    } else {
        tracing::info!("Using WGPU device: {:?}", device);
        train_on_backend::<MyBackend>(cfg, data, store, sink, device)
    }
}

fn train_on_backend<B: AutodiffBackend>(
    cfg:    &TrainConfig,
    data:   TrainingData,
    store:  CheckpointStore,
    sink:   Option<Box<dyn MetricsSink>>,
    device: B::Device,
) -> Result<()> {
    // ── Resume state ──────────────────────────────────────────────────────────
    let resume = if cfg.resume {
        let latest = store.load_latest()?;
        if latest.is_none() {
            tracing::info!("No checkpoint found in '{}', starting fresh", store.dir().display());
        }
        latest
    } else {
        None
    };

    // ── Build model ───────────────────────────────────────────────────────────
    let model_cfg = cfg.model_config(
        data.src_vocab_size,
        data.target_vocab_size,
        data.src_tokens.pad,
        data.target_tokens.pad,
    );
    let model: TranslationTransformer<B> = model_cfg.init(&device);
    tracing::info!("Model ready: {} layers, d_model={}", cfg.num_layers, cfg.d_model);

    let schedule = (cfg.warmup_steps > 0)
        .then(|| NoamSchedule::new(cfg.learning_rate, cfg.d_model, cfg.warmup_steps));

    let options = TrainerOptions {
        num_epochs:      cfg.num_epochs,
        max_grad_norm:   cfg.max_grad_norm,
        fp16:            cfg.fp16,
        seq_length:      cfg.seq_length,
        beam_size:       cfg.beam_size,
        bleu_samples:    cfg.bleu_samples,
        label_smoothing: cfg.label_smoothing,
        non_finite:      cfg.non_finite,
        tokens:          data.target_tokens,
    };

    let mut trainer = Trainer::new(model, cfg.optimizer_settings()?, schedule, store, options)?
        .with_progress(|p: &BatchProgress| {
            if (p.global_step + 1) % 100 == 0 {
                tracing::info!(
                    "epoch {:02}/{:02} | step {:>7} | loss={:.3}",
                    p.epoch + 1, p.num_epochs, p.global_step + 1, p.loss,
                );
            }
        });
    if let Some(sink) = sink {
        trainer = trainer.with_sink(sink);
    }

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher = TranslationBatcher::<B>::new(device.clone());
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(1)
        .build(data.train);

    // ── Validation data loader (InnerBackend — no autodiff overhead) ──────────
    let valid_samples = data.valid.samples().to_vec();
    let valid_batcher = TranslationBatcher::<B::InnerBackend>::new(device);
    let valid_loader  = DataLoaderBuilder::new(valid_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(1)
        .build(data.valid);

    let valid = ValidationSet { batches: &valid_loader, samples: &valid_samples };
    trainer.train(&train_loader, &valid, cfg.validation_interval, resume)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::metrics::MemorySink;
    use crate::ml::model::tiny_config;
    use crate::ml::optimizer::OptimizerKind;
    use crate::ml::scaling::backend_is_half_precision;
    use burn::{
        backend::{Autodiff, NdArray},
        data::dataloader::batcher::Batcher,
        module::Param,
    };
    use std::{cell::RefCell, rc::Rc};
    use tempfile::TempDir;

    type TestBackend  = Autodiff<NdArray>;
    type InnerBackend = NdArray;
    type TestModel    = TranslationTransformer<TestBackend>;

    const TOKENS: SpecialTokens = SpecialTokens { pad: 0, sos: 2, eos: 3 };

    /// Lets the test read what the trainer wrote to its boxed sink.
    struct SharedSink(Rc<RefCell<MemorySink>>);

    impl MetricsSink for SharedSink {
        fn add_scalar(&mut self, name: &str, value: f64, step: usize) -> Result<()> {
            self.0.borrow_mut().add_scalar(name, value, step)
        }

        fn add_scalars(&mut self, group: &str, values: &[(String, f64)], step: usize) -> Result<()> {
            self.0.borrow_mut().add_scalars(group, values, step)
        }

        fn flush(&mut self) -> Result<()> {
            self.0.borrow_mut().flush()
        }
    }

    fn samples() -> Vec<TranslationSample> {
        vec![
            TranslationSample::encode(&[4, 5], &[4, 5], &TOKENS, 6),
            TranslationSample::encode(&[6], &[6, 7], &TOKENS, 6),
            TranslationSample::encode(&[7, 8, 9], &[8], &TOKENS, 6),
            TranslationSample::encode(&[10], &[9, 4, 5], &TOKENS, 6),
        ]
    }

    /// Three batches of the same pair of samples
    fn train_batches() -> Vec<TranslationBatch<TestBackend>> {
        let batcher = TranslationBatcher::<TestBackend>::new(Default::default());
        (0..3).map(|_| batcher.batch(samples()[..2].to_vec())).collect()
    }

    fn valid_batches() -> Vec<TranslationBatch<InnerBackend>> {
        let batcher = TranslationBatcher::<InnerBackend>::new(Default::default());
        vec![batcher.batch(samples()[2..].to_vec())]
    }

    fn options(num_epochs: usize) -> TrainerOptions {
        TrainerOptions {
            num_epochs,
            max_grad_norm:   1.0,
            fp16:            false,
            seq_length:      6,
            beam_size:       2,
            bleu_samples:    2,
            label_smoothing: 0.1,
            non_finite:      NonFinitePolicy::Skip,
            tokens:          TOKENS,
        }
    }

    fn adam() -> OptimizerSettings {
        OptimizerSettings {
            kind:          OptimizerKind::Adam,
            learning_rate: 1e-3,
            betas:         (0.9, 0.98),
            epsilon:       1e-9,
            weight_decay:  0.0,
        }
    }

    fn trainer(dir: &TempDir, num_epochs: usize, schedule: Option<NoamSchedule>) -> Trainer<TestBackend, TestModel> {
        let model: TestModel = tiny_config().init(&Default::default());
        let store = CheckpointStore::new(dir.path(), "weights", "tmodel", 0).unwrap();
        Trainer::new(model, adam(), schedule, store, options(num_epochs)).unwrap()
    }

    fn run(trainer: &mut Trainer<TestBackend, TestModel>, interval: usize, resume: Option<TrainingCheckpoint>) {
        let train_batches = train_batches();
        let valid_batches = valid_batches();
        let valid_samples = samples()[2..].to_vec();
        let valid = ValidationSet { batches: &valid_batches, samples: &valid_samples };
        trainer.train(&train_batches, &valid, interval, resume).unwrap();
    }

    #[test]
    fn test_one_step_per_batch_and_one_checkpoint_per_epoch() {
        let dir = TempDir::new().unwrap();
        let mut trainer = trainer(&dir, 2, None);

        run(&mut trainer, 1000, None);

        let progress = trainer.progress();
        assert_eq!(progress.global_step, 6);
        assert_eq!(progress.initial_epoch, 2);
        assert_eq!(progress.skipped_steps, 0);
        assert_eq!(trainer.store().list_epochs().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_stats_accumulate_without_sink() {
        let dir = TempDir::new().unwrap();
        let mut trainer = trainer(&dir, 1, None);

        run(&mut trainer, 1, None);

        // no sink → no report, no reset
        assert_eq!(trainer.train_stats().step_count(), 3);
        let saved = trainer.store().load_latest().unwrap().unwrap();
        assert_eq!(saved.train_stats.step_count(), 3);
        assert_eq!(saved.global_step, 3);
    }

    #[test]
    fn test_validation_reports_and_resets_train_stats() {
        let dir    = TempDir::new().unwrap();
        let shared = Rc::new(RefCell::new(MemorySink::default()));
        let mut trainer = trainer(&dir, 1, Some(NoamSchedule::new(1.0, 16, 4)))
            .with_sink(Box::new(SharedSink(shared.clone())));

        run(&mut trainer, 2, None);

        let sink = shared.borrow();
        // (global_step + 1) % 2 == 0 → only after the second batch
        for name in ["train/loss", "train/accuracy", "valid/loss", "valid/accuracy"] {
            assert!(sink.value(name, 2).is_some(), "missing {name}");
            assert_eq!(sink.series(name).len(), 1);
        }
        for n in 1..=4 {
            let bleu = sink.value(&format!("valid_bleu/BLEU-{n}"), 2).unwrap();
            assert!((0.0..=1.0).contains(&bleu));
        }

        assert_eq!(sink.series("learning_rate/group-0").len(), 3);
        assert_eq!(sink.series("loss/train_batch_loss").len(), 3);
        assert_eq!(sink.flushes, 3);

        // reset after the report at step 2, then one more batch
        assert_eq!(trainer.train_stats().step_count(), 1);
        assert_eq!(trainer.schedule().unwrap().last_step(), 3);
    }

    #[test]
    fn test_learning_rate_logged_before_schedule_step() {
        let dir      = TempDir::new().unwrap();
        let shared   = Rc::new(RefCell::new(MemorySink::default()));
        let schedule = NoamSchedule::new(1.0, 16, 4);
        let expected = schedule.current_lr();
        let mut trainer = trainer(&dir, 1, Some(schedule))
            .with_sink(Box::new(SharedSink(shared.clone())));

        run(&mut trainer, 1000, None);

        let lr = shared.borrow().value("learning_rate/group-0", 0).unwrap();
        assert!((lr - expected).abs() < 1e-12);
    }

    #[test]
    fn test_progress_callback_sees_every_batch() {
        let dir   = TempDir::new().unwrap();
        let steps = Rc::new(RefCell::new(Vec::new()));
        let seen  = steps.clone();
        let mut trainer = trainer(&dir, 1, None)
            .with_progress(move |p: &BatchProgress| seen.borrow_mut().push(p.global_step));

        run(&mut trainer, 1000, None);
        assert_eq!(*steps.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_resume_continues_after_saved_epoch() {
        let dir = TempDir::new().unwrap();
        let mut first = trainer(&dir, 1, Some(NoamSchedule::new(1.0, 16, 4)));
        run(&mut first, 1000, None);

        let saved = first.store().load_latest().unwrap().unwrap();
        assert_eq!(saved.epoch, 0);

        let mut second = trainer(&dir, 2, Some(NoamSchedule::new(1.0, 16, 4)));
        run(&mut second, 1000, Some(saved));

        let progress = second.progress();
        assert_eq!(progress.global_step, 6);
        assert_eq!(progress.initial_epoch, 2);
        assert_eq!(second.schedule().unwrap().last_step(), 6);
        assert_eq!(second.store().list_epochs().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_resume_restores_model_weights() {
        let dir = TempDir::new().unwrap();
        let mut first = trainer(&dir, 1, None);
        run(&mut first, 1000, None);
        let saved = first.store().load_latest().unwrap().unwrap();

        // nothing left to train: only the restore happens
        let mut second = trainer(&dir, 1, None);
        run(&mut second, 1000, Some(saved));

        let expected = first.model().output.weight.val().into_data();
        let restored = second.model().output.weight.val().into_data();
        expected.assert_approx_eq(&restored, 6);
        assert_eq!(second.progress().global_step, 3);
    }

    #[test]
    fn test_resume_without_schedule_state_keeps_fresh_schedule() {
        let dir = TempDir::new().unwrap();
        let mut first = trainer(&dir, 1, None);
        run(&mut first, 1000, None);
        let saved = first.store().load_latest().unwrap().unwrap();
        assert!(saved.schedule_state.is_none());

        let mut second = trainer(&dir, 1, Some(NoamSchedule::new(1.0, 16, 4)));
        run(&mut second, 1000, Some(saved));
        assert_eq!(second.schedule().unwrap().last_step(), 0);
    }

    #[test]
    fn test_resume_with_empty_model_state_fails() {
        let dir = TempDir::new().unwrap();
        let mut first = trainer(&dir, 1, None);
        run(&mut first, 1000, None);
        let mut saved = first.store().load_latest().unwrap().unwrap();
        saved.model_state.clear();

        let mut second = trainer(&dir, 2, None);
        let train_batches = train_batches();
        let valid_batches = valid_batches();
        let valid = ValidationSet { batches: &valid_batches, samples: &[] };
        assert!(second.train(&train_batches, &valid, 1000, Some(saved)).is_err());
    }

    #[test]
    fn test_invalid_optimizer_fails_at_construction() {
        let dir   = TempDir::new().unwrap();
        let model: TestModel = tiny_config().init(&Default::default());
        let store = CheckpointStore::new(dir.path(), "weights", "tmodel", 0).unwrap();
        let mut bad = adam();
        bad.epsilon = 0.0;
        assert!(Trainer::new(model, bad, None, store, options(1)).is_err());
    }

    /// Trainer whose output layer turns every logit into NaN.
    fn nan_trainer(dir: &TempDir, policy: NonFinitePolicy) -> Trainer<TestBackend, TestModel> {
        let mut model: TestModel = tiny_config().init(&Default::default());
        let poisoned = model.output.weight.val().inner().mul_scalar(f32::NAN);
        model.output.weight = Param::from_tensor(Tensor::from_inner(poisoned));

        let store = CheckpointStore::new(dir.path(), "weights", "tmodel", 0).unwrap();
        let options = TrainerOptions { non_finite: policy, ..options(1) };
        Trainer::new(model, adam(), None, store, options).unwrap()
    }

    #[test]
    fn test_non_finite_loss_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut trainer = nan_trainer(&dir, NonFinitePolicy::Skip);

        run(&mut trainer, 1000, None);

        let progress = trainer.progress();
        assert_eq!(progress.global_step, 3);
        assert_eq!(progress.skipped_steps, 3);
        assert_eq!(progress.initial_epoch, 1);
        assert!(trainer.train_stats().is_empty());

        let saved = trainer.store().load_latest().unwrap().unwrap();
        assert_eq!(saved.skipped_steps, 3);
    }

    #[test]
    fn test_non_finite_loss_aborts() {
        let dir = TempDir::new().unwrap();
        let mut trainer = nan_trainer(&dir, NonFinitePolicy::Abort);

        let train_batches = train_batches();
        let valid_batches = valid_batches();
        let valid = ValidationSet { batches: &valid_batches, samples: &[] };
        let err = trainer.train(&train_batches, &valid, 1000, None).unwrap_err();

        assert!(err.to_string().contains("global step 0"), "{err}");
        assert_eq!(trainer.progress().global_step, 0);
        assert!(trainer.store().list_epochs().unwrap().is_empty());
    }

    #[test]
    fn test_fp16_training_backend_uses_dynamic_loss_scaling() {
        assert!(backend_is_half_precision::<MyHalfBackend>());
        assert!(!backend_is_half_precision::<MyBackend>());

        let half = select_loss_scaling::<MyHalfBackend, TranslationTransformer<MyHalfBackend>>(true);
        assert!(half.tracks_overflow());
        assert!(half.scale() > 1.0);

        let full = select_loss_scaling::<MyBackend, TranslationTransformer<MyBackend>>(false);
        assert!(!full.tracks_overflow());
    }

    #[test]
    fn test_non_finite_policy_parsing() {
        assert_eq!("skip".parse::<NonFinitePolicy>().unwrap(), NonFinitePolicy::Skip);
        assert_eq!("ABORT".parse::<NonFinitePolicy>().unwrap(), NonFinitePolicy::Abort);
        assert!("ignore".parse::<NonFinitePolicy>().is_err());
        assert_eq!(NonFinitePolicy::default(), NonFinitePolicy::Skip);
    }
}
