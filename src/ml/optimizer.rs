// ============================================================
// Layer 5 — Optimizer Factory
// ============================================================
// Turns the optimizer section of TrainConfig into a Burn
// optimizer behind one uniform interface:
//
//   "adam"  → AdamConfig   (weight decay as L2 penalty, if > 0)
//   "adamw" → AdamWConfig  (decoupled weight decay)
//
//   ModelOptimizer
//     step(lr, model, grads) → model     one update
//     snapshot()             → bytes     for the checkpoint
//     restore(bytes)         → optimizer moment estimates back
//
// The kind is parsed once; an unknown name is rejected before
// any model or trainer is built.
//
// Adam update (Kingma & Ba 2015):
//   m = β1*m + (1-β1)*g
//   v = β2*v + (1-β2)*g²
//   θ = θ - lr * m̂ / (√v̂ + ε)
//
// Reference: Kingma & Ba (2015) Adam
//            Loshchilov & Hutter (2019) Decoupled Weight Decay

use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail, ensure, Result};
use burn::{
    module::AutodiffModule,
    optim::{
        decay::WeightDecayConfig, AdamConfig, AdamWConfig, GradientsParams, Optimizer,
    },
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

type StateRecorder = BinBytesRecorder<FullPrecisionSettings>;

// ─── OptimizerKind ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    AdamW,
}

impl FromStr for OptimizerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adam"  => Ok(Self::Adam),
            "adamw" => Ok(Self::AdamW),
            other   => Err(anyhow!(
                "Unknown optimizer '{other}'. Supported optimizers: adam, adamw"
            )),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam  => write!(f, "adam"),
            Self::AdamW => write!(f, "adamw"),
        }
    }
}

// ─── OptimizerSettings ────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub kind:          OptimizerKind,
    /// Base rate; multiplied by the Noam factor when a schedule is used
    pub learning_rate: f64,
    pub betas:         (f32, f32),
    pub epsilon:       f32,
    pub weight_decay:  f32,
}

impl OptimizerSettings {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "learning rate must be positive, got {}",
            self.learning_rate
        );
        let (beta_1, beta_2) = self.betas;
        ensure!(
            (0.0..1.0).contains(&beta_1) && (0.0..1.0).contains(&beta_2),
            "betas must lie in [0, 1), got ({beta_1}, {beta_2})"
        );
        ensure!(self.epsilon > 0.0, "epsilon must be positive, got {}", self.epsilon);
        ensure!(self.weight_decay >= 0.0, "weight decay must not be negative, got {}", self.weight_decay);
        Ok(())
    }
}

// ─── ModelOptimizer ───────────────────────────────────────────────────────────
/// Uniform face of every supported optimizer.
pub trait ModelOptimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    /// Apply one update and return the updated model.
    fn step(&mut self, lr: f64, model: M, grads: GradientsParams) -> M;

    /// Serialised optimizer state (moment estimates, step counts).
    fn snapshot(&self) -> Result<Vec<u8>>;

    /// Replace the state with a previously taken snapshot.
    fn restore(self: Box<Self>, bytes: Vec<u8>, device: &B::Device) -> Result<Box<dyn ModelOptimizer<M, B>>>;
}

/// Any Burn optimizer, adapted to `ModelOptimizer`.
struct BurnOptimizer<O> {
    inner: O,
}

impl<M, B, O> ModelOptimizer<M, B> for BurnOptimizer<O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + 'static,
    O: Optimizer<M, B> + 'static,
{
    fn step(&mut self, lr: f64, model: M, grads: GradientsParams) -> M {
        self.inner.step(lr, model, grads)
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        <StateRecorder as Recorder<B>>::record(&StateRecorder::default(), self.inner.to_record(), ())
            .map_err(|e| anyhow!("Cannot serialise optimizer state: {e:?}"))
    }

    fn restore(self: Box<Self>, bytes: Vec<u8>, device: &B::Device) -> Result<Box<dyn ModelOptimizer<M, B>>> {
        if bytes.is_empty() {
            bail!("Optimizer state in checkpoint is empty");
        }
        let record = <StateRecorder as Recorder<B>>::load::<O::Record>(&StateRecorder::default(), bytes, device)
            .map_err(|e| anyhow!("Cannot restore optimizer state: {e:?}"))?;

        Ok(Box::new(BurnOptimizer { inner: self.inner.load_record(record) }))
    }
}

/// Build the optimizer described by `settings`.
pub fn make_optimizer<B, M>(settings: &OptimizerSettings) -> Result<Box<dyn ModelOptimizer<M, B>>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + 'static,
{
    settings.validate()?;
    let (beta_1, beta_2) = settings.betas;

    let optim: Box<dyn ModelOptimizer<M, B>> = match settings.kind {
        OptimizerKind::Adam => {
            let weight_decay = (settings.weight_decay > 0.0)
                .then(|| WeightDecayConfig::new(settings.weight_decay));
            let inner = AdamConfig::new()
                .with_beta_1(beta_1)
                .with_beta_2(beta_2)
                .with_epsilon(settings.epsilon)
                .with_weight_decay(weight_decay)
                .init::<B, M>();
            Box::new(BurnOptimizer { inner })
        }
        OptimizerKind::AdamW => {
            let inner = AdamWConfig::new()
                .with_beta_1(beta_1)
                .with_beta_2(beta_2)
                .with_epsilon(settings.epsilon)
                .with_weight_decay(settings.weight_decay)
                .init::<B, M>();
            Box::new(BurnOptimizer { inner })
        }
    };

    tracing::info!(
        "Optimizer: {} (lr={}, betas=({}, {}), eps={}, weight_decay={})",
        settings.kind, settings.learning_rate, beta_1, beta_2, settings.epsilon, settings.weight_decay,
    );
    Ok(optim)
}
