// ============================================================
// Layer 5 — Gradient Norms, Clipping and Loss Scaling
// ============================================================
// Burn keeps gradients in a GradientsParams map keyed by
// ParamId. The helpers below walk the model with a
// ModuleVisitor to find every float parameter and read or
// rewrite its gradient.
//
// Global-norm clipping:
//   norm  = √(Σ_p ‖g_p‖²)
//   coef  = max_norm / (norm + 1e-6)
//   g_p  ← g_p * coef            only when coef < 1
//
// Mixed precision (half-precision float backends):
//   loss' = loss * S             before backward
//   g    ← g / S                 before clipping and the step
//   non-finite g → skip the step, S ← S * 0.5
//   2000 finite steps in a row   → S ← S * 2
//
// With a 32-bit backend the strategy is the identity.
//
// Reference: Pascanu et al. (2013) On the difficulty of training RNNs
//            Micikevicius et al. (2018) Mixed Precision Training

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

const CLIP_EPSILON: f64 = 1e-6;

// ─── Gradient visitors ────────────────────────────────────────────────────────
struct GradNormVisitor<'a, B: AutodiffBackend> {
    grads:  &'a GradientsParams,
    sum_sq: f64,
    _b:     PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNormVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum_sq += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct GradScaleVisitor<'a, B: AutodiffBackend> {
    grads:  &'a mut GradientsParams,
    factor: f64,
    _b:     PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScaleVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.factor));
        }
    }
}

/// L2 norm over all gradients of `model`, as if concatenated.
/// NaN or infinite when any gradient is.
pub fn global_grad_norm<B, M>(model: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradNormVisitor::<B> { grads, sum_sq: 0.0, _b: PhantomData };
    model.visit(&mut visitor);
    visitor.sum_sq.sqrt()
}

/// Multiply every gradient of `model` by `factor`.
pub fn scale_grads<B, M>(model: &M, mut grads: GradientsParams, factor: f64) -> GradientsParams
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradScaleVisitor::<B> { grads: &mut grads, factor, _b: PhantomData };
    model.visit(&mut visitor);
    grads
}

/// Rescale gradients so their global norm is at most `max_norm`.
/// `norm` is the already-measured global norm.
pub fn clip_to_norm<B, M>(model: &M, grads: GradientsParams, norm: f64, max_norm: f64) -> GradientsParams
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let coef = max_norm / (norm + CLIP_EPSILON);
    if coef < 1.0 {
        scale_grads::<B, M>(model, grads, coef)
    } else {
        grads
    }
}

// ─── LossScaling ──────────────────────────────────────────────────────────────
/// How the loss is turned into gradients for one optimizer step.
pub trait LossScaling<B: AutodiffBackend, M: AutodiffModule<B>> {
    /// Back-propagate `loss` (possibly scaled) and collect gradients.
    fn scale_and_backward(&self, loss: Tensor<B, 1>, model: &M) -> GradientsParams;

    /// Undo the loss scale so clipping sees true gradient magnitudes.
    fn unscale_before_clip(&self, model: &M, grads: GradientsParams) -> GradientsParams;

    /// Feed back whether this step's gradients were finite.
    /// Returns true when the optimizer step should be applied.
    fn update(&mut self, grads_finite: bool) -> bool;

    /// Current loss scale (1.0 for full precision).
    fn scale(&self) -> f64;

    /// Whether gradients must be checked for overflow every step.
    fn tracks_overflow(&self) -> bool;
}

/// Identity strategy for 32-bit training.
#[derive(Debug, Default, Clone)]
pub struct FullPrecision;

impl<B: AutodiffBackend, M: AutodiffModule<B>> LossScaling<B, M> for FullPrecision {
    fn scale_and_backward(&self, loss: Tensor<B, 1>, model: &M) -> GradientsParams {
        GradientsParams::from_grads(loss.backward(), model)
    }

    fn unscale_before_clip(&self, _model: &M, grads: GradientsParams) -> GradientsParams {
        grads
    }

    fn update(&mut self, _grads_finite: bool) -> bool { true }

    fn scale(&self) -> f64 { 1.0 }

    fn tracks_overflow(&self) -> bool { false }
}

/// Dynamic loss scaler for half-precision backends.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicLossScaler {
    scale:           f64,
    growth_factor:   f64,
    backoff_factor:  f64,
    growth_interval: usize,
    good_steps:      usize,
}

impl DynamicLossScaler {
    pub fn new(init_scale: f64, growth_factor: f64, backoff_factor: f64, growth_interval: usize) -> Self {
        Self {
            scale: init_scale,
            growth_factor,
            backoff_factor,
            growth_interval: growth_interval.max(1),
            good_steps: 0,
        }
    }
}

impl Default for DynamicLossScaler {
    fn default() -> Self {
        Self::new(65536.0, 2.0, 0.5, 2000)
    }
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> LossScaling<B, M> for DynamicLossScaler {
    fn scale_and_backward(&self, loss: Tensor<B, 1>, model: &M) -> GradientsParams {
        GradientsParams::from_grads(loss.mul_scalar(self.scale).backward(), model)
    }

    fn unscale_before_clip(&self, model: &M, grads: GradientsParams) -> GradientsParams {
        scale_grads::<B, M>(model, grads, 1.0 / self.scale)
    }

    fn update(&mut self, grads_finite: bool) -> bool {
        if !grads_finite {
            self.scale     *= self.backoff_factor;
            self.good_steps = 0;
            tracing::warn!("Gradient overflow, loss scale reduced to {}", self.scale);
            return false;
        }

        self.good_steps += 1;
        if self.good_steps == self.growth_interval {
            self.scale     *= self.growth_factor;
            self.good_steps = 0;
            tracing::debug!("Loss scale increased to {}", self.scale);
        }
        true
    }

    fn scale(&self) -> f64 { self.scale }

    fn tracks_overflow(&self) -> bool { true }
}

/// Whether the backend computes in a float type narrower than 32 bits.
pub fn backend_is_half_precision<B: Backend>() -> bool {
    std::mem::size_of::<B::FloatElem>() < 4
}

/// Pick the loss-scaling strategy once, at trainer construction.
pub fn select_loss_scaling<B, M>(fp16: bool) -> Box<dyn LossScaling<B, M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    match (fp16, backend_is_half_precision::<B>()) {
        (true, true) => {
            tracing::info!("Mixed precision enabled with dynamic loss scaling");
            Box::new(DynamicLossScaler::default())
        }
        (true, false) => {
            tracing::warn!("fp16 requested but the backend computes in 32-bit floats; training in full precision");
            Box::new(FullPrecision)
        }
        _ => Box::new(FullPrecision),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        nn::{Linear, LinearConfig},
    };

    type TestBackend = Autodiff<NdArray>;

    /// loss = Σ (x·W + b) with x = ones[1, 3]:
    /// every weight and bias gradient is 1, so the norm is √8.
    fn model_and_grads() -> (Linear<TestBackend>, GradientsParams) {
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        let loss  = model.forward(Tensor::<TestBackend, 2>::ones([1, 3], &device)).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        (model, grads)
    }

    #[test]
    fn test_global_norm() {
        let (model, grads) = model_and_grads();
        let norm = global_grad_norm(&model, &grads);
        assert!((norm - 8f64.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_scale_grads_scales_norm() {
        let (model, grads) = model_and_grads();
        let grads = scale_grads(&model, grads, 0.5);
        assert!((global_grad_norm(&model, &grads) - 0.5 * 8f64.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_clip_reduces_large_norm() {
        let (model, grads) = model_and_grads();
        let norm           = global_grad_norm(&model, &grads);
        let clipped        = clip_to_norm(&model, grads, norm, 1.0);
        assert!((global_grad_norm(&model, &clipped) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_clip_leaves_small_norm() {
        let (model, grads) = model_and_grads();
        let norm           = global_grad_norm(&model, &grads);
        let clipped        = clip_to_norm(&model, grads, norm, 10.0);
        assert!((global_grad_norm(&model, &clipped) - 8f64.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_dynamic_scaler_backs_off_and_grows() {
        let mut scaler = DynamicLossScaler::new(8.0, 2.0, 0.5, 2);

        assert!(!LossScaling::<TestBackend, Linear<TestBackend>>::update(&mut scaler, false));
        assert_eq!(LossScaling::<TestBackend, Linear<TestBackend>>::scale(&scaler), 4.0);

        assert!(LossScaling::<TestBackend, Linear<TestBackend>>::update(&mut scaler, true));
        assert_eq!(LossScaling::<TestBackend, Linear<TestBackend>>::scale(&scaler), 4.0);
        assert!(LossScaling::<TestBackend, Linear<TestBackend>>::update(&mut scaler, true));
        assert_eq!(LossScaling::<TestBackend, Linear<TestBackend>>::scale(&scaler), 8.0);
    }

    #[test]
    fn test_dynamic_scaler_unscales_gradients() {
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(3, 2).init(&device);
        let scaler = DynamicLossScaler::new(4.0, 2.0, 0.5, 2000);

        let loss  = model.forward(Tensor::<TestBackend, 2>::ones([1, 3], &device)).sum();
        let grads = scaler.scale_and_backward(loss, &model);
        assert!((global_grad_norm(&model, &grads) - 4.0 * 8f64.sqrt()).abs() < 1e-4);

        let grads = LossScaling::<TestBackend, Linear<TestBackend>>::unscale_before_clip(&scaler, &model, grads);
        assert!((global_grad_norm(&model, &grads) - 8f64.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_fp16_on_f32_backend_falls_back_to_full_precision() {
        assert!(!backend_is_half_precision::<NdArray>());
        let strategy = select_loss_scaling::<TestBackend, Linear<TestBackend>>(true);
        assert_eq!(strategy.scale(), 1.0);
        assert!(!strategy.tracks_overflow());
    }
}
