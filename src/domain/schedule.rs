// ============================================================
// Layer 3 — Noam Learning-Rate Schedule
// ============================================================
// From Vaswani et al. (2017), §5.3:
//
//   rate(step) = d_model^-0.5 * min(step^-0.5, step * warmup^-1.5)
//
// Linear warm-up for `warmup` steps, then decay with the inverse
// square root of the step. The two branches meet at
// step == warmup, which is where the rate peaks.
//
// `step` is clamped to 1 so step 0 never divides by zero.
//
// NoamSchedule multiplies a base learning rate by this factor and
// remembers how many times it has been stepped; that counter is
// the schedule state stored in checkpoints.

use serde::{Deserialize, Serialize};

/// Noam decay factor for `step`.
pub fn noam_decay(step: usize, d_model: usize, warmup_steps: usize) -> f64 {
    let step    = step.max(1) as f64;
    let d_model = d_model as f64;
    let warmup  = warmup_steps.max(1) as f64;

    d_model.powf(-0.5) * f64::min(step.powf(-0.5), step * warmup.powf(-1.5))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoamSchedule {
    base_lr:      f64,
    d_model:      usize,
    warmup_steps: usize,
    /// Number of completed `step()` calls
    last_step:    usize,
}

impl NoamSchedule {
    pub fn new(base_lr: f64, d_model: usize, warmup_steps: usize) -> Self {
        Self { base_lr, d_model, warmup_steps, last_step: 0 }
    }

    /// Learning rate to use for the upcoming optimizer step.
    pub fn current_lr(&self) -> f64 {
        self.base_lr * noam_decay(self.last_step, self.d_model, self.warmup_steps)
    }

    /// Per-parameter-group rates; there is a single group.
    pub fn last_lrs(&self) -> Vec<f64> {
        vec![self.current_lr()]
    }

    /// Advance by one optimizer step.
    pub fn step(&mut self) {
        self.last_step += 1;
    }

    pub fn last_step(&self) -> usize {
        self.last_step
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_is_positive() {
        assert!(noam_decay(1, 512, 4000) > 0.0);
    }

    #[test]
    fn test_step_zero_is_clamped_to_one() {
        assert_eq!(noam_decay(0, 512, 4000), noam_decay(1, 512, 4000));
        assert!(noam_decay(0, 512, 4000).is_finite());
    }

    #[test]
    fn test_rises_then_falls_with_peak_at_warmup() {
        let warmup = 4000;
        let peak   = noam_decay(warmup, 512, warmup);

        assert!(noam_decay(100, 512, warmup) < noam_decay(2000, 512, warmup));
        assert!(noam_decay(2000, 512, warmup) < peak);
        assert!(noam_decay(warmup + 1, 512, warmup) < peak);
        assert!(noam_decay(20_000, 512, warmup) < noam_decay(8000, 512, warmup));

        for step in [1, 10, 1000, 3999, 4001, 10_000, 100_000] {
            assert!(noam_decay(step, 512, warmup) <= peak);
        }
    }

    #[test]
    fn test_peak_value_matches_formula() {
        let expected = 512f64.powf(-0.5) * 4000f64.powf(-0.5);
        assert!((noam_decay(4000, 512, 4000) - expected).abs() < 1e-15);
    }

    #[test]
    fn test_schedule_scales_base_rate_and_advances() {
        let mut schedule = NoamSchedule::new(2.0, 512, 4000);
        assert_eq!(schedule.current_lr(), 2.0 * noam_decay(1, 512, 4000));

        schedule.step();
        schedule.step();
        assert_eq!(schedule.last_step(), 2);
        assert_eq!(schedule.last_lrs(), vec![2.0 * noam_decay(2, 512, 4000)]);
    }
}
