// ============================================================
// Layer 3 — Stats Accumulator
// ============================================================
// Running loss and token-level accuracy over a stream of
// batches.
//
//   update_step(loss, predictions, labels)
//       loss_sum   += loss
//       step_count += 1
//       correct    += #(prediction == label)       (non-pad only)
//       total      += #positions                   (non-pad only)
//
//   report(sink, name, step)
//       <name>/loss     = loss_sum / step_count
//       <name>/accuracy = correct  / total
//
// The trainer replaces its accumulator with a fresh one right
// after every report, so `report` never mutates.
//
// An all-padding batch leaves `total` at zero; accuracy is then
// reported as 0.0 instead of dividing by zero.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::traits::MetricsSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsAccumulator {
    loss_sum:       f64,
    step_count:     usize,
    correct:        u64,
    total:          u64,
    ignore_padding: bool,
    pad_token_id:   Option<u32>,
}

impl StatsAccumulator {
    /// Fresh accumulator. Padding is only ignored when both
    /// `ignore_padding` is set and a pad id is known.
    pub fn new(ignore_padding: bool, pad_token_id: Option<u32>) -> Self {
        Self {
            loss_sum: 0.0,
            step_count: 0,
            correct: 0,
            total: 0,
            ignore_padding,
            pad_token_id,
        }
    }

    /// Accumulator that counts every position, padding included.
    pub fn counting_all() -> Self {
        Self::new(false, None)
    }

    /// Accumulator that skips positions whose label is `pad_token_id`.
    pub fn ignoring_padding(pad_token_id: u32) -> Self {
        Self::new(true, Some(pad_token_id))
    }

    /// Same configuration, zeroed counters.
    pub fn reset(&self) -> Self {
        Self::new(self.ignore_padding, self.pad_token_id)
    }

    /// Fold one batch into the running totals.
    ///
    /// `predictions` and `labels` are the flattened
    /// `batch_size * seq_length` token ids of the batch.
    pub fn update_step(&mut self, loss: f64, predictions: &[i64], labels: &[i64]) {
        debug_assert_eq!(predictions.len(), labels.len());

        self.loss_sum   += loss;
        self.step_count += 1;

        let pad = match (self.ignore_padding, self.pad_token_id) {
            (true, Some(pad)) => Some(pad as i64),
            _ => None,
        };

        for (&pred, &label) in predictions.iter().zip(labels) {
            if Some(label) == pad {
                continue;
            }
            self.total += 1;
            if pred == label {
                self.correct += 1;
            }
        }
    }

    /// Average loss per step, 0.0 when nothing was recorded.
    pub fn average_loss(&self) -> f64 {
        if self.step_count == 0 {
            0.0
        } else {
            self.loss_sum / self.step_count as f64
        }
    }

    /// Token accuracy, 0.0 when no countable position was seen.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    pub fn step_count(&self) -> usize { self.step_count }

    pub fn correct(&self) -> u64 { self.correct }

    pub fn total(&self) -> u64 { self.total }

    pub fn is_empty(&self) -> bool { self.step_count == 0 }

    /// Emit `<name>/loss` and `<name>/accuracy` at `step`.
    pub fn report(&self, sink: &mut dyn MetricsSink, name: &str, step: usize) -> Result<()> {
        sink.add_scalar(&format!("{name}/loss"), self.average_loss(), step)?;
        sink.add_scalar(&format!("{name}/accuracy"), self.accuracy(), step)?;
        tracing::debug!(
            "{} stats @ step {}: loss={:.4} acc={:.4} ({} / {} tokens)",
            name, step, self.average_loss(), self.accuracy(), self.correct, self.total,
        );
        Ok(())
    }
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::counting_all()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::metrics::MemorySink;

    #[test]
    fn test_averages_loss_over_steps() {
        let mut stats = StatsAccumulator::counting_all();
        stats.update_step(2.0, &[1, 2], &[1, 2]);
        stats.update_step(4.0, &[1, 2], &[1, 2]);
        assert_eq!(stats.step_count(), 2);
        assert!((stats.average_loss() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_padding_excluded_from_accuracy() {
        // pad = 0; the two pad positions are "correct" but must not count
        let mut stats = StatsAccumulator::ignoring_padding(0);
        stats.update_step(1.0, &[5, 6, 0, 0], &[5, 7, 0, 0]);
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.correct(), 1);
        assert!((stats.accuracy() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_padding_counted_when_not_ignored() {
        let mut stats = StatsAccumulator::counting_all();
        stats.update_step(1.0, &[5, 6, 0, 0], &[5, 7, 0, 0]);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.correct(), 3);
    }

    #[test]
    fn test_all_padding_batch_reports_zero_accuracy() {
        let mut stats = StatsAccumulator::ignoring_padding(0);
        stats.update_step(0.7, &[3, 0, 1], &[0, 0, 0]);
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.accuracy(), 0.0);
        assert!(!stats.accuracy().is_nan());

        let mut sink = MemorySink::default();
        stats.report(&mut sink, "train", 10).unwrap();
        assert_eq!(sink.value("train/accuracy", 10), Some(0.0));
    }

    #[test]
    fn test_empty_accumulator_is_well_defined() {
        let stats = StatsAccumulator::ignoring_padding(0);
        assert!(stats.is_empty());
        assert_eq!(stats.average_loss(), 0.0);
        assert_eq!(stats.accuracy(), 0.0);
    }

    #[test]
    fn test_report_does_not_mutate() {
        let mut stats = StatsAccumulator::ignoring_padding(0);
        stats.update_step(1.5, &[4, 4], &[4, 5]);
        let before = stats.clone();

        let mut sink = MemorySink::default();
        stats.report(&mut sink, "valid", 3).unwrap();

        assert_eq!(stats, before);
        assert_eq!(sink.value("valid/loss", 3), Some(1.5));
        assert_eq!(sink.value("valid/accuracy", 3), Some(0.5));
    }

    #[test]
    fn test_reset_keeps_padding_configuration() {
        let mut stats = StatsAccumulator::ignoring_padding(0);
        stats.update_step(1.0, &[1, 0], &[1, 0]);
        let fresh = stats.reset();
        assert!(fresh.is_empty());
        assert_eq!(fresh, StatsAccumulator::ignoring_padding(0));
    }
}
