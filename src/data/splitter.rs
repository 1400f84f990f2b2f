// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Carves a validation set out of the training corpus when no
// separate validation files are provided.
//
// The shuffle is seeded: a resumed run must see exactly the same
// split as the run that wrote the checkpoint, otherwise sentences
// seen during training leak into validation.
//
// Reference: rand crate documentation (SliceRandom, StdRng)

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, validation).
///
/// `train_fraction` is clamped to [0, 1].
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let fraction = train_fraction.clamp(0.0, 1.0);
    let split_at = ((total as f64) * fraction).round() as usize;

    let val = samples.split_off(split_at.min(total));

    tracing::debug!(
        "Dataset split (seed {}): {} training, {} validation",
        seed,
        samples.len(),
        val.len(),
    );

    (samples, val)
}
