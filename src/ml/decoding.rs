// ============================================================
// Layer 5 — Decoding (Greedy and Beam Search)
// ============================================================
// Turns an encoded source sentence into target token ids.
//
// Greedy:
//   [SOS] → decode prefix → arg-max of last position → append
//   repeat up to max_length times, stop right after [EOS].
//
// Beam search (Wu et al. 2016 length penalty):
//   keep `beam_size` candidates {tokens, score}
//   each step, every unfinished candidate is expanded with its
//   `beam_size` best next tokens:
//
//       score' = score + log_softmax(logits)[token] / lp(len + 1)
//       lp(l)  = (5 + l)^α / (5 + 1)^α          α = 0.6
//
//   finished candidates (ending in [EOS]) are carried unchanged;
//   the merged list is sorted by score and cut back to beam_size.
//   Stops early once every survivor is finished.
//
// Both procedures only read the model. Callers pass the
// inference module (`model.valid()`), so dropout is off.
//
// Reference: Wu et al. (2016) Google's NMT System, §7

use anyhow::{anyhow, Result};
use burn::{
    nn::attention::generate_autoregressive_mask,
    prelude::*,
    tensor::activation::log_softmax,
};

use crate::domain::tokens::SpecialTokens;
use crate::ml::model::Seq2Seq;

/// Default α of the length penalty
pub const LENGTH_PENALTY_ALPHA: f64 = 0.6;

/// Length penalty `(5 + length)^alpha / 6^alpha`.
pub fn length_penalty(length: usize, alpha: f64) -> f64 {
    (5.0 + length as f64).powf(alpha) / 6.0f64.powf(alpha)
}

// ─── Shared helpers ───────────────────────────────────────────────────────────

/// [1, len] Int tensor from token ids
fn ids_tensor<B: Backend>(ids: &[u32], device: &B::Device) -> Tensor<B, 2, Int> {
    let ids: Vec<i32> = ids.iter().map(|&id| id as i32).collect();
    Tensor::<B, 1, Int>::from_ints(ids.as_slice(), device).unsqueeze::<2>()
}

/// Encode the source once; returns the memory and its pad mask.
fn encode_source<B: Backend, M: Seq2Seq<B>>(
    model:  &M,
    source: &[u32],
    device: &B::Device,
) -> (Tensor<B, 3>, Tensor<B, 2, Bool>) {
    let source = ids_tensor::<B>(source, device);
    let mask   = source.clone().equal_elem(model.source_pad_id() as i32);
    (model.encode(source, mask.clone()), mask)
}

/// Vocabulary logits for the position after `prefix`: [vocab]
fn next_token_logits<B: Backend, M: Seq2Seq<B>>(
    model:       &M,
    memory:      &Tensor<B, 3>,
    memory_mask: &Tensor<B, 2, Bool>,
    prefix:      &[u32],
    device:      &B::Device,
) -> Tensor<B, 1> {
    let len    = prefix.len();
    let target = ids_tensor::<B>(prefix, device);
    let causal = generate_autoregressive_mask::<B>(1, len, device);

    let hidden = model.decode(memory.clone(), memory_mask.clone(), target, causal);
    let [_, _, d_model] = hidden.dims();
    let last = hidden.slice([0..1, len - 1..len, 0..d_model]);

    let logits = model.project(last);
    let [_, _, vocab] = logits.dims();
    logits.reshape([vocab])
}

/// The `k` largest values as (index, value), best first.
/// Ties go to the lower index.
fn top_k(values: &[f32], k: usize) -> Vec<(u32, f32)> {
    let order = |&a: &usize, &b: &usize| values[b].total_cmp(&values[a]).then(a.cmp(&b));

    let mut idx: Vec<usize> = (0..values.len()).collect();
    if k < idx.len() {
        idx.select_nth_unstable_by(k, order);
        idx.truncate(k);
    }
    idx.sort_by(order);
    idx.into_iter().map(|i| (i as u32, values[i])).collect()
}

// ─── Teacher forcing ──────────────────────────────────────────────────────────

pub struct TeacherForcedOutput<B: Backend> {
    /// [batch, seq_length, target_vocab]
    pub logits:      Tensor<B, 3>,
    /// Arg-max token per position: [batch, seq_length]
    pub predictions: Tensor<B, 2, Int>,
}

/// One parallel decoder pass where position i sees the ground
/// truth tokens up to i. Used for training and evaluation.
pub fn decode_with_teacher_forcing<B: Backend, M: Seq2Seq<B>>(
    model:         &M,
    encoder_input: Tensor<B, 2, Int>,
    decoder_input: Tensor<B, 2, Int>,
) -> TeacherForcedOutput<B> {
    let logits = model.forward_logits(encoder_input, decoder_input);
    let [batch_size, seq_length, _] = logits.dims();

    // argmax keeps the reduced dim: [batch, seq, 1]
    let predictions = logits.clone().argmax(2).reshape([batch_size, seq_length]);

    TeacherForcedOutput { logits, predictions }
}

// ─── Greedy ───────────────────────────────────────────────────────────────────

/// Greedy search. The result starts with [SOS] and holds at most
/// `max_length + 1` ids; it ends with [EOS] iff the model produced it.
pub fn greedy_decode<B: Backend, M: Seq2Seq<B>>(
    model:      &M,
    source:     &[u32],
    tokens:     &SpecialTokens,
    max_length: usize,
) -> Result<Vec<u32>> {
    let device = model.device();
    let (memory, memory_mask) = encode_source(model, source, &device);

    let mut output = vec![tokens.sos];
    for _ in 0..max_length {
        let logits = next_token_logits(model, &memory, &memory_mask, &output, &device);
        let next   = logits.argmax(0).into_scalar().elem::<i64>() as u32;

        output.push(next);
        if next == tokens.eos {
            break;
        }
    }

    Ok(output)
}

// ─── Beam search ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub tokens: Vec<u32>,
    /// Sum of length-penalised log-probabilities
    pub score:  f64,
}

impl Candidate {
    fn start(sos: u32) -> Self {
        Self { tokens: vec![sos], score: 0.0 }
    }

    fn extend(&self, token: u32, weighted_log_prob: f64) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(token);
        Self { tokens, score: self.score + weighted_log_prob }
    }

    fn is_finished(&self, eos: u32) -> bool {
        self.tokens.last() == Some(&eos)
    }
}

/// Beam search returning up to `return_top_k` sequences, best first,
/// each starting with [SOS].
///
/// Panics when `max_length` is 0, or if the beam ever ends up with
/// fewer than `beam_size` candidates, which can only happen when
/// `beam_size` exceeds the target vocabulary.
pub fn beam_decode<B: Backend, M: Seq2Seq<B>>(
    model:        &M,
    source:       &[u32],
    tokens:       &SpecialTokens,
    beam_size:    usize,
    max_length:   usize,
    return_top_k: usize,
) -> Result<Vec<Vec<u32>>> {
    Ok(beam_candidates(model, source, tokens, beam_size, max_length)?
        .into_iter()
        .take(return_top_k)
        .map(|cand| cand.tokens)
        .collect())
}

/// Full final beam with scores, best first.
pub fn beam_candidates<B: Backend, M: Seq2Seq<B>>(
    model:      &M,
    source:     &[u32],
    tokens:     &SpecialTokens,
    beam_size:  usize,
    max_length: usize,
) -> Result<Vec<Candidate>> {
    assert!(beam_size >= 1, "beam_size must be at least 1");
    assert!(max_length >= 1, "max_length must be at least 1 for beam search");

    let device = model.device();
    let (memory, memory_mask) = encode_source(model, source, &device);

    let mut cands = vec![Candidate::start(tokens.sos)];
    for _ in 0..max_length {
        let mut expanded = Vec::with_capacity(cands.len() * beam_size);

        for cand in cands {
            if cand.is_finished(tokens.eos) {
                expanded.push(cand);
                continue;
            }

            let logits    = next_token_logits(model, &memory, &memory_mask, &cand.tokens, &device);
            let log_probs = log_softmax(logits, 0)
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| anyhow!("Cannot read log-probabilities: {e:?}"))?;

            let penalty = length_penalty(cand.tokens.len() + 1, LENGTH_PENALTY_ALPHA);
            for (token, log_prob) in top_k(&log_probs, beam_size) {
                expanded.push(cand.extend(token, log_prob as f64 / penalty));
            }
        }

        // stable: equal scores keep expansion order
        expanded.sort_by(|a, b| b.score.total_cmp(&a.score));
        expanded.truncate(beam_size);
        cands = expanded;

        if cands.iter().all(|cand| cand.is_finished(tokens.eos)) {
            break;
        }
    }

    assert_eq!(
        cands.len(),
        beam_size,
        "beam search ended with {} candidates instead of {}",
        cands.len(),
        beam_size,
    );
    Ok(cands)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    const START: u32 = 0;
    const END:   u32 = 1;
    const A:     u32 = 2;
    const B_TOK: u32 = 3;
    const TOKENS: SpecialTokens = SpecialTokens { pad: 9, sos: START, eos: END };

    /// Model whose next-token logits depend only on the prefix length.
    /// `decode` encodes the position (1-based) in the hidden state so
    /// `project` can recover the prefix length of the last position.
    pub(crate) struct ScriptedModel {
        pub script: fn(usize) -> Vec<f32>,
    }

    impl Seq2Seq<TestBackend> for ScriptedModel {
        fn encode(&self, source: Tensor<TestBackend, 2, Int>, _mask: Tensor<TestBackend, 2, Bool>) -> Tensor<TestBackend, 3> {
            let [batch, len] = source.dims();
            Tensor::zeros([batch, len, 1], &self.device())
        }

        fn decode(
            &self,
            _memory: Tensor<TestBackend, 3>,
            _memory_mask: Tensor<TestBackend, 2, Bool>,
            target: Tensor<TestBackend, 2, Int>,
            _causal: Tensor<TestBackend, 3, Bool>,
        ) -> Tensor<TestBackend, 3> {
            let [_, len] = target.dims();
            Tensor::<TestBackend, 1, Int>::arange(1..len as i64 + 1, &self.device())
                .float()
                .reshape([1, len, 1])
        }

        fn project(&self, hidden: Tensor<TestBackend, 3>) -> Tensor<TestBackend, 3> {
            let prefix_len = hidden.max().into_scalar().elem::<f32>() as usize;
            let row   = (self.script)(prefix_len);
            let vocab = row.len();
            Tensor::<TestBackend, 1>::from_floats(row.as_slice(), &self.device()).reshape([1, 1, vocab])
        }

        fn device(&self) -> <TestBackend as Backend>::Device {
            Default::default()
        }

        fn source_pad_id(&self) -> u32 { TOKENS.pad }

        fn target_pad_id(&self) -> u32 { TOKENS.pad }
    }

    /// a > b > start, [EOS] never competitive
    fn never_ends(_len: usize) -> Vec<f32> {
        vec![-2.0, -20.0, 0.0, -1.0]
    }

    /// a for the first three tokens, then [EOS]
    fn ends_after_three(len: usize) -> Vec<f32> {
        if len <= 3 { vec![-5.0, -3.0, 0.0, -1.0] } else { vec![-5.0, 0.0, -2.0, -3.0] }
    }

    #[test]
    fn test_length_penalty_at_zero() {
        let alpha = 0.6;
        assert!((length_penalty(0, alpha) - (5.0f64 / 6.0).powf(alpha)).abs() < 1e-12);
    }

    #[test]
    fn test_length_penalty_is_increasing() {
        for len in 0..50 {
            assert!(length_penalty(len + 1, 0.6) > length_penalty(len, 0.6));
        }
        assert!((length_penalty(1, 0.6) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_penalty_without_alpha_is_one() {
        for len in [0, 1, 7, 120] {
            assert_eq!(length_penalty(len, 0.0), 1.0);
        }
    }

    #[test]
    fn test_top_k_orders_and_breaks_ties_by_index() {
        let picked = top_k(&[0.1, 0.9, 0.5, 0.9], 3);
        assert_eq!(picked, vec![(1, 0.9), (3, 0.9), (2, 0.5)]);
        assert_eq!(top_k(&[0.3, 0.2], 5).len(), 2);
    }

    #[test]
    fn test_greedy_stops_after_end_token() {
        let model  = ScriptedModel { script: ends_after_three };
        let output = greedy_decode(&model, &[5, 6], &TOKENS, 10).unwrap();
        assert_eq!(output, vec![START, A, A, A, END]);
    }

    #[test]
    fn test_greedy_respects_max_length() {
        let model  = ScriptedModel { script: never_ends };
        let output = greedy_decode(&model, &[5, 6], &TOKENS, 5).unwrap();
        assert_eq!(output.len(), 6);
        assert_eq!(output[0], START);
        assert!(output[1..].iter().all(|&t| t == A));
    }

    #[test]
    fn test_beam_returns_full_beam_of_max_length() {
        let model = ScriptedModel { script: never_ends };
        let cands = beam_decode(&model, &[5], &TOKENS, 3, 5, 3).unwrap();

        assert_eq!(cands.len(), 3);
        for cand in &cands {
            assert_eq!(cand.len(), 6);
            assert_eq!(cand[0], START);
            assert!(!cand.contains(&END));
        }
        assert_eq!(cands[0], vec![START, A, A, A, A, A]);
    }

    #[test]
    fn test_beam_keeps_exactly_beam_size_and_scores_descend() {
        let model = ScriptedModel { script: never_ends };
        let cands = beam_candidates(&model, &[5], &TOKENS, 3, 4).unwrap();
        assert_eq!(cands.len(), 3);
        assert!(cands.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_beam_top_k_slices_best_first() {
        let model = ScriptedModel { script: never_ends };
        let best  = beam_decode(&model, &[5], &TOKENS, 3, 5, 1).unwrap();
        assert_eq!(best, vec![vec![START, A, A, A, A, A]]);

        let two = beam_decode(&model, &[5], &TOKENS, 3, 5, 2).unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two[1].iter().filter(|&&t| t == B_TOK).count(), 1);
    }

    #[test]
    fn test_beam_carries_finished_candidates_and_stops_early() {
        let model = ScriptedModel { script: ends_after_three };
        let cands = beam_candidates(&model, &[5], &TOKENS, 2, 20).unwrap();

        assert_eq!(cands.len(), 2);
        assert!(cands.iter().all(|c| c.tokens.last() == Some(&END)));
        assert_eq!(cands[0].tokens, vec![START, A, A, A, END]);
        assert!(cands.iter().all(|c| c.tokens.len() < 21));
    }

    #[test]
    fn test_beam_of_one_matches_greedy() {
        for script in [never_ends as fn(usize) -> Vec<f32>, ends_after_three] {
            let model  = ScriptedModel { script };
            let greedy = greedy_decode(&model, &[5], &TOKENS, 6).unwrap();
            let beam   = beam_decode(&model, &[5], &TOKENS, 1, 6, 1).unwrap();
            assert_eq!(beam, vec![greedy]);
        }
    }

    #[test]
    fn test_greedy_zero_max_length_returns_start_only() {
        let model = ScriptedModel { script: never_ends };
        assert_eq!(greedy_decode(&model, &[5], &TOKENS, 0).unwrap(), vec![START]);
    }

    #[test]
    #[should_panic(expected = "max_length must be at least 1")]
    fn test_beam_zero_max_length_panics() {
        let model = ScriptedModel { script: never_ends };
        let _ = beam_decode(&model, &[5], &TOKENS, 3, 0, 1);
    }

    #[test]
    #[should_panic(expected = "beam search ended with")]
    fn test_beam_wider_than_vocabulary_panics() {
        let model = ScriptedModel { script: never_ends };
        let _ = beam_candidates(&model, &[5], &TOKENS, 5, 1);
    }
}
