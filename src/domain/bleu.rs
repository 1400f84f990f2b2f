// ============================================================
// Layer 3 — Corpus BLEU
// ============================================================
// Papineni et al. (2002). For every n in 1..=max_order:
//
//   p_n    = Σ clipped n-gram matches / Σ candidate n-grams
//   BP     = 1                     if c > r
//            exp(1 - r / c)        otherwise
//   BLEU-n = BP * exp( (1/n) Σ_{k=1..n} ln p_k )
//
// c and r are the summed candidate and reference lengths over the
// whole corpus (counts are pooled before dividing, which is what
// makes it a corpus score rather than an average of sentence
// scores). Any p_k == 0 makes BLEU-n zero.
//
// Works on any hashable token type; the trainer scores target
// token ids with the special tokens stripped.

use std::collections::HashMap;
use std::hash::Hash;

fn ngram_counts<T: Eq + Hash + Clone>(tokens: &[T], n: usize) -> HashMap<Vec<T>, usize> {
    let mut counts = HashMap::new();
    if n == 0 || tokens.len() < n {
        return counts;
    }
    for window in tokens.windows(n) {
        *counts.entry(window.to_vec()).or_insert(0) += 1;
    }
    counts
}

/// BLEU-1..=`max_order` of `candidates` against one reference each.
///
/// Returns `max_order` scores in [0, 1]. Empty input scores zero.
pub fn corpus_bleu<T: Eq + Hash + Clone>(
    candidates: &[Vec<T>],
    references: &[Vec<T>],
    max_order:  usize,
) -> Vec<f64> {
    assert_eq!(
        candidates.len(),
        references.len(),
        "every candidate needs exactly one reference"
    );

    let mut matches  = vec![0usize; max_order];
    let mut possible = vec![0usize; max_order];
    let mut cand_len = 0usize;
    let mut ref_len  = 0usize;

    for (cand, reference) in candidates.iter().zip(references) {
        cand_len += cand.len();
        ref_len  += reference.len();

        for n in 1..=max_order {
            let cand_counts = ngram_counts(cand, n);
            let ref_counts  = ngram_counts(reference, n);

            for (gram, count) in &cand_counts {
                let clip = ref_counts.get(gram).copied().unwrap_or(0);
                matches[n - 1] += (*count).min(clip);
            }
            possible[n - 1] += cand.len().saturating_sub(n - 1);
        }
    }

    if cand_len == 0 {
        return vec![0.0; max_order];
    }

    let brevity = if cand_len > ref_len {
        1.0
    } else {
        (1.0 - ref_len as f64 / cand_len as f64).exp()
    };

    let mut scores   = Vec::with_capacity(max_order);
    let mut log_sum  = 0.0f64;
    let mut all_hits = true;

    for n in 0..max_order {
        if matches[n] == 0 || possible[n] == 0 {
            all_hits = false;
        } else {
            log_sum += (matches[n] as f64 / possible[n] as f64).ln();
        }

        let score = if all_hits {
            brevity * (log_sum / (n + 1) as f64).exp()
        } else {
            0.0
        };
        scores.push(score);
    }

    scores
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_identical_corpus_scores_one() {
        let cands = vec![words("the cat sat on the mat")];
        let refs  = vec![words("the cat sat on the mat")];
        for score in corpus_bleu(&cands, &refs, 4) {
            assert!((score - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_disjoint_corpus_scores_zero() {
        let cands = vec![words("a b c d")];
        let refs  = vec![words("w x y z")];
        assert_eq!(corpus_bleu(&cands, &refs, 4), vec![0.0; 4]);
    }

    #[test]
    fn test_matches_are_clipped_by_reference_counts() {
        // "the the the the" vs "the cat": only one "the" may match
        let cands = vec![words("the the the the")];
        let refs  = vec![words("the cat")];
        let bleu1 = corpus_bleu(&cands, &refs, 1)[0];
        assert!((bleu1 - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_short_candidate_is_penalised() {
        let cands = vec![words("the cat")];
        let refs  = vec![words("the cat sat on the mat")];
        let bleu1 = corpus_bleu(&cands, &refs, 1)[0];
        let expected = (1.0f64 - 6.0 / 2.0).exp();
        assert!((bleu1 - expected).abs() < 1e-12);
    }

    #[test]
    fn test_higher_orders_never_exceed_lower_without_brevity() {
        let cands = vec![words("the cat is on the mat today")];
        let refs  = vec![words("the cat sat on the mat")];
        let scores = corpus_bleu(&cands, &refs, 4);
        assert!(scores[0] >= scores[1]);
        assert_eq!(scores.len(), 4);
    }

    #[test]
    fn test_empty_candidates_score_zero() {
        let cands: Vec<Vec<u32>> = vec![vec![]];
        let refs:  Vec<Vec<u32>> = vec![vec![4, 5]];
        assert_eq!(corpus_bleu(&cands, &refs, 4), vec![0.0; 4]);
    }
}
