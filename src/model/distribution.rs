use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::outcome::Outcome;

/// Normalization divisor floor. Totals at or below it fall back to uniform.
pub const NORMALIZE_EPSILON: f64 = 1e-12;
pub const DEFAULT_TIE_TOLERANCE: f64 = 1e-9;

/// Categorical distribution over the alphabet, indexed by `Outcome::index`.
/// Always finite, non-negative and summing to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    probs: Vec<f64>,
}

impl Distribution {
    pub fn uniform(n: usize) -> Self {
        let n = n.max(1);
        Self {
            probs: vec![1.0 / n as f64; n],
        }
    }

    /// Normalizes raw non-negative masses. Non-finite or negative entries count
    /// as zero; a degenerate total yields the uniform distribution.
    pub fn from_weights(weights: Vec<f64>) -> Self {
        let mut weights: Vec<f64> = weights
            .into_iter()
            .map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
            .collect();
        let total: f64 = weights.iter().sum();
        if !total.is_finite() || total <= NORMALIZE_EPSILON {
            return Self::uniform(weights.len());
        }
        for w in &mut weights {
            *w /= total;
        }
        Self { probs: weights }
    }

    /// Weighted linear pool of distributions. Parts with non-positive weight
    /// or a mismatched length are skipped.
    pub fn blend(n: usize, parts: &[(f64, &Distribution)]) -> Self {
        let mut acc = vec![0.0; n.max(1)];
        for (w, d) in parts {
            if !w.is_finite() || *w <= 0.0 || d.len() != acc.len() {
                continue;
            }
            for (a, p) in acc.iter_mut().zip(d.probs.iter()) {
                *a += w * p;
            }
        }
        Self::from_weights(acc)
    }

    pub fn len(&self) -> usize {
        self.probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    pub fn prob(&self, outcome: Outcome) -> f64 {
        self.probs.get(outcome.index()).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.probs.iter().sum()
    }

    pub fn max_abs_diff(&self, other: &Distribution) -> f64 {
        if self.len() != other.len() {
            return f64::INFINITY;
        }
        self.probs
            .iter()
            .zip(other.probs.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// Outcomes whose probability is within `tolerance` of the maximum.
    pub fn top_candidates(&self, tolerance: f64) -> Vec<Outcome> {
        let max = self.probs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.probs
            .iter()
            .enumerate()
            .filter(|(_, p)| max - **p <= tolerance.max(0.0))
            .map(|(i, _)| Outcome::from_index(i))
            .collect()
    }

    /// Argmax with ties broken uniformly at random among the tied outcomes.
    pub fn pick<R: Rng + ?Sized>(&self, tolerance: f64, rng: &mut R) -> Outcome {
        let candidates = self.top_candidates(tolerance);
        match candidates.len() {
            0 => Outcome::from_index(0),
            1 => candidates[0],
            n => candidates[rng.gen_range(0..n)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn from_weights_normalizes() {
        let d = Distribution::from_weights(vec![1.0, 3.0]);
        assert!((d.probs()[0] - 0.25).abs() < 1e-12);
        assert!((d.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_weights_fall_back_to_uniform() {
        let d = Distribution::from_weights(vec![0.0, 0.0, 0.0]);
        assert_eq!(d, Distribution::uniform(3));
        let d = Distribution::from_weights(vec![f64::NAN, f64::INFINITY, -1.0]);
        assert_eq!(d, Distribution::uniform(3));
    }

    #[test]
    fn blend_skips_zero_weight_parts() {
        let a = Distribution::from_weights(vec![1.0, 0.0]);
        let b = Distribution::from_weights(vec![0.0, 1.0]);
        let d = Distribution::blend(2, &[(1.0, &a), (0.0, &b)]);
        assert!((d.probs()[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pick_breaks_ties_evenly() {
        let d = Distribution::from_weights(vec![0.5, 0.5, 0.0]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 3];
        for _ in 0..10_000 {
            counts[d.pick(DEFAULT_TIE_TOLERANCE, &mut rng).index()] += 1;
        }
        assert_eq!(counts[2], 0);
        let share = counts[0] as f64 / 10_000.0;
        assert!((0.47..=0.53).contains(&share), "share {}", share);
    }

    #[test]
    fn pick_is_deterministic_without_ties() {
        let d = Distribution::from_weights(vec![0.2, 0.7, 0.1]);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(d.pick(DEFAULT_TIE_TOLERANCE, &mut rng).index(), 1);
    }
}
