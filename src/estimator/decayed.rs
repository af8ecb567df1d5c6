use crate::config::EstimatorConfig;
use crate::model::{Distribution, Observation, Outcome};

/// Dirichlet-smoothed, exponentially decayed frequency table.
///
/// Every bucket starts at the prior `alpha`; each historical occurrence adds
/// `decay^age`, where `age` is the distance from the newest element of the
/// prefix. Rebuilt from history on demand, so it carries no state between
/// queries.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayedCounter {
    weights: Vec<f64>,
    evidence: f64,
}

impl DecayedCounter {
    pub fn new(n: usize, alpha: f64) -> Self {
        Self {
            weights: vec![alpha.max(0.0); n.max(1)],
            evidence: 0.0,
        }
    }

    pub fn add(&mut self, outcome: Outcome, weight: f64) {
        if !weight.is_finite() || weight <= 0.0 {
            return;
        }
        if let Some(w) = self.weights.get_mut(outcome.index()) {
            *w += weight;
            self.evidence += weight;
        }
    }

    /// Accumulates every outcome yielded by `extract`, weighting each history
    /// element by its age from the end of `entries`.
    pub fn accumulate<F, I>(n: usize, cfg: &EstimatorConfig, entries: &[Observation], extract: F) -> Self
    where
        F: Fn(&Observation) -> I,
        I: IntoIterator<Item = Outcome>,
    {
        let mut counter = Self::new(n, cfg.alpha);
        let weights = decay_weights(entries.len(), cfg.decay);
        for (entry, w) in entries.iter().zip(weights) {
            for outcome in extract(entry) {
                counter.add(outcome, w);
            }
        }
        counter
    }

    pub fn from_series(n: usize, cfg: &EstimatorConfig, series: &[Outcome]) -> Self {
        let mut counter = Self::new(n, cfg.alpha);
        let weights = decay_weights(series.len(), cfg.decay);
        for (outcome, w) in series.iter().zip(weights) {
            counter.add(*outcome, w);
        }
        counter
    }

    pub fn weight(&self, outcome: Outcome) -> f64 {
        self.weights.get(outcome.index()).copied().unwrap_or(0.0)
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Observed mass, excluding the prior.
    pub fn evidence(&self) -> f64 {
        self.evidence
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().sum()
    }

    pub fn distribution(&self) -> Distribution {
        Distribution::from_weights(self.weights.clone())
    }
}

/// `decay^(len - 1 - i)` for each index `i`; the newest element weighs 1.
pub fn decay_weights(len: usize, decay: f64) -> Vec<f64> {
    let mut out = vec![0.0; len];
    let mut w = 1.0;
    for slot in out.iter_mut().rev() {
        *slot = w;
        w *= decay;
    }
    out
}
