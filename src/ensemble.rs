use anyhow::{bail, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::classifier::{FeatureExtractor, SoftmaxClassifier};
use crate::config::{Config, EnsembleConfig, EstimatorConfig, StreakConfig};
use crate::estimator::{MarkovModel, PatternModel, SlotMarginalModel, StreakBias};
use crate::model::{Distribution, Observation, Outcome, Round};

/// Contribution sizes of the ensemble members. Normalized to sum to 1 at use
/// time; replaced wholesale, never edited field by field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub slot: f64,
    pub markov: f64,
    pub pattern: f64,
    pub streak: f64,
    #[serde(default)]
    pub classifier: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            slot: 0.35,
            markov: 0.30,
            pattern: 0.20,
            streak: 0.15,
            classifier: 0.0,
        }
    }
}

impl EnsembleWeights {
    pub fn new(slot: f64, markov: f64, pattern: f64, streak: f64) -> Self {
        Self {
            slot,
            markov,
            pattern,
            streak,
            classifier: 0.0,
        }
    }

    fn as_array(&self) -> [f64; 5] {
        [self.slot, self.markov, self.pattern, self.streak, self.classifier]
    }

    pub fn total(&self) -> f64 {
        self.as_array().iter().sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.as_array().iter().any(|w| !w.is_finite() || *w < 0.0) {
            bail!("ensemble weights must be finite and non-negative: {:?}", self);
        }
        if self.total() <= f64::EPSILON {
            bail!("ensemble weights must not all be zero");
        }
        Ok(())
    }

    /// Scaled to sum to 1. Invalid weights fall back to the defaults.
    pub fn normalized(&self) -> Self {
        if self.validate().is_err() {
            return Self::default().normalized();
        }
        let t = self.total();
        Self {
            slot: self.slot / t,
            markov: self.markov / t,
            pattern: self.pattern / t,
            streak: self.streak / t,
            classifier: self.classifier / t,
        }
    }
}

/// Where the streak correction enters the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakPolicy {
    /// Streak-adjust the normalized blend of the other members. A zero streak
    /// weight disables the adjustment.
    #[default]
    PostAdjust,
    /// Streak-adjusted blend enters as a fourth weighted member.
    Weighted,
}

/// Per-slot member outputs for one prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSet {
    pub marginal: Distribution,
    pub markov: Distribution,
    pub pattern: Option<Distribution>,
    pub classifier: Distribution,
    pub streak_tail: Vec<Outcome>,
}

#[derive(Debug, Clone, Copy)]
pub struct EnsembleCombiner {
    n: usize,
    policy: StreakPolicy,
    streak: StreakBias,
    tie_tolerance: f64,
}

impl EnsembleCombiner {
    pub fn new(n: usize, ensemble: &EnsembleConfig, streak: StreakConfig) -> Self {
        Self {
            n: n.max(1),
            policy: ensemble.streak_policy,
            streak: StreakBias::new(streak),
            tie_tolerance: ensemble.tie_tolerance.max(0.0),
        }
    }

    pub fn policy(&self) -> StreakPolicy {
        self.policy
    }

    pub fn streak(&self) -> &StreakBias {
        &self.streak
    }

    pub fn combine(&self, c: &ComponentSet, weights: &EnsembleWeights) -> Distribution {
        let w = weights.normalized();
        // A pattern miss defers to the slot marginal and keeps the pattern weight.
        let pattern = c.pattern.as_ref().unwrap_or(&c.marginal);
        let base = Distribution::blend(
            self.n,
            &[
                (w.slot, &c.marginal),
                (w.markov, &c.markov),
                (w.pattern, pattern),
                (w.classifier, &c.classifier),
            ],
        );
        match self.policy {
            // Only the on/off state of the streak weight matters here.
            StreakPolicy::PostAdjust if w.streak > 0.0 => self.streak.apply(&base, &c.streak_tail),
            StreakPolicy::PostAdjust => base,
            StreakPolicy::Weighted => {
                let adjusted = self.streak.apply(&base, &c.streak_tail);
                Distribution::blend(self.n, &[(1.0 - w.streak, &base), (w.streak, &adjusted)])
            }
        }
    }

    pub fn pick<R: Rng + ?Sized>(&self, dist: &Distribution, rng: &mut R) -> Outcome {
        dist.pick(self.tie_tolerance, rng)
    }
}

/// Count-based models rebuilt from one history prefix.
#[derive(Debug, Clone)]
pub struct ModelSet {
    pub marginal: SlotMarginalModel,
    pub markov: MarkovModel,
    pub pattern: PatternModel,
}

impl ModelSet {
    pub fn build(n: usize, width: usize, cfg: &EstimatorConfig, entries: &[Observation]) -> Self {
        Self {
            marginal: SlotMarginalModel::build(n, width, cfg, entries),
            markov: MarkovModel::build(n, width, cfg, entries),
            pattern: PatternModel::build(n, width, cfg, entries),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotForecast {
    pub slot: usize,
    pub distribution: Distribution,
    pub pick: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub slots: Vec<SlotForecast>,
}

impl Forecast {
    pub fn picks(&self) -> Round {
        Round::new(self.slots.iter().map(|s| s.pick).collect())
    }
}

/// Shape plus immutable hyperparameters of the whole prediction pipeline.
#[derive(Debug, Clone)]
pub struct Ensemble {
    n: usize,
    width: usize,
    estimator: EstimatorConfig,
    combiner: EnsembleCombiner,
    extractor: FeatureExtractor,
}

impl Ensemble {
    pub fn new(
        n: usize,
        width: usize,
        estimator: EstimatorConfig,
        combiner: EnsembleCombiner,
        extractor: FeatureExtractor,
    ) -> Self {
        Self {
            n: n.max(1),
            width: width.max(1),
            estimator,
            combiner,
            extractor,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let n = cfg.alphabet()?.len();
        let width = cfg.game.round_width;
        Ok(Self::new(
            n,
            width,
            cfg.estimator,
            EnsembleCombiner::new(n, &cfg.ensemble, cfg.streak),
            FeatureExtractor::new(n, width, cfg.features),
        ))
    }

    pub fn alphabet_len(&self) -> usize {
        self.n
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn combiner(&self) -> &EnsembleCombiner {
        &self.combiner
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Member outputs for every slot of the round following `entries`.
    pub fn components(
        &self,
        entries: &[Observation],
        classifier: &SoftmaxClassifier,
    ) -> Vec<ComponentSet> {
        let models = ModelSet::build(self.n, self.width, &self.estimator, entries);
        let last = entries.last();
        (0..self.width)
            .map(|slot| {
                let classifier_dist = if classifier.is_trained() {
                    classifier.predict(&self.extractor.extract(entries, entries.len(), slot))
                } else {
                    Distribution::uniform(self.n)
                };
                ComponentSet {
                    marginal: models.marginal.slot_posterior(slot),
                    markov: models.markov.predict(last, slot),
                    pattern: models.pattern.predict(last, slot),
                    classifier: classifier_dist,
                    streak_tail: self.combiner.streak().recent(entries, slot),
                }
            })
            .collect()
    }

    pub fn forecast_from_components<R: Rng + ?Sized>(
        &self,
        components: &[ComponentSet],
        weights: &EnsembleWeights,
        rng: &mut R,
    ) -> Forecast {
        let slots = components
            .iter()
            .enumerate()
            .map(|(slot, c)| {
                let distribution = self.combiner.combine(c, weights);
                let pick = self.combiner.pick(&distribution, rng);
                SlotForecast {
                    slot,
                    distribution,
                    pick,
                }
            })
            .collect();
        Forecast { slots }
    }

    /// Full pipeline: rebuild models from `entries`, blend, adjust, pick.
    pub fn predict<R: Rng + ?Sized>(
        &self,
        entries: &[Observation],
        weights: &EnsembleWeights,
        classifier: &SoftmaxClassifier,
        rng: &mut R,
    ) -> Forecast {
        let components = self.components(entries, classifier);
        self.forecast_from_components(&components, weights, rng)
    }
}
