use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::classifier::SoftmaxClassifier;
use crate::config::{BacktestConfig, ClassifierConfig, Config};
use crate::ensemble::{ComponentSet, Ensemble, EnsembleWeights};
use crate::model::{Distribution, Observation, Round};

/// Member outputs for round `index`, computed from `entries[..index]` only.
#[derive(Debug, Clone)]
pub struct StepComponents {
    pub index: usize,
    pub components: Vec<ComponentSet>,
    pub actual: Round,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestStep {
    pub index: usize,
    pub distributions: Vec<Distribution>,
    pub predicted: Round,
    pub actual: Round,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccuracySummary {
    pub rounds: usize,
    pub rounds_correct: usize,
    pub slots: usize,
    pub slots_correct: usize,
}

impl AccuracySummary {
    pub fn round_accuracy(&self) -> f64 {
        if self.rounds == 0 {
            0.0
        } else {
            self.rounds_correct as f64 / self.rounds as f64
        }
    }

    pub fn slot_accuracy(&self) -> f64 {
        if self.slots == 0 {
            0.0
        } else {
            self.slots_correct as f64 / self.slots as f64
        }
    }

    fn record(&mut self, predicted: &Round, actual: &Round) {
        let hits = predicted
            .slots()
            .iter()
            .zip(actual.slots().iter())
            .filter(|(p, a)| p == a)
            .count();
        self.rounds += 1;
        self.slots += actual.width();
        self.slots_correct += hits;
        if hits == actual.width() {
            self.rounds_correct += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub summary: AccuracySummary,
    pub steps: Vec<BacktestStep>,
    pub cancelled: bool,
}

/// Leakage-free sequential backtest. Every prediction for round `i` is built
/// from `entries[..i]`; the classifier is refit at fixed checkpoints
/// `min_train + k * retrain_every`, each on the prefix ending at the
/// checkpoint, so results for a step never depend on later rounds.
#[derive(Debug, Clone)]
pub struct WalkForwardEvaluator {
    ensemble: Ensemble,
    classifier_cfg: ClassifierConfig,
    backtest: BacktestConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl WalkForwardEvaluator {
    pub fn new(ensemble: Ensemble, classifier_cfg: ClassifierConfig, backtest: BacktestConfig) -> Self {
        Self {
            ensemble,
            classifier_cfg,
            backtest,
            cancel: None,
        }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            Ensemble::from_config(cfg)?,
            cfg.classifier,
            cfg.backtest,
        ))
    }

    /// Checked between walk-forward steps; a raised flag stops further work.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn min_train(&self) -> usize {
        self.backtest.min_train.max(1)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Member outputs for every scored step, in index order.
    pub fn collect(&self, entries: &[Observation], train_classifier: bool) -> Vec<StepComponents> {
        let start = self.min_train();
        if entries.len() <= start {
            return Vec::new();
        }
        let every = self.backtest.retrain_every.max(1);
        let n = self.ensemble.alphabet_len();
        let checkpoints: Vec<usize> = (start..entries.len()).step_by(every).collect();

        let groups: Vec<Vec<StepComponents>> = checkpoints
            .par_iter()
            .map(|&checkpoint| {
                let classifier = if train_classifier && !self.is_cancelled() {
                    let prefix = &entries[..checkpoint];
                    let samples = self
                        .ensemble
                        .extractor()
                        .training_samples(prefix, self.classifier_cfg.train_window);
                    let mut rng = StdRng::seed_from_u64(step_seed(self.backtest.seed, checkpoint));
                    SoftmaxClassifier::fit(n, &samples, &self.classifier_cfg, &mut rng)
                } else {
                    SoftmaxClassifier::untrained(n)
                };
                let end = (checkpoint + every).min(entries.len());
                let mut out = Vec::with_capacity(end - checkpoint);
                for index in checkpoint..end {
                    if self.is_cancelled() {
                        break;
                    }
                    out.push(StepComponents {
                        index,
                        components: self.ensemble.components(&entries[..index], &classifier),
                        actual: entries[index].round.clone(),
                    });
                }
                out
            })
            .collect();

        let mut steps: Vec<StepComponents> = groups.into_iter().flatten().collect();
        if self.is_cancelled() {
            // Keep only the contiguous prefix of completed steps.
            let contiguous = steps
                .iter()
                .enumerate()
                .take_while(|(k, s)| s.index == start + k)
                .count();
            steps.truncate(contiguous);
        }
        steps
    }

    /// Scores collected steps under `weights`. Tie-breaks use a generator
    /// seeded per step index, so any weight vector scores deterministically.
    pub fn score(&self, steps: &[StepComponents], weights: &EnsembleWeights) -> AccuracySummary {
        let mut summary = AccuracySummary::default();
        for step in steps {
            let mut rng = StdRng::seed_from_u64(step_seed(self.backtest.seed, step.index));
            let forecast =
                self.ensemble
                    .forecast_from_components(&step.components, weights, &mut rng);
            summary.record(&forecast.picks(), &step.actual);
        }
        summary
    }

    pub fn evaluate(&self, entries: &[Observation], weights: &EnsembleWeights) -> BacktestReport {
        let collected = self.collect(entries, weights.classifier > 0.0);
        let mut summary = AccuracySummary::default();
        let steps: Vec<BacktestStep> = collected
            .iter()
            .map(|step| {
                let mut rng = StdRng::seed_from_u64(step_seed(self.backtest.seed, step.index));
                let forecast =
                    self.ensemble
                        .forecast_from_components(&step.components, weights, &mut rng);
                let predicted = forecast.picks();
                summary.record(&predicted, &step.actual);
                BacktestStep {
                    index: step.index,
                    distributions: forecast.slots.into_iter().map(|s| s.distribution).collect(),
                    predicted,
                    actual: step.actual.clone(),
                }
            })
            .collect();
        let cancelled = self.is_cancelled();
        tracing::debug!(
            steps = summary.rounds,
            round_accuracy = summary.round_accuracy(),
            slot_accuracy = summary.slot_accuracy(),
            cancelled,
            "Walk-forward evaluation finished"
        );
        BacktestReport {
            summary,
            steps,
            cancelled,
        }
    }
}

pub(crate) fn step_seed(base: u64, index: usize) -> u64 {
    base ^ (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
