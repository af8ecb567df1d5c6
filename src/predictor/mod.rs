pub mod metrics;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::classifier::{ClassifierModel, SoftmaxClassifier};
use crate::config::{ClassifierConfig, Config};
use crate::ensemble::{Ensemble, EnsembleWeights, Forecast};
use crate::error::AppError;
use crate::model::{Alphabet, History, Observation, Round};

pub use metrics::{AccuracyAccumulators, AccuracySnapshot, ACCURACY_WINDOW_DEFAULT};

/// Result of comparing the outstanding forecast with the round that arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPrediction {
    pub predicted: Round,
    pub actual: Round,
    pub round_correct: bool,
    pub slot_correct: Vec<bool>,
}

/// One prediction session: history, current weights, latest classifier and
/// the accuracy scorecard. Strictly sequential; one producer appends between
/// prediction cycles.
#[derive(Debug)]
pub struct Predictor {
    alphabet: Alphabet,
    ensemble: Ensemble,
    classifier_cfg: ClassifierConfig,
    history: History,
    weights: EnsembleWeights,
    classifier: SoftmaxClassifier,
    metrics: AccuracyAccumulators,
    pending: Option<Forecast>,
    rng: StdRng,
    since_retrain: usize,
    model_generation: u64,
}

impl Predictor {
    pub fn new(cfg: &Config) -> Result<Self> {
        let alphabet = cfg.alphabet()?;
        let history = History::new(alphabet.clone(), cfg.game.round_width, cfg.game.max_history);
        Self::with_history(cfg, history)
    }

    pub fn with_history(cfg: &Config, history: History) -> Result<Self> {
        let alphabet = cfg.alphabet()?;
        let rng = match cfg.classifier.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            ensemble: Ensemble::from_config(cfg)?,
            classifier: SoftmaxClassifier::untrained(alphabet.len()),
            alphabet,
            classifier_cfg: cfg.classifier,
            history,
            weights: cfg.ensemble.weights,
            metrics: AccuracyAccumulators::with_window(cfg.metrics.window),
            pending: None,
            rng,
            since_retrain: 0,
            model_generation: 0,
        })
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    pub fn classifier(&self) -> &SoftmaxClassifier {
        &self.classifier
    }

    pub fn metrics(&self) -> &AccuracyAccumulators {
        &self.metrics
    }

    /// Bumped whenever a trained classifier is swapped in.
    pub fn model_generation(&self) -> u64 {
        self.model_generation
    }

    pub fn pending(&self) -> Option<&Forecast> {
        self.pending.as_ref()
    }

    pub fn replace_weights(&mut self, weights: EnsembleWeights) -> Result<()> {
        weights.validate()?;
        self.weights = weights;
        self.refresh_pending();
        Ok(())
    }

    /// Installs a restored snapshot. Returns false when it does not fit the
    /// configured alphabet.
    pub fn install_model(&mut self, model: ClassifierModel) -> bool {
        self.classifier = SoftmaxClassifier::with_model(self.alphabet.len(), model);
        self.refresh_pending();
        if self.classifier.is_trained() {
            self.model_generation += 1;
            true
        } else {
            false
        }
    }

    /// Trains a fresh classifier on the current history and swaps it in.
    pub fn retrain(&mut self) -> bool {
        let extractor = self.ensemble.extractor();
        let samples =
            extractor.training_samples(self.history.as_slice(), self.classifier_cfg.train_window);
        let fitted = SoftmaxClassifier::fit(
            self.alphabet.len(),
            &samples,
            &self.classifier_cfg,
            &mut self.rng,
        );
        self.since_retrain = 0;
        if fitted.is_trained() {
            self.classifier = fitted;
            self.refresh_pending();
            self.model_generation += 1;
            true
        } else {
            tracing::debug!(
                samples = samples.len(),
                min_samples = self.classifier_cfg.min_samples,
                "Classifier training skipped"
            );
            false
        }
    }

    /// Forecast for the next round; kept as the outstanding prediction.
    pub fn predict(&mut self) -> Forecast {
        let forecast = self.ensemble.predict(
            self.history.as_slice(),
            &self.weights,
            &self.classifier,
            &mut self.rng,
        );
        self.pending = Some(forecast.clone());
        forecast
    }

    /// Re-forecasts an outstanding prediction after the inputs changed, so the
    /// next observed round is still scored.
    fn refresh_pending(&mut self) {
        if self.pending.is_some() {
            self.predict();
        }
    }

    /// Appends a validated round, scoring the outstanding forecast first.
    pub fn observe(
        &mut self,
        observed_at: DateTime<Utc>,
        round: Round,
    ) -> Result<Option<ScoredPrediction>, AppError> {
        self.history.validate(&round)?;
        let scored = self.pending.take().map(|forecast| {
            let predicted = forecast.picks();
            let slot_correct = self.metrics.observe(&predicted, &round);
            ScoredPrediction {
                round_correct: slot_correct.iter().all(|h| *h),
                predicted,
                actual: round.clone(),
                slot_correct,
            }
        });
        let evicted = self.history.push(observed_at, round)?;
        if evicted > 0 {
            tracing::debug!(evicted, "History cap reached, oldest rounds evicted");
        }

        self.since_retrain += 1;
        let every = self.classifier_cfg.retrain_every.max(1);
        if self.weights.classifier > 0.0 && self.since_retrain >= every {
            self.retrain();
        }
        Ok(scored)
    }

    pub fn undo(&mut self) -> Option<Observation> {
        let removed = self.history.undo();
        self.refresh_pending();
        removed
    }

    /// Clears history; accuracy accumulators and the classifier survive.
    pub fn reset(&mut self) {
        self.since_retrain = 0;
        self.history.reset();
        self.refresh_pending();
    }
}
