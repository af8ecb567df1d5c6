use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::model::Distribution;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub features: Vec<f64>,
    pub label: usize,
}

/// Multinomial logistic weights: `|O|` rows of `D` columns plus a bias per class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl ClassifierModel {
    pub fn n_classes(&self) -> usize {
        self.bias.len()
    }

    pub fn dim(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_consistent(&self) -> bool {
        !self.bias.is_empty()
            && self.weights.len() == self.bias.len()
            && self.weights.iter().all(|row| row.len() == self.dim())
    }

    pub fn logits(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(self.bias.iter())
            .map(|(row, b)| row.iter().zip(x.iter()).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect()
    }

    /// Mismatched feature width yields the uniform distribution.
    pub fn predict_proba(&self, x: &[f64]) -> Distribution {
        if x.len() != self.dim() {
            return Distribution::uniform(self.n_classes());
        }
        Distribution::from_weights(softmax(&self.logits(x)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub samples: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub final_loss: f64,
}

pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![1.0 / logits.len().max(1) as f64; logits.len()];
    }
    let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

/// Roughly ten batches per epoch, bounded by the configured floor and cap.
pub fn batch_size_for(samples: usize, cfg: &ClassifierConfig) -> usize {
    let floor = cfg.batch_min.max(1);
    let cap = cfg.batch_max.max(floor);
    (samples / 10).clamp(floor, cap).min(samples.max(1))
}

/// Mini-batch SGD on softmax cross-entropy with L2 decay on the weights.
/// Returns `None` below `min_samples`; the caller keeps a uniform contribution.
pub fn train<R: Rng + ?Sized>(
    samples: &[TrainingSample],
    n_classes: usize,
    cfg: &ClassifierConfig,
    rng: &mut R,
) -> Option<(ClassifierModel, TrainingReport)> {
    if samples.len() < cfg.min_samples.max(1) || n_classes < 2 {
        return None;
    }
    let dim = samples[0].features.len();
    let usable: Vec<&TrainingSample> = samples
        .iter()
        .filter(|s| s.features.len() == dim && s.label < n_classes)
        .collect();
    if usable.len() < cfg.min_samples.max(1) {
        return None;
    }

    let scale = cfg.init_scale.abs();
    let mut weights: Vec<Vec<f64>> = (0..n_classes)
        .map(|_| {
            (0..dim)
                .map(|_| if scale > 0.0 { rng.gen_range(-scale..scale) } else { 0.0 })
                .collect()
        })
        .collect();
    let mut bias = vec![0.0; n_classes];

    let batch_size = batch_size_for(usable.len(), cfg);
    let lr = cfg.learning_rate;
    let mut order: Vec<usize> = (0..usable.len()).collect();
    let mut grad_w = vec![vec![0.0; dim]; n_classes];
    let mut grad_b = vec![0.0; n_classes];

    for _ in 0..cfg.epochs {
        order.shuffle(rng);
        for batch in order.chunks(batch_size) {
            for row in grad_w.iter_mut() {
                row.iter_mut().for_each(|g| *g = 0.0);
            }
            grad_b.iter_mut().for_each(|g| *g = 0.0);

            for &idx in batch {
                let sample = usable[idx];
                let logits: Vec<f64> = weights
                    .iter()
                    .zip(bias.iter())
                    .map(|(row, b)| {
                        row.iter()
                            .zip(sample.features.iter())
                            .map(|(w, v)| w * v)
                            .sum::<f64>()
                            + b
                    })
                    .collect();
                let mut err = softmax(&logits);
                err[sample.label] -= 1.0;
                for (k, e) in err.iter().enumerate() {
                    for (g, x) in grad_w[k].iter_mut().zip(sample.features.iter()) {
                        *g += e * x;
                    }
                    grad_b[k] += e;
                }
            }

            let m = batch.len() as f64;
            for k in 0..n_classes {
                for (w, g) in weights[k].iter_mut().zip(grad_w[k].iter()) {
                    *w -= lr * (g / m + cfg.l2 * *w);
                }
                bias[k] -= lr * grad_b[k] / m;
            }
        }
    }

    let model = ClassifierModel { weights, bias };
    let final_loss = usable
        .iter()
        .map(|s| {
            let p = model.predict_proba(&s.features).probs()[s.label];
            -(p.max(1e-15)).ln()
        })
        .sum::<f64>()
        / usable.len() as f64;
    let report = TrainingReport {
        samples: usable.len(),
        epochs: cfg.epochs,
        batch_size,
        final_loss,
    };
    tracing::debug!(
        samples = report.samples,
        epochs = report.epochs,
        batch_size = report.batch_size,
        final_loss = report.final_loss,
        "Classifier trained"
    );
    Some((model, report))
}

/// Holds the most recently trained model, if any. Untrained classifiers
/// contribute the uniform distribution.
#[derive(Debug, Clone)]
pub struct SoftmaxClassifier {
    n: usize,
    model: Option<ClassifierModel>,
}

impl SoftmaxClassifier {
    pub fn untrained(n: usize) -> Self {
        Self { n, model: None }
    }

    /// Rejects snapshots whose class count does not match the alphabet.
    pub fn with_model(n: usize, model: ClassifierModel) -> Self {
        let model = (model.is_consistent() && model.n_classes() == n).then_some(model);
        Self { n, model }
    }

    /// Always a fresh value; the previous model is never modified.
    pub fn fit<R: Rng + ?Sized>(
        n: usize,
        samples: &[TrainingSample],
        cfg: &ClassifierConfig,
        rng: &mut R,
    ) -> Self {
        Self {
            n,
            model: train(samples, n, cfg, rng).map(|(model, _)| model),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&ClassifierModel> {
        self.model.as_ref()
    }

    pub fn predict(&self, features: &[f64]) -> Distribution {
        match &self.model {
            Some(model) => model.predict_proba(features),
            None => Distribution::uniform(self.n),
        }
    }
}
