use rayon::prelude::*;

use crate::backtest::walk_forward::{AccuracySummary, WalkForwardEvaluator};
use crate::ensemble::EnsembleWeights;
use crate::model::Observation;

#[derive(Debug, Clone, PartialEq)]
pub struct TuneResult {
    pub weights: EnsembleWeights,
    pub summary: AccuracySummary,
    pub evaluated: usize,
    pub cancelled: bool,
}

/// Coarse grid search over the slot/markov/pattern/streak weights.
///
/// Grid points lie on the simplex with the configured step; the classifier
/// weight is held at its base value. Each point is scored by slot-level
/// walk-forward accuracy. Member outputs are collected once and rescored
/// per point, which matches a full evaluator run per point exactly.
#[derive(Debug, Clone)]
pub struct WeightTuner {
    evaluator: WalkForwardEvaluator,
    step: f64,
}

impl WeightTuner {
    pub fn new(evaluator: WalkForwardEvaluator, step: f64) -> Self {
        Self {
            evaluator,
            step: if grid_units(step).is_some() { step } else { 0.1 },
        }
    }

    pub fn grid(&self, base: &EnsembleWeights) -> Vec<EnsembleWeights> {
        weight_grid(self.step, base.classifier)
    }

    /// Best weights and their accuracy, or `None` when history is too short
    /// to score a single step. Ties keep the earliest grid point.
    pub fn tune(&self, entries: &[Observation], base: &EnsembleWeights) -> Option<TuneResult> {
        let steps = self.evaluator.collect(entries, base.classifier > 0.0);
        if steps.is_empty() {
            return None;
        }
        let grid = self.grid(base);
        let scored: Vec<Option<(usize, AccuracySummary)>> = grid
            .par_iter()
            .enumerate()
            .map(|(k, weights)| {
                if self.evaluator.is_cancelled() {
                    return None;
                }
                Some((k, self.evaluator.score(&steps, weights)))
            })
            .collect();

        let evaluated = scored.iter().flatten().count();
        let mut best: Option<(usize, AccuracySummary)> = None;
        for (k, summary) in scored.into_iter().flatten() {
            let better = match &best {
                Some((_, b)) => summary.slot_accuracy() > b.slot_accuracy(),
                None => true,
            };
            if better {
                best = Some((k, summary));
            }
        }
        let (k, summary) = best?;
        let result = TuneResult {
            weights: grid[k],
            summary,
            evaluated,
            cancelled: self.evaluator.is_cancelled(),
        };
        tracing::info!(
            slot = result.weights.slot,
            markov = result.weights.markov,
            pattern = result.weights.pattern,
            streak = result.weights.streak,
            slot_accuracy = result.summary.slot_accuracy(),
            round_accuracy = result.summary.round_accuracy(),
            evaluated = result.evaluated,
            "Weight tuning finished"
        );
        Some(result)
    }
}

/// Number of `step` increments that make up 1, or `None` when `step` is
/// outside `(0, 1]` or does not divide 1 evenly.
pub fn grid_units(step: f64) -> Option<usize> {
    if !(step > 0.0 && step <= 1.0) {
        return None;
    }
    let units = (1.0 / step).round();
    ((units * step - 1.0).abs() <= 1e-9).then_some(units as usize)
}

/// All non-negative `(slot, markov, pattern, streak)` on the unit simplex in
/// multiples of `step`. A step that does not divide 1 falls back to 0.1.
pub fn weight_grid(step: f64, classifier: f64) -> Vec<EnsembleWeights> {
    let units = grid_units(step).unwrap_or(10);
    let unit = 1.0 / units as f64;
    let mut out = Vec::new();
    for a in 0..=units {
        for b in 0..=units - a {
            for c in 0..=units - a - b {
                let d = units - a - b - c;
                out.push(EnsembleWeights {
                    slot: a as f64 * unit,
                    markov: b as f64 * unit,
                    pattern: c as f64 * unit,
                    streak: d as f64 * unit,
                    classifier,
                });
            }
        }
    }
    out
}
