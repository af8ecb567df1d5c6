use std::f64::consts::TAU;

use chrono::Timelike;

use crate::classifier::softmax::TrainingSample;
use crate::config::FeatureConfig;
use crate::model::history::slot_series;
use crate::model::{Observation, Outcome};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fixed-width encoding of a history prefix for one slot.
///
/// Layout, `n` = alphabet size, `K` = round width:
/// - `n`: outcome rates over the last `short_window` rounds
/// - `n`: one-hot of the previous outcome
/// - `1`: current streak length of the previous outcome, capped, in [0, 1]
/// - `period`: one-hot of `index mod period`
/// - `2`: sin/cos of the time of day of the newest observation
/// - `n`: outcome rates over the last `long_window` rounds
/// - `K`: one-hot of the slot
///
/// Pure: identical inputs always produce identical vectors, so the same
/// function feeds training and live inference.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    n: usize,
    width: usize,
    cfg: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(n: usize, width: usize, cfg: FeatureConfig) -> Self {
        Self {
            n: n.max(1),
            width: width.max(1),
            cfg: FeatureConfig {
                short_window: cfg.short_window.max(1),
                long_window: cfg.long_window.max(1),
                period: cfg.period.max(1),
                streak_cap: cfg.streak_cap.max(1),
            },
        }
    }

    pub fn dim(&self) -> usize {
        3 * self.n + 1 + self.cfg.period + 2 + self.width
    }

    /// Features for predicting `slot` of round `index` from `prefix`.
    pub fn extract(&self, prefix: &[Observation], index: usize, slot: usize) -> Vec<f64> {
        let series = slot_series(prefix, slot);
        let mut out = Vec::with_capacity(self.dim());

        self.push_rates(&mut out, &series, self.cfg.short_window);

        let last = series.last().copied();
        for o in 0..self.n {
            out.push(if last.map(Outcome::index) == Some(o) { 1.0 } else { 0.0 });
        }

        let streak = match last {
            Some(v) => series.iter().rev().take_while(|o| **o == v).count(),
            None => 0,
        };
        out.push(streak.min(self.cfg.streak_cap) as f64 / self.cfg.streak_cap as f64);

        let phase = index % self.cfg.period;
        for p in 0..self.cfg.period {
            out.push(if p == phase { 1.0 } else { 0.0 });
        }

        match prefix.last() {
            Some(obs) => {
                let secs = obs.observed_at.num_seconds_from_midnight() as f64;
                let angle = TAU * secs / SECONDS_PER_DAY;
                out.push(angle.sin());
                out.push(angle.cos());
            }
            None => {
                out.push(0.0);
                out.push(0.0);
            }
        }

        self.push_rates(&mut out, &series, self.cfg.long_window);

        for k in 0..self.width {
            out.push(if k == slot { 1.0 } else { 0.0 });
        }
        out
    }

    /// One sample per slot for every round in the last `window` rounds of
    /// `entries`, each built only from the rounds before it.
    pub fn training_samples(&self, entries: &[Observation], window: usize) -> Vec<TrainingSample> {
        let start = entries.len().saturating_sub(window.max(1)).max(1);
        let mut samples = Vec::new();
        for i in start..entries.len() {
            let prefix = &entries[..i];
            for slot in 0..self.width {
                let Some(label) = entries[i].slot(slot) else {
                    continue;
                };
                samples.push(TrainingSample {
                    features: self.extract(prefix, i, slot),
                    label: label.index(),
                });
            }
        }
        samples
    }

    fn push_rates(&self, out: &mut Vec<f64>, series: &[Outcome], window: usize) {
        let tail = &series[series.len().saturating_sub(window)..];
        let mut counts = vec![0.0; self.n];
        for o in tail {
            if let Some(c) = counts.get_mut(o.index()) {
                *c += 1.0;
            }
        }
        let denom = tail.len().max(1) as f64;
        out.extend(counts.into_iter().map(|c| c / denom));
    }
}
