use crate::config::EstimatorConfig;
use crate::estimator::decayed::{decay_weights, DecayedCounter};
use crate::model::{Distribution, Observation, Outcome};

/// First-order, per-slot transition table. Each consecutive pair of rounds
/// contributes `decay^age` of the later round to `rows[slot][previous]`.
#[derive(Debug, Clone)]
pub struct MarkovModel {
    n: usize,
    rows: Vec<Vec<DecayedCounter>>,
}

impl MarkovModel {
    pub fn build(n: usize, width: usize, cfg: &EstimatorConfig, entries: &[Observation]) -> Self {
        let mut rows: Vec<Vec<DecayedCounter>> = (0..width.max(1))
            .map(|_| (0..n).map(|_| DecayedCounter::new(n, cfg.alpha)).collect())
            .collect();
        let weights = decay_weights(entries.len(), cfg.decay);
        for i in 1..entries.len() {
            let (prev, next) = (&entries[i - 1], &entries[i]);
            for (slot, row) in rows.iter_mut().enumerate() {
                let (Some(from), Some(to)) = (prev.slot(slot), next.slot(slot)) else {
                    continue;
                };
                if let Some(counter) = row.get_mut(from.index()) {
                    counter.add(to, weights[i]);
                }
            }
        }
        Self { n, rows }
    }

    pub fn row(&self, slot: usize, previous: Outcome) -> Option<&DecayedCounter> {
        self.rows.get(slot)?.get(previous.index())
    }

    /// Distribution of the next outcome in `slot` given the previous one.
    /// Rows with no observed transitions are uniform.
    pub fn next_distribution(&self, slot: usize, previous: Outcome) -> Distribution {
        match self.row(slot, previous) {
            Some(row) if row.evidence() > 0.0 => row.distribution(),
            _ => Distribution::uniform(self.n),
        }
    }

    /// Conditions on the slot value of the most recent round, if any.
    pub fn predict(&self, last: Option<&Observation>, slot: usize) -> Distribution {
        match last.and_then(|o| o.slot(slot)) {
            Some(previous) => self.next_distribution(slot, previous),
            None => Distribution::uniform(self.n),
        }
    }
}
