use std::collections::HashMap;

use crate::config::EstimatorConfig;
use crate::estimator::decayed::{decay_weights, DecayedCounter};
use crate::model::{Distribution, Observation, Round};

/// Exact-context table keyed by the full previous round.
#[derive(Debug, Clone)]
pub struct PatternModel {
    table: HashMap<Round, Vec<DecayedCounter>>,
}

impl PatternModel {
    pub fn build(n: usize, width: usize, cfg: &EstimatorConfig, entries: &[Observation]) -> Self {
        let mut table: HashMap<Round, Vec<DecayedCounter>> = HashMap::new();
        let weights = decay_weights(entries.len(), cfg.decay);
        for i in 1..entries.len() {
            let counters = table
                .entry(entries[i - 1].round.clone())
                .or_insert_with(|| {
                    (0..width.max(1))
                        .map(|_| DecayedCounter::new(n, cfg.alpha))
                        .collect()
                });
            for (slot, counter) in counters.iter_mut().enumerate() {
                if let Some(next) = entries[i].slot(slot) {
                    counter.add(next, weights[i]);
                }
            }
        }
        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn lookup(&self, key: &Round) -> Option<&[DecayedCounter]> {
        self.table.get(key).map(Vec::as_slice)
    }

    pub fn slot_distribution(&self, key: &Round, slot: usize) -> Option<Distribution> {
        self.lookup(key)?.get(slot).map(DecayedCounter::distribution)
    }

    /// `None` on a miss; the combiner substitutes the slot marginal.
    pub fn predict(&self, last: Option<&Observation>, slot: usize) -> Option<Distribution> {
        self.slot_distribution(&last?.round, slot)
    }
}
