use crate::config::EstimatorConfig;
use crate::estimator::decayed::DecayedCounter;
use crate::model::{Distribution, Observation};

/// Per-slot decayed marginals shrunk toward a global marginal pooled over all
/// slots. The global estimate has `K` times the samples, which stabilizes
/// sparse slots.
#[derive(Debug, Clone)]
pub struct SlotMarginalModel {
    per_slot: Vec<DecayedCounter>,
    global: DecayedCounter,
    global_mix: f64,
}

impl SlotMarginalModel {
    pub fn build(n: usize, width: usize, cfg: &EstimatorConfig, entries: &[Observation]) -> Self {
        let per_slot = (0..width.max(1))
            .map(|slot| DecayedCounter::accumulate(n, cfg, entries, |o| o.slot(slot)))
            .collect();
        let global =
            DecayedCounter::accumulate(n, cfg, entries, |o| o.round.slots().to_vec());
        Self {
            per_slot,
            global,
            global_mix: cfg.global_mix.clamp(0.0, 1.0),
        }
    }

    pub fn slot_counter(&self, slot: usize) -> Option<&DecayedCounter> {
        self.per_slot.get(slot)
    }

    pub fn global_counter(&self) -> &DecayedCounter {
        &self.global
    }

    /// `(1 - mix) * slot + mix * global`. Unknown slots get the global estimate.
    pub fn slot_posterior(&self, slot: usize) -> Distribution {
        let global = self.global.distribution();
        let Some(counter) = self.per_slot.get(slot) else {
            return global;
        };
        let local = counter.distribution();
        Distribution::blend(
            local.len(),
            &[(1.0 - self.global_mix, &local), (self.global_mix, &global)],
        )
    }
}
