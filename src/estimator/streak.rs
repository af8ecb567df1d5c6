use crate::config::StreakConfig;
use crate::model::{Distribution, Observation, Outcome};

/// Moves up to `bonus` probability away from an outcome that filled the last
/// `window` observations of a slot, spreading it evenly over the others.
#[derive(Debug, Clone, Copy)]
pub struct StreakBias {
    window: usize,
    bonus: f64,
}

impl StreakBias {
    pub fn new(cfg: StreakConfig) -> Self {
        Self {
            window: cfg.window.max(1),
            bonus: cfg.bonus.clamp(0.0, 1.0),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// The repeated outcome when the last `window` entries of `series` agree.
    pub fn run_outcome(&self, series: &[Outcome]) -> Option<Outcome> {
        if series.len() < self.window {
            return None;
        }
        let tail = &series[series.len() - self.window..];
        let first = tail[0];
        tail.iter().all(|o| *o == first).then_some(first)
    }

    pub fn apply(&self, dist: &Distribution, series: &[Outcome]) -> Distribution {
        let Some(run) = self.run_outcome(series) else {
            return dist.clone();
        };
        let n = dist.len();
        if run.index() >= n || n < 2 {
            return dist.clone();
        }
        let current = dist.prob(run);
        let shift = self.bonus.min(current / 2.0);
        if shift <= 0.0 {
            return dist.clone();
        }
        let share = shift / (n - 1) as f64;
        let adjusted = dist
            .probs()
            .iter()
            .enumerate()
            .map(|(i, p)| if i == run.index() { p - shift } else { p + share })
            .collect();
        Distribution::from_weights(adjusted)
    }

    /// The last `window` outcomes of `slot`, oldest first.
    pub fn recent(&self, entries: &[Observation], slot: usize) -> Vec<Outcome> {
        let mut tail: Vec<Outcome> = entries
            .iter()
            .rev()
            .take(self.window)
            .filter_map(|o| o.slot(slot))
            .collect();
        tail.reverse();
        tail
    }

    pub fn apply_for_slot(
        &self,
        dist: &Distribution,
        entries: &[Observation],
        slot: usize,
    ) -> Distribution {
        self.apply(dist, &self.recent(entries, slot))
    }
}
