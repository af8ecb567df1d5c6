use std::collections::VecDeque;

use crate::model::Round;

pub const ACCURACY_WINDOW_DEFAULT: usize = 100;

/// Process-lifetime prediction scorecard: running totals plus a bounded window
/// of recent round-level correctness (oldest evicted first).
#[derive(Debug, Clone)]
pub struct AccuracyAccumulators {
    window: usize,
    recent: VecDeque<bool>,
    rounds: u64,
    rounds_correct: u64,
    slots: u64,
    slots_correct: u64,
    current_streak: u64,
    best_streak: u64,
}

impl Default for AccuracyAccumulators {
    fn default() -> Self {
        Self::with_window(ACCURACY_WINDOW_DEFAULT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccuracySnapshot {
    pub predictions: u64,
    pub correct: u64,
    pub accuracy: Option<f64>,
    pub slot_accuracy: Option<f64>,
    pub rolling_accuracy: Option<f64>,
    pub rolling_len: usize,
    pub best_streak: u64,
}

impl AccuracyAccumulators {
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
            recent: VecDeque::with_capacity(window.max(1)),
            rounds: 0,
            rounds_correct: 0,
            slots: 0,
            slots_correct: 0,
            current_streak: 0,
            best_streak: 0,
        }
    }

    /// Scores one prediction; returns per-slot correctness.
    pub fn observe(&mut self, predicted: &Round, actual: &Round) -> Vec<bool> {
        let slot_hits: Vec<bool> = predicted
            .slots()
            .iter()
            .zip(actual.slots().iter())
            .map(|(p, a)| p == a)
            .collect();
        let round_hit = predicted.width() == actual.width() && slot_hits.iter().all(|h| *h);
        self.record(round_hit, &slot_hits);
        slot_hits
    }

    pub fn record(&mut self, round_hit: bool, slot_hits: &[bool]) {
        self.rounds = self.rounds.saturating_add(1);
        self.slots = self.slots.saturating_add(slot_hits.len() as u64);
        self.slots_correct = self
            .slots_correct
            .saturating_add(slot_hits.iter().filter(|h| **h).count() as u64);
        if round_hit {
            self.rounds_correct = self.rounds_correct.saturating_add(1);
            self.current_streak += 1;
            self.best_streak = self.best_streak.max(self.current_streak);
        } else {
            self.current_streak = 0;
        }
        self.recent.push_back(round_hit);
        if self.recent.len() > self.window {
            let _ = self.recent.pop_front();
        }
    }

    pub fn predictions(&self) -> u64 {
        self.rounds
    }

    pub fn correct(&self) -> u64 {
        self.rounds_correct
    }

    pub fn accuracy(&self) -> Option<f64> {
        ratio(self.rounds_correct, self.rounds)
    }

    pub fn slot_accuracy(&self) -> Option<f64> {
        ratio(self.slots_correct, self.slots)
    }

    pub fn rolling_accuracy(&self) -> Option<f64> {
        let hits = self.recent.iter().filter(|h| **h).count() as u64;
        ratio(hits, self.recent.len() as u64)
    }

    pub fn recent(&self) -> impl Iterator<Item = bool> + '_ {
        self.recent.iter().copied()
    }

    pub fn best_streak(&self) -> u64 {
        self.best_streak
    }

    pub fn snapshot(&self) -> AccuracySnapshot {
        AccuracySnapshot {
            predictions: self.rounds,
            correct: self.rounds_correct,
            accuracy: self.accuracy(),
            slot_accuracy: self.slot_accuracy(),
            rolling_accuracy: self.rolling_accuracy(),
            rolling_len: self.recent.len(),
            best_streak: self.best_streak,
        }
    }
}

fn ratio(num: u64, den: u64) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}
