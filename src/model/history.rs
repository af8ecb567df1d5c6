use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::model::outcome::{Alphabet, Observation, Outcome, Round};

/// Append-only, chronologically ordered log of observed rounds.
///
/// The only mutations are `push` (with FIFO eviction past `max_len`), `undo`
/// of the newest entry, and `reset`. Index order is the time axis used for
/// decay weighting.
#[derive(Debug, Clone)]
pub struct History {
    alphabet: Alphabet,
    width: usize,
    max_len: usize,
    entries: Vec<Observation>,
}

impl History {
    pub fn new(alphabet: Alphabet, width: usize, max_len: usize) -> Self {
        Self {
            alphabet,
            width: width.max(1),
            max_len: max_len.max(1),
            entries: Vec::new(),
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[Observation] {
        &self.entries
    }

    /// Entries strictly before index `end`.
    pub fn prefix(&self, end: usize) -> &[Observation] {
        &self.entries[..end.min(self.entries.len())]
    }

    pub fn last(&self) -> Option<&Observation> {
        self.entries.last()
    }

    pub fn validate(&self, round: &Round) -> Result<(), AppError> {
        if round.width() != self.width {
            return Err(AppError::RoundWidth {
                expected: self.width,
                got: round.width(),
            });
        }
        if let Some(bad) = round.slots().iter().find(|o| !self.alphabet.contains(**o)) {
            return Err(AppError::InvalidOutcome {
                token: format!("#{}", bad.index()),
                alphabet: self.alphabet.labels().join("/"),
            });
        }
        Ok(())
    }

    /// Appends a validated round. Returns the number of evicted entries.
    pub fn push(&mut self, observed_at: DateTime<Utc>, round: Round) -> Result<usize, AppError> {
        self.validate(&round)?;
        self.entries.push(Observation::new(observed_at, round));
        let overflow = self.entries.len().saturating_sub(self.max_len);
        if overflow > 0 {
            self.entries.drain(..overflow);
        }
        Ok(overflow)
    }

    pub fn push_outcome(
        &mut self,
        observed_at: DateTime<Utc>,
        outcome: Outcome,
    ) -> Result<usize, AppError> {
        self.push(observed_at, Round::single(outcome))
    }

    pub fn undo(&mut self) -> Option<Observation> {
        self.entries.pop()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Outcomes of one slot in chronological order.
    pub fn slot_series(&self, slot: usize) -> Vec<Outcome> {
        slot_series(&self.entries, slot)
    }
}

pub fn slot_series(entries: &[Observation], slot: usize) -> Vec<Outcome> {
    entries.iter().filter_map(|o| o.slot(slot)).collect()
}
