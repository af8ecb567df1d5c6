use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One symbol of the configured alphabet, stored as its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Outcome(u8);

impl Outcome {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alphabet {
    labels: Vec<String>,
}

impl Alphabet {
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Result<Self, AppError> {
        let labels: Vec<String> = labels
            .iter()
            .map(|l| l.as_ref().trim().to_ascii_uppercase())
            .collect();
        if labels.len() < 2 || labels.len() > u8::MAX as usize {
            return Err(AppError::Config(format!(
                "alphabet must have between 2 and 255 labels, got {}",
                labels.len()
            )));
        }
        for (i, label) in labels.iter().enumerate() {
            if label.is_empty() {
                return Err(AppError::Config("alphabet labels must be non-empty".into()));
            }
            if label
                .chars()
                .any(|c| c.is_whitespace() || c == ',' || c == ';')
            {
                return Err(AppError::Config(format!(
                    "alphabet label '{}' must not contain whitespace, ',' or ';'",
                    label
                )));
            }
            if labels[..i].iter().any(|l| l == label) {
                return Err(AppError::Config(format!("duplicate alphabet label '{}'", label)));
            }
        }
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, outcome: Outcome) -> &str {
        self.labels
            .get(outcome.index())
            .map(String::as_str)
            .unwrap_or("?")
    }

    pub fn outcome(&self, index: usize) -> Option<Outcome> {
        (index < self.labels.len()).then_some(Outcome(index as u8))
    }

    pub fn contains(&self, outcome: Outcome) -> bool {
        outcome.index() < self.labels.len()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = Outcome> + '_ {
        (0..self.labels.len()).map(|i| Outcome(i as u8))
    }

    /// True when every label starts with a distinct character, which enables
    /// single-character abbreviations and compact round strings.
    pub fn has_unique_initials(&self) -> bool {
        let initials: Vec<char> = self
            .labels
            .iter()
            .filter_map(|l| l.chars().next())
            .collect();
        initials
            .iter()
            .enumerate()
            .all(|(i, c)| !initials[..i].contains(c))
    }

    pub fn parse(&self, token: &str) -> Result<Outcome, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::EmptyInput);
        }
        if let Some(idx) = self
            .labels
            .iter()
            .position(|l| l.eq_ignore_ascii_case(token))
        {
            return Ok(Outcome(idx as u8));
        }
        let mut chars = token.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if self.has_unique_initials() {
                let c = c.to_ascii_uppercase();
                if let Some(idx) = self.labels.iter().position(|l| l.starts_with(c)) {
                    return Ok(Outcome(idx as u8));
                }
            }
        }
        Err(AppError::InvalidOutcome {
            token: token.to_string(),
            alphabet: self.labels.join("/"),
        })
    }
}

/// A fixed-width tuple of outcomes observed together. `K = 1` is a plain stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Round {
    slots: Vec<Outcome>,
}

impl Round {
    pub fn new(slots: Vec<Outcome>) -> Self {
        Self { slots }
    }

    pub fn single(outcome: Outcome) -> Self {
        Self {
            slots: vec![outcome],
        }
    }

    pub fn width(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, slot: usize) -> Option<Outcome> {
        self.slots.get(slot).copied()
    }

    pub fn slots(&self) -> &[Outcome] {
        &self.slots
    }

    pub fn render(&self, alphabet: &Alphabet) -> String {
        self.slots
            .iter()
            .map(|o| alphabet.label(*o))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub observed_at: DateTime<Utc>,
    pub round: Round,
}

impl Observation {
    pub fn new(observed_at: DateTime<Utc>, round: Round) -> Self {
        Self { observed_at, round }
    }

    pub fn slot(&self, slot: usize) -> Option<Outcome> {
        self.round.slot(slot)
    }
}
