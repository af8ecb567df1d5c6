pub mod decayed;
pub mod marginal;
pub mod markov;
pub mod pattern;
pub mod streak;

pub use decayed::{decay_weights, DecayedCounter};
pub use marginal::SlotMarginalModel;
pub use markov::MarkovModel;
pub use pattern::PatternModel;
pub use streak::StreakBias;
