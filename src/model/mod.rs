pub mod distribution;
pub mod history;
pub mod outcome;

pub use distribution::{Distribution, DEFAULT_TIE_TOLERANCE, NORMALIZE_EPSILON};
pub use history::History;
pub use outcome::{Alphabet, Observation, Outcome, Round};
