pub mod tuner;
pub mod walk_forward;

pub use tuner::{grid_units, weight_grid, TuneResult, WeightTuner};
pub use walk_forward::{
    AccuracySummary, BacktestReport, BacktestStep, StepComponents, WalkForwardEvaluator,
};
