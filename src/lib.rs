pub mod backtest;
pub mod classifier;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod estimator;
pub mod input;
pub mod model;
pub mod predictor;
pub mod store;
