use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::backtest::grid_units;
use crate::ensemble::{EnsembleWeights, StreakPolicy};
use crate::model::{Alphabet, DEFAULT_TIE_TOLERANCE};

pub const CONFIG_PATH_ENV: &str = "ENSEMBLE_FORECAST_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub game: GameConfig,
    pub estimator: EstimatorConfig,
    pub ensemble: EnsembleConfig,
    pub streak: StreakConfig,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub backtest: BacktestConfig,
    pub metrics: MetricsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub alphabet: Vec<String>,
    pub round_width: usize,
    pub max_history: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            alphabet: vec!["R".to_string(), "B".to_string(), "G".to_string()],
            round_width: 1,
            max_history: 5_000,
        }
    }
}

/// Shared by every decayed-count estimator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub decay: f64,
    pub alpha: f64,
    pub global_mix: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            decay: 0.97,
            alpha: 0.5,
            global_mix: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub weights: EnsembleWeights,
    pub streak_policy: StreakPolicy,
    pub tie_tolerance: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            weights: EnsembleWeights::default(),
            streak_policy: StreakPolicy::default(),
            tie_tolerance: DEFAULT_TIE_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StreakConfig {
    pub window: usize,
    pub bonus: f64,
}

impl Default for StreakConfig {
    fn default() -> Self {
        Self {
            window: 4,
            bonus: 0.08,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub short_window: usize,
    pub long_window: usize,
    pub period: usize,
    pub streak_cap: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            short_window: 10,
            long_window: 200,
            period: 5,
            streak_cap: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
    pub batch_min: usize,
    pub batch_max: usize,
    pub min_samples: usize,
    pub init_scale: f64,
    /// Only the most recent rounds are turned into training samples.
    pub train_window: usize,
    pub retrain_every: usize,
    pub seed: Option<u64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            epochs: 40,
            l2: 1e-4,
            batch_min: 8,
            batch_max: 64,
            min_samples: 50,
            init_scale: 0.01,
            train_window: 500,
            retrain_every: 10,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub min_train: usize,
    pub grid_step: f64,
    pub retrain_every: usize,
    pub seed: u64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            min_train: 20,
            grid_step: 0.1,
            retrain_every: 25,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { window: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub history_path: PathBuf,
    pub weights_path: PathBuf,
    pub model_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from("data/history.sqlite"),
            weights_path: PathBuf::from("data/weights.json"),
            model_path: PathBuf::from("data/classifier.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::from("ensemble-forecast.log"),
        }
    }
}

impl Config {
    /// Loads `.env`, then the TOML file named by `ENSEMBLE_FORECAST_CONFIG`
    /// (default `config/default.toml`). A missing file yields defaults.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::from_toml_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("invalid config toml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn alphabet(&self) -> Result<Alphabet> {
        Alphabet::new(&self.game.alphabet).context("game.alphabet is invalid")
    }

    pub fn validate(&self) -> Result<()> {
        self.alphabet()?;
        if self.game.round_width == 0 {
            bail!("game.round_width must be >= 1");
        }
        if self.game.max_history == 0 {
            bail!("game.max_history must be >= 1");
        }
        let est = self.estimator;
        if !(est.decay > 0.0 && est.decay < 1.0) {
            bail!("estimator.decay must be in (0, 1), got {}", est.decay);
        }
        if !(est.alpha > 0.0 && est.alpha.is_finite()) {
            bail!("estimator.alpha must be > 0, got {}", est.alpha);
        }
        if !(0.0..=1.0).contains(&est.global_mix) {
            bail!("estimator.global_mix must be in [0, 1], got {}", est.global_mix);
        }
        self.ensemble
            .weights
            .validate()
            .context("ensemble.weights is invalid")?;
        if !(self.ensemble.tie_tolerance >= 0.0) {
            bail!("ensemble.tie_tolerance must be >= 0");
        }
        if self.streak.window == 0 {
            bail!("streak.window must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.streak.bonus) {
            bail!("streak.bonus must be in [0, 1], got {}", self.streak.bonus);
        }
        let f = self.features;
        if f.short_window == 0 || f.long_window == 0 || f.period == 0 || f.streak_cap == 0 {
            bail!("features windows, period and streak_cap must be >= 1");
        }
        let c = self.classifier;
        if !(c.learning_rate > 0.0) || c.epochs == 0 {
            bail!("classifier.learning_rate and classifier.epochs must be > 0");
        }
        if c.l2 < 0.0 {
            bail!("classifier.l2 must be >= 0");
        }
        if c.batch_min == 0 || c.batch_max < c.batch_min {
            bail!(
                "classifier batch bounds invalid: batch_min={} batch_max={}",
                c.batch_min,
                c.batch_max
            );
        }
        let step = self.backtest.grid_step;
        if grid_units(step).is_none() {
            bail!(
                "backtest.grid_step must be in (0, 1] and divide 1 evenly, got {}",
                step
            );
        }
        if self.metrics.window == 0 {
            bail!("metrics.window must be >= 1");
        }
        Ok(())
    }
}
