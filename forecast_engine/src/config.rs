//! Runtime configuration
//!
//! Every field has a default, so an empty TOML document is a valid config.
//!
//! ```toml
//! [model]
//! window_len = 10
//!
//! [arima]
//! p = 5
//! d = 1
//! q = 0
//!
//! [lstm]
//! epochs = 50
//! batch_size = 32
//!
//! [cache]
//! model_dir = "models"
//! ```

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `cache.model_dir`
pub const MODEL_DIR_ENV: &str = "STOCKCAST_MODEL_DIR";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub model: ModelConfig,
    pub arima: ArimaConfig,
    pub lstm: LstmConfig,
    pub evaluation: EvaluationConfig,
    pub cache: CacheConfig,
    pub runtime: RuntimeConfig,
}

/// Settings shared by the windowed strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of past values fed to a single-step prediction
    pub window_len: usize,
    /// Target range of the min-max scaler
    pub scale_range: (f64, f64),
}

/// Order of the autoregressive-integrated model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArimaConfig {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

/// Recurrent network shape and optimiser settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmConfig {
    pub hidden_units: usize,
    pub dense_units: usize,
    pub dropout: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
    pub learning_rate: f64,
    pub seed: u64,
}

/// Walk-forward evaluation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Number of trailing values held out to compute MAPE
    pub holdout: usize,
}

/// Model persistence settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding one blob per (symbol, strategy)
    pub model_dir: PathBuf,
    /// Retrain when the series differs from the one a blob was fit on
    pub invalidate_on_new_data: bool,
}

/// Worker pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub workers: usize,
    pub train_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            window_len: 10,
            scale_range: (0.0, 1.0),
        }
    }
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self { p: 5, d: 1, q: 0 }
    }
}

impl Default for LstmConfig {
    fn default() -> Self {
        Self {
            hidden_units: 50,
            dense_units: 25,
            dropout: 0.2,
            epochs: 50,
            batch_size: 32,
            validation_split: 0.2,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { holdout: 10 }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            invalidate_on_new_data: false,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            train_timeout_secs: 300,
        }
    }
}

impl RuntimeConfig {
    /// Deadline for a single training job
    pub fn train_timeout(&self) -> Duration {
        Duration::from_secs(self.train_timeout_secs)
    }
}

impl ForecastConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: ForecastConfig =
            toml::from_str(raw).map_err(|e| ForecastError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ForecastError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `STOCKCAST_MODEL_DIR` if it is set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.cache.model_dir = PathBuf::from(dir);
            }
        }
        self
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.model.scale_range;
        if self.model.window_len == 0 {
            return Err(ForecastError::ConfigError(
                "model.window_len must be > 0".to_string(),
            ));
        }
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(ForecastError::ConfigError(format!(
                "model.scale_range must be finite with min < max, got ({}, {})",
                lo, hi
            )));
        }
        if self.arima.d > 2 {
            return Err(ForecastError::ConfigError(
                "arima.d must be <= 2".to_string(),
            ));
        }
        if self.arima.p > 20 || self.arima.q > 10 {
            return Err(ForecastError::ConfigError(
                "arima.p must be <= 20 and arima.q <= 10".to_string(),
            ));
        }

        let lstm = &self.lstm;
        if lstm.hidden_units == 0 || lstm.dense_units == 0 {
            return Err(ForecastError::ConfigError(
                "lstm layer widths must be > 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&lstm.dropout) {
            return Err(ForecastError::ConfigError(
                "lstm.dropout must be in [0, 1)".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&lstm.validation_split) {
            return Err(ForecastError::ConfigError(
                "lstm.validation_split must be in [0, 1)".to_string(),
            ));
        }
        if lstm.epochs == 0 || lstm.batch_size == 0 {
            return Err(ForecastError::ConfigError(
                "lstm.epochs and lstm.batch_size must be > 0".to_string(),
            ));
        }
        if !(lstm.learning_rate.is_finite() && lstm.learning_rate > 0.0) {
            return Err(ForecastError::ConfigError(
                "lstm.learning_rate must be positive".to_string(),
            ));
        }

        if self.evaluation.holdout == 0 {
            return Err(ForecastError::ConfigError(
                "evaluation.holdout must be > 0".to_string(),
            ));
        }
        if self.runtime.workers == 0 {
            return Err(ForecastError::ConfigError(
                "runtime.workers must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ForecastConfig::from_toml_str("").unwrap();
        assert_eq!(config, ForecastConfig::default());
        assert_eq!(config.model.window_len, 10);
        assert_eq!(config.arima, ArimaConfig { p: 5, d: 1, q: 0 });
        assert_eq!(config.lstm.hidden_units, 50);
        assert_eq!(config.evaluation.holdout, 10);
    }

    #[test]
    fn test_partial_override() {
        let config = ForecastConfig::from_toml_str(
            r#"
            [lstm]
            epochs = 5

            [cache]
            model_dir = "/tmp/stockcast"
            invalidate_on_new_data = true
            "#,
        )
        .unwrap();

        assert_eq!(config.lstm.epochs, 5);
        assert_eq!(config.lstm.batch_size, 32);
        assert_eq!(config.cache.model_dir, PathBuf::from("/tmp/stockcast"));
        assert!(config.cache.invalidate_on_new_data);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ForecastConfig::from_toml_str("[model]\nwindow_len = 0").is_err());
        assert!(ForecastConfig::from_toml_str("[lstm]\ndropout = 1.5").is_err());
        assert!(ForecastConfig::from_toml_str("[arima]\nd = 3").is_err());
        assert!(ForecastConfig::from_toml_str("[model]\nscale_range = [1.0, 0.0]").is_err());
        assert!(ForecastConfig::from_toml_str("not toml at all [").is_err());
    }
}
