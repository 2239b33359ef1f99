//! Error types for the forecast_engine crate

use forecast_math::MathError;
use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the forecast_engine crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Series too short, non-finite values, undefined MAPE, bad symbol or horizon
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Prediction or evaluation requested before a successful train or load
    #[error("Model not trained: {0}")]
    NotTrained(String),

    /// No persisted state at the expected location
    #[error("No persisted model at {}", .0.display())]
    PersistenceNotFound(PathBuf),

    /// Persisted state exists but cannot be used
    #[error("Corrupt persisted model at {}: {reason}", path.display())]
    PersistenceCorrupt { path: PathBuf, reason: String },

    /// The optimiser diverged or the fit could not be computed
    #[error("Training failure: {0}")]
    TrainingFailure(String),

    /// A training job did not finish before its deadline
    #[error("Still training: {0}")]
    StillTraining(String),

    /// Error related to configuration loading or validation
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error related to data loading
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON encoding
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),
}

impl ForecastError {
    /// Whether the cache should answer this load error by retraining
    pub fn is_recoverable_load_failure(&self) -> bool {
        matches!(
            self,
            ForecastError::PersistenceNotFound(_) | ForecastError::PersistenceCorrupt { .. }
        )
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ForecastError::PersistenceCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<MathError> for ForecastError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::InsufficientData(msg) | MathError::InvalidInput(msg) => {
                ForecastError::InvalidInput(msg)
            }
            MathError::CalculationError(msg) => ForecastError::TrainingFailure(msg),
        }
    }
}

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}
