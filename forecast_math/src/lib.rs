//! # Forecast Math
//!
//! Numeric building blocks shared by the forecasting strategies.
//! This crate provides min-max scaling, supervised windowing of a price
//! series, a least-squares solver and forecast error metrics.

use thiserror::Error;

pub mod least_squares;
pub mod metrics;
pub mod scaler;
pub mod windowing;

pub use least_squares::{solve_least_squares, solve_ols_with_intercept, OlsFit};
pub use metrics::{error_metrics, mape, ErrorMetrics};
pub use scaler::{MinMaxScaler, ScalerState};
pub use windowing::{last_window, make_windows, Windows};

/// Errors that can occur in forecasting math
#[derive(Error, Debug)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for forecasting math operations
pub type Result<T> = std::result::Result<T, MathError>;

/// Reject empty series and series containing NaN or infinite values
pub fn ensure_finite(series: &[f64]) -> Result<()> {
    if series.is_empty() {
        return Err(MathError::InsufficientData("Series is empty".to_string()));
    }

    if let Some(idx) = series.iter().position(|v| !v.is_finite()) {
        return Err(MathError::InvalidInput(format!(
            "Series contains a non-finite value at index {}",
            idx
        )));
    }

    Ok(())
}
