//! Forecast error metrics

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::warn;

/// Accuracy of a forecast against the realised values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error
    pub mape: f64,
}

impl std::fmt::Display for ErrorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Accuracy Metrics:")?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        writeln!(f, "  RMSE:  {:.4}", self.rmse)?;
        writeln!(f, "  MAPE:  {:.4}%", self.mape)?;
        Ok(())
    }
}

fn check_pair(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() || actual.is_empty() {
        return Err(MathError::InvalidInput(format!(
            "Actual ({}) and predicted ({}) values must have the same non-zero length",
            actual.len(),
            predicted.len()
        )));
    }

    if actual
        .iter()
        .chain(predicted.iter())
        .any(|v| !v.is_finite())
    {
        return Err(MathError::InvalidInput(
            "Actual and predicted values must be finite".to_string(),
        ));
    }

    Ok(())
}

/// Mean Absolute Percentage Error, as a percentage
///
/// `mean(|actual - predicted| / |actual|) * 100`. Points whose actual value is
/// exactly zero have no defined percentage error and are left out of both the
/// sum and the count. If every point is zero the call is rejected.
pub fn mape(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_pair(actual, predicted)?;

    let ratios: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .filter(|(a, _)| **a != 0.0)
        .map(|(a, p)| (a - p).abs() / a.abs())
        .collect();

    let skipped = actual.len() - ratios.len();
    if ratios.is_empty() {
        return Err(MathError::InvalidInput(
            "MAPE is undefined when every actual value is zero".to_string(),
        ));
    }
    if skipped > 0 {
        warn!(skipped, total = actual.len(), "MAPE excludes zero-valued actuals");
    }

    Ok(ratios.iter().mean() * 100.0)
}

/// MAE, RMSE and MAPE in one pass over the inputs
pub fn error_metrics(actual: &[f64], predicted: &[f64]) -> Result<ErrorMetrics> {
    check_pair(actual, predicted)?;

    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| a - p)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).mean();
    let rmse = errors.iter().map(|e| e * e).mean().sqrt();

    Ok(ErrorMetrics {
        mae,
        rmse,
        mape: mape(actual, predicted)?,
    })
}
