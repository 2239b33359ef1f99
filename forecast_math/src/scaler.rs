//! Min-max scaling of a price series
//!
//! The scaler maps the minimum observed value to the lower end of the feature
//! range and the maximum to the upper end. The fitted bounds are kept in a
//! [`ScalerState`] so that forecasts can be mapped back with the exact bounds
//! that were used at fit time.
//!
//! A constant series has no spread. Its data range is treated as `1.0`, so every
//! value maps to the lower end of the feature range and the inverse transform
//! returns the constant again.

use crate::{ensure_finite, MathError, Result};
use serde::{Deserialize, Serialize};

/// Min-max scaler configured with a target feature range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScaler {
    range_min: f64,
    range_max: f64,
}

/// Bounds captured when a [`MinMaxScaler`] is fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    /// Smallest value of the fitted series
    pub data_min: f64,
    /// Largest value of the fitted series
    pub data_max: f64,
    /// Lower end of the feature range
    pub range_min: f64,
    /// Upper end of the feature range
    pub range_max: f64,
}

impl Default for MinMaxScaler {
    fn default() -> Self {
        Self {
            range_min: 0.0,
            range_max: 1.0,
        }
    }
}

impl MinMaxScaler {
    /// Create a scaler for the feature range `[range_min, range_max]`
    pub fn new(range_min: f64, range_max: f64) -> Result<Self> {
        if !range_min.is_finite() || !range_max.is_finite() || range_min >= range_max {
            return Err(MathError::InvalidInput(format!(
                "Feature range must be finite with min < max, got ({}, {})",
                range_min, range_max
            )));
        }

        Ok(Self {
            range_min,
            range_max,
        })
    }

    /// Feature range as `(min, max)`
    pub fn range(&self) -> (f64, f64) {
        (self.range_min, self.range_max)
    }

    /// Capture the bounds of `series`
    pub fn fit(&self, series: &[f64]) -> Result<ScalerState> {
        ensure_finite(series)?;

        let data_min = series.iter().cloned().fold(f64::INFINITY, f64::min);
        let data_max = series.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        Ok(ScalerState {
            data_min,
            data_max,
            range_min: self.range_min,
            range_max: self.range_max,
        })
    }

    /// Fit on `series` and return the scaled series with the fitted state
    pub fn fit_transform(&self, series: &[f64]) -> Result<(Vec<f64>, ScalerState)> {
        let state = self.fit(series)?;
        Ok((state.transform(series), state))
    }
}

impl ScalerState {
    /// Fitted spread, or `None` when it is zero within rounding
    fn data_range(&self) -> Option<f64> {
        let data_range = self.data_max - self.data_min;
        let tolerance = 10.0 * f64::EPSILON * self.data_max.abs().max(self.data_min.abs()).max(1.0);
        (data_range.abs() > tolerance).then_some(data_range)
    }

    /// Multiplier applied after shifting by `data_min`
    fn scale(&self) -> f64 {
        // Zero spread falls back to a unit range
        (self.range_max - self.range_min) / self.data_range().unwrap_or(1.0)
    }

    /// Whether the fitted series had no spread, so a unit range was used
    pub fn is_degenerate(&self) -> bool {
        self.data_range().is_none()
    }

    /// Scale values with the fitted bounds
    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        let scale = self.scale();
        values
            .iter()
            .map(|v| (v - self.data_min) * scale + self.range_min)
            .collect()
    }

    /// Map scaled values back to the original units
    pub fn inverse_transform(&self, values: &[f64]) -> Vec<f64> {
        let scale = self.scale();
        values
            .iter()
            .map(|v| (v - self.range_min) / scale + self.data_min)
            .collect()
    }
}
