//! Windowed linear regression
//!
//! Each prediction is an affine function of the previous `window_len` scaled
//! prices, fit by ordinary least squares over every window of the training
//! series.

use crate::config::ModelConfig;
use crate::error::{ForecastError, Result};
use crate::models::{check_training_series, not_trained, Forecaster, ModelKind};
use crate::persistence::{self, FitMeta, ModelBlob, SeriesFingerprint};
use crate::rollout::scaled_rollout;
use forecast_math::{make_windows, solve_ols_with_intercept, MinMaxScaler, OlsFit, ScalerState};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Least-squares regressor over sliding windows
#[derive(Debug, Clone)]
pub struct LinearModel {
    window_len: usize,
    scaler: MinMaxScaler,
    fit: Option<LinearFit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LinearFit {
    window_len: usize,
    scaler: ScalerState,
    ols: OlsFit,
    #[serde(skip)]
    meta: Option<FitMeta>,
}

impl LinearModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        if config.window_len == 0 {
            return Err(ForecastError::InvalidInput(
                "window length must be at least 1".to_string(),
            ));
        }
        let (lo, hi) = config.scale_range;
        Ok(Self {
            window_len: config.window_len,
            scaler: MinMaxScaler::new(lo, hi)?,
            fit: None,
        })
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Regression weights, oldest lag first, and the intercept
    pub fn coefficients(&self) -> Option<(&[f64], f64)> {
        self.fit.as_ref().and_then(|fit| {
            fit.ols
                .coefficients
                .as_slice()
                .map(|c| (c, fit.ols.intercept))
        })
    }
}

impl Forecaster for LinearModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn is_trained(&self) -> bool {
        self.fit.is_some()
    }

    fn min_train_len(&self) -> usize {
        self.window_len + 1
    }

    fn fingerprint(&self) -> Option<&SeriesFingerprint> {
        self.fit
            .as_ref()
            .and_then(|f| f.meta.as_ref())
            .map(|m| &m.fingerprint)
    }

    fn train(&mut self, series: &[f64]) -> Result<()> {
        check_training_series(self.kind(), series, self.min_train_len())?;

        let (scaled, scaler) = self.scaler.fit_transform(series)?;
        let windows = make_windows(&scaled, self.window_len);

        let mut x = Array2::zeros((windows.len(), self.window_len));
        for (row, (input, _)) in windows.iter().enumerate() {
            for (col, value) in input.iter().enumerate() {
                x[[row, col]] = *value;
            }
        }
        let y = Array1::from(windows.labels.clone());
        let ols = solve_ols_with_intercept(&x, &y)?;

        debug!(
            windows = windows.len(),
            intercept = ols.intercept,
            "fitted windowed linear regression"
        );

        self.fit = Some(LinearFit {
            window_len: self.window_len,
            scaler,
            ols,
            meta: Some(FitMeta::new(series)),
        });
        Ok(())
    }

    fn predict(&self, context: &[f64], steps: usize) -> Result<Vec<f64>> {
        let fit = self.fit.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        scaled_rollout(&fit.scaler, context, fit.window_len, steps, |window| {
            Ok(fit.ols.predict_row(window)?)
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        let fit = self.fit.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        let meta = fit.meta.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        persistence::write_blob(path, &ModelBlob::new(self.kind(), meta, fit))
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let blob: ModelBlob<LinearFit> = persistence::read_blob(path, self.kind())?;
        let meta = blob.meta();
        let mut fit = blob.payload;

        if fit.window_len != self.window_len || fit.ols.coefficients.len() != fit.window_len {
            return Err(ForecastError::corrupt(
                path,
                format!(
                    "blob has window {} with {} coefficients, model expects window {}",
                    fit.window_len,
                    fit.ols.coefficients.len(),
                    self.window_len
                ),
            ));
        }
        if !fit.ols.intercept.is_finite() || fit.ols.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ForecastError::corrupt(path, "non-finite regression weight"));
        }

        fit.meta = Some(meta);
        self.fit = Some(fit);
        Ok(())
    }
}
