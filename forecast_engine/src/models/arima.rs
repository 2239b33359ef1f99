//! ARIMA model for price forecasting
//!
//! The series is differenced `d` times and AR(p) coefficients are fit on the
//! differences by conditional least squares, without a constant term. Forecasts
//! are made on the differences and integrated back to price levels from the
//! last observed value of every differencing level.

use crate::config::ArimaConfig;
use crate::error::{ForecastError, Result};
use crate::models::{check_training_series, not_trained, Forecaster, ModelKind};
use crate::persistence::{self, FitMeta, ModelBlob, SeriesFingerprint};
use forecast_math::solve_least_squares;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const MAX_MA_COEFFICIENT: f64 = 0.99;

/// ARIMA model (AutoRegressive Integrated Moving Average)
#[derive(Debug, Clone)]
pub struct ArimaModel {
    order: ArimaConfig,
    fit: Option<ArimaFit>,
}

/// Fitted state of an [`ArimaModel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArimaFit {
    order: ArimaConfig,
    /// Fitted AR coefficients, lag 1 first
    ar_coefficients: Vec<f64>,
    /// Fitted MA coefficients, lag 1 first
    ma_coefficients: Vec<f64>,
    /// Last value of the series at each differencing level, level 0 first
    level_tails: Vec<f64>,
    /// Trailing values of the fully differenced series
    diff_tail: Vec<f64>,
    /// Trailing in-sample residuals
    residual_tail: Vec<f64>,
    #[serde(skip)]
    meta: Option<FitMeta>,
}

impl ArimaModel {
    /// Create a new untrained ARIMA(p, d, q) model
    pub fn new(order: ArimaConfig) -> Result<Self> {
        if order.d > 2 {
            return Err(ForecastError::InvalidInput(format!(
                "differencing order {} is not supported",
                order.d
            )));
        }
        Ok(Self { order, fit: None })
    }

    /// `(p, d, q)`
    pub fn order(&self) -> (usize, usize, usize) {
        (self.order.p, self.order.d, self.order.q)
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        self.fit
            .as_ref()
            .map(|f| f.ar_coefficients.as_slice())
            .unwrap_or(&[])
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        self.fit
            .as_ref()
            .map(|f| f.ma_coefficients.as_slice())
            .unwrap_or(&[])
    }

    fn fit_series(&self, series: &[f64]) -> Result<ArimaFit> {
        let ArimaConfig { p, d, q } = self.order;

        let mut level_tails = Vec::with_capacity(d);
        let mut diffs = series.to_vec();
        for _ in 0..d {
            level_tails.push(diffs[diffs.len() - 1]);
            diffs = difference(&diffs);
        }

        // Short series still fit, with fewer lags
        let effective_p = p.min(diffs.len().saturating_sub(1));
        let ar_coefficients = if effective_p == 0 {
            Vec::new()
        } else {
            let rows = diffs.len() - effective_p;
            let mut x = Array2::zeros((rows, effective_p));
            let mut y = Array1::zeros(rows);
            for (row, t) in (effective_p..diffs.len()).enumerate() {
                for lag in 0..effective_p {
                    x[[row, lag]] = diffs[t - 1 - lag];
                }
                y[row] = diffs[t];
            }
            solve_least_squares(&x, &y)?.to_vec()
        };

        let residuals: Vec<f64> = (effective_p..diffs.len())
            .map(|t| diffs[t] - ar_step(&ar_coefficients, &diffs[..t]))
            .collect();
        let ma_coefficients = estimate_ma_coefficients(&residuals, q);

        debug!(
            p,
            d,
            q,
            effective_p,
            ar = ?ar_coefficients,
            "fitted ARIMA coefficients"
        );

        Ok(ArimaFit {
            order: self.order,
            diff_tail: tail(&diffs, effective_p),
            residual_tail: tail(&residuals, q),
            ar_coefficients,
            ma_coefficients,
            level_tails,
            meta: Some(FitMeta::new(series)),
        })
    }
}

impl ArimaFit {
    fn forecast(&self, steps: usize) -> Vec<f64> {
        let mut history = self.diff_tail.clone();
        let mut shocks = self.residual_tail.clone();
        let mut levels = self.level_tails.clone();
        let mut forecasts = Vec::with_capacity(steps);

        for _ in 0..steps {
            let ma: f64 = self
                .ma_coefficients
                .iter()
                .zip(shocks.iter().rev())
                .map(|(theta, e)| theta * e)
                .sum();
            let next_diff = ar_step(&self.ar_coefficients, &history) + ma;
            history.push(next_diff);
            // Future shocks have zero expectation
            shocks.push(0.0);

            // Integrate from the highest differencing level down to prices
            let mut value = next_diff;
            for level in levels.iter_mut().rev() {
                *level += value;
                value = *level;
            }
            forecasts.push(value);
        }

        forecasts
    }
}

impl Forecaster for ArimaModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Arima
    }

    fn is_trained(&self) -> bool {
        self.fit.is_some()
    }

    fn min_train_len(&self) -> usize {
        (self.order.d + 1).max(2)
    }

    fn fingerprint(&self) -> Option<&SeriesFingerprint> {
        self.fit
            .as_ref()
            .and_then(|f| f.meta.as_ref())
            .map(|m| &m.fingerprint)
    }

    fn train(&mut self, series: &[f64]) -> Result<()> {
        check_training_series(self.kind(), series, self.min_train_len())?;
        let fit = self.fit_series(series)?;
        self.fit = Some(fit);
        Ok(())
    }

    /// Forecasts continue from the end of the training series; `context` is
    /// not used.
    fn predict(&self, _context: &[f64], steps: usize) -> Result<Vec<f64>> {
        let fit = self.fit.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        Ok(fit.forecast(steps))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let fit = self.fit.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        let meta = fit
            .meta
            .as_ref()
            .ok_or_else(|| not_trained(self.kind()))?;
        persistence::write_blob(path, &ModelBlob::new(self.kind(), meta, fit))
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let blob: ModelBlob<ArimaFit> = persistence::read_blob(path, self.kind())?;
        let meta = blob.meta();
        let mut fit = blob.payload;

        if fit.order != self.order {
            return Err(ForecastError::corrupt(
                path,
                format!(
                    "blob was fit with order ({}, {}, {}), model is configured for ({}, {}, {})",
                    fit.order.p, fit.order.d, fit.order.q, self.order.p, self.order.d, self.order.q
                ),
            ));
        }
        if fit.level_tails.len() != fit.order.d
            || fit.diff_tail.len() < fit.ar_coefficients.len()
            || fit.residual_tail.len() > fit.ma_coefficients.len()
        {
            return Err(ForecastError::corrupt(path, "inconsistent ARIMA state"));
        }
        if fit
            .ar_coefficients
            .iter()
            .chain(&fit.ma_coefficients)
            .chain(&fit.level_tails)
            .chain(&fit.diff_tail)
            .chain(&fit.residual_tail)
            .any(|v| !v.is_finite())
        {
            return Err(ForecastError::corrupt(path, "non-finite ARIMA parameter"));
        }

        fit.meta = Some(meta);
        self.fit = Some(fit);
        Ok(())
    }
}

fn difference(data: &[f64]) -> Vec<f64> {
    data.windows(2).map(|w| w[1] - w[0]).collect()
}

fn tail(values: &[f64], n: usize) -> Vec<f64> {
    values[values.len().saturating_sub(n)..].to_vec()
}

/// One-step AR prediction from the end of `history`
fn ar_step(coefficients: &[f64], history: &[f64]) -> f64 {
    coefficients
        .iter()
        .zip(history.iter().rev())
        .map(|(phi, x)| phi * x)
        .sum()
}

/// MA coefficients from the autocorrelation of the AR residuals
fn estimate_ma_coefficients(residuals: &[f64], q: usize) -> Vec<f64> {
    let mut coefficients = vec![0.0; q];
    let n = residuals.len();
    if q == 0 || n == 0 {
        return coefficients;
    }

    let mean = residuals.iter().sum::<f64>() / n as f64;
    let centred: Vec<f64> = residuals.iter().map(|e| e - mean).collect();
    let variance = centred.iter().map(|e| e * e).sum::<f64>() / n as f64;
    if variance <= 1e-10 {
        return coefficients;
    }

    for (k, coefficient) in coefficients.iter_mut().enumerate() {
        let lag = k + 1;
        let covariance: f64 = (lag..n).map(|i| centred[i] * centred[i - lag]).sum::<f64>() / n as f64;
        *coefficient = (covariance / variance).clamp(-MAX_MA_COEFFICIENT, MAX_MA_COEFFICIENT);
    }

    coefficients
}
