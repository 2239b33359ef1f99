//! Recurrent forecaster over scaled price windows
//!
//! Persisted as two artifacts written for the same fit: the network weights at
//! the requested path and the scaler bounds next to it with a `_scaler` suffix.
//! Both carry the same `fit_id`; a load that finds them out of step reports the
//! pair as corrupt.

use crate::config::{LstmConfig, ModelConfig};
use crate::error::{ForecastError, Result};
use crate::models::network::{train_network, LstmNetwork, TrainingReport};
use crate::models::{check_training_series, not_trained, Forecaster, ModelKind};
use crate::persistence::{self, FitMeta, ModelBlob, SeriesFingerprint};
use crate::rollout::scaled_rollout;
use forecast_math::{make_windows, MinMaxScaler, ScalerState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Two-layer LSTM regressor
#[derive(Debug, Clone)]
pub struct LstmModel {
    window_len: usize,
    scaler: MinMaxScaler,
    config: LstmConfig,
    fit: Option<LstmFit>,
}

#[derive(Debug, Clone)]
struct LstmFit {
    scaler: ScalerState,
    network: LstmNetwork,
    meta: FitMeta,
    report: Option<TrainingReport>,
}

#[derive(Serialize, Deserialize)]
struct NetworkPayload<N> {
    window_len: usize,
    network: N,
}

/// Location of the scaler artifact that accompanies a network blob
pub fn scaler_path(network_path: &Path) -> PathBuf {
    let stem = network_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    network_path.with_file_name(format!("{}_scaler.json", stem))
}

impl LstmModel {
    pub fn new(model: &ModelConfig, config: &LstmConfig) -> Result<Self> {
        if model.window_len == 0 {
            return Err(ForecastError::InvalidInput(
                "window length must be at least 1".to_string(),
            ));
        }
        if config.hidden_units == 0 || config.dense_units == 0 || config.batch_size == 0 {
            return Err(ForecastError::InvalidInput(
                "LSTM layer widths and batch size must be positive".to_string(),
            ));
        }
        let (lo, hi) = model.scale_range;
        Ok(Self {
            window_len: model.window_len,
            scaler: MinMaxScaler::new(lo, hi)?,
            config: config.clone(),
            fit: None,
        })
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Losses of the last training run, if this instance was trained rather
    /// than loaded
    pub fn training_report(&self) -> Option<&TrainingReport> {
        self.fit.as_ref().and_then(|f| f.report.as_ref())
    }
}

impl Forecaster for LstmModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Lstm
    }

    fn is_trained(&self) -> bool {
        self.fit.is_some()
    }

    fn min_train_len(&self) -> usize {
        self.window_len + 2
    }

    fn fingerprint(&self) -> Option<&SeriesFingerprint> {
        self.fit.as_ref().map(|f| &f.meta.fingerprint)
    }

    fn train(&mut self, series: &[f64]) -> Result<()> {
        check_training_series(self.kind(), series, self.min_train_len())?;

        let (scaled, scaler) = self.scaler.fit_transform(series)?;
        let windows = make_windows(&scaled, self.window_len);
        let (network, report) = train_network(&windows, &self.config)?;

        self.fit = Some(LstmFit {
            scaler,
            network,
            meta: FitMeta::new(series),
            report: Some(report),
        });
        Ok(())
    }

    fn predict(&self, context: &[f64], steps: usize) -> Result<Vec<f64>> {
        let fit = self.fit.as_ref().ok_or_else(|| not_trained(self.kind()))?;
        scaled_rollout(&fit.scaler, context, self.window_len, steps, |window| {
            Ok(fit.network.predict(window))
        })
    }

    fn save(&self, path: &Path) -> Result<()> {
        let fit = self.fit.as_ref().ok_or_else(|| not_trained(self.kind()))?;

        let scaler = serde_json::to_vec(&ModelBlob::new(self.kind(), &fit.meta, &fit.scaler))?;
        let network = serde_json::to_vec(&ModelBlob::new(
            self.kind(),
            &fit.meta,
            NetworkPayload {
                window_len: self.window_len,
                network: &fit.network,
            },
        ))?;

        // Scaler is renamed first: a network blob on disk always has its partner
        let partner = scaler_path(path);
        persistence::write_atomic_all(&[
            (partner.as_path(), scaler.as_slice()),
            (path, network.as_slice()),
        ])
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let network_blob: ModelBlob<NetworkPayload<LstmNetwork>> =
            persistence::read_blob(path, self.kind())?;

        let partner = scaler_path(path);
        let scaler_blob: ModelBlob<ScalerState> = match persistence::read_blob(&partner, self.kind()) {
            Ok(blob) => blob,
            Err(ForecastError::PersistenceNotFound(_)) => {
                return Err(ForecastError::corrupt(
                    path,
                    format!("scaler artifact {} is missing", partner.display()),
                ))
            }
            Err(e) => return Err(e),
        };

        if scaler_blob.fit_id != network_blob.fit_id
            || scaler_blob.fingerprint != network_blob.fingerprint
        {
            return Err(ForecastError::corrupt(
                path,
                format!(
                    "network fit {} and scaler fit {} do not belong together",
                    network_blob.fit_id, scaler_blob.fit_id
                ),
            ));
        }

        let meta = network_blob.meta();
        let payload = network_blob.payload;
        if payload.window_len != self.window_len {
            return Err(ForecastError::corrupt(
                path,
                format!(
                    "blob was trained on windows of {}, model expects {}",
                    payload.window_len, self.window_len
                ),
            ));
        }
        payload
            .network
            .validate(self.config.hidden_units, self.config.dense_units)
            .map_err(|reason| ForecastError::corrupt(path, reason))?;

        let scaler = scaler_blob.payload;
        if ![scaler.data_min, scaler.data_max, scaler.range_min, scaler.range_max]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(ForecastError::corrupt(&partner, "non-finite scaler bound"));
        }

        self.fit = Some(LstmFit {
            scaler,
            network: payload.network,
            meta,
            report: None,
        });
        Ok(())
    }
}
