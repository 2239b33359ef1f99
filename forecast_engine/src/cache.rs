//! Cache-aside model store and forecast orchestration
//!
//! Fitted models live on disk, one blob per (symbol, strategy). A request
//! loads the blob when it exists and is readable, and otherwise trains a new
//! model and writes it back. Work on the same (symbol, strategy) pair is
//! serialised so two callers never train or write one blob at the same time.

use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::models::{Evaluation, ForecastResult, Forecaster, HorizonForecast, ModelKind};
use crate::worker::TrainingPool;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{info, warn};

/// Why a model was trained instead of loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainReason {
    /// No blob on disk
    Missing,
    /// The blob could not be used
    Corrupt,
    /// The blob was fit on a different series
    Stale,
}

/// Where a cached model came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    Loaded,
    Trained(TrainReason),
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Loaded => write!(f, "loaded"),
            ModelSource::Trained(TrainReason::Missing) => write!(f, "trained (no saved model)"),
            ModelSource::Trained(TrainReason::Corrupt) => write!(f, "trained (saved model unusable)"),
            ModelSource::Trained(TrainReason::Stale) => write!(f, "trained (new data)"),
        }
    }
}

/// A ready-to-use forecaster and how it was obtained
#[derive(Debug)]
pub struct CachedModel {
    pub forecaster: Box<dyn Forecaster>,
    pub source: ModelSource,
}

/// Result of one strategy within a prediction request
#[derive(Debug)]
pub struct StrategyOutcome {
    pub kind: ModelKind,
    pub result: Result<ForecastResult>,
}

/// Per-strategy results for one symbol
///
/// Strategies succeed or fail independently.
#[derive(Debug)]
pub struct PredictionReport {
    pub symbol: String,
    pub outcomes: Vec<StrategyOutcome>,
}

impl PredictionReport {
    /// Successful forecasts, in strategy order
    pub fn results(&self) -> impl Iterator<Item = &ForecastResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Strategies that failed and why
    pub fn failures(&self) -> impl Iterator<Item = (ModelKind, &ForecastError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.kind, e)))
    }

    /// `{"symbol", "predictions": [...], "errors": {"LSTM": "..."}}`
    pub fn to_json(&self) -> Result<String> {
        let predictions = self
            .results()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<Value>, _>>()?;
        let errors: Map<String, Value> = self
            .failures()
            .map(|(kind, e)| (kind.to_string(), Value::String(e.to_string())))
            .collect();

        Ok(serde_json::to_string_pretty(&json!({
            "symbol": self.symbol,
            "predictions": predictions,
            "errors": errors,
        }))?)
    }
}

type ModelKey = (String, ModelKind);

/// Disk-backed cache of fitted models
#[derive(Debug)]
pub struct ModelCache {
    config: ForecastConfig,
    locks: Mutex<HashMap<ModelKey, Arc<Mutex<()>>>>,
}

/// Reject symbols that could reach outside the model directory
pub fn validate_symbol(symbol: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^');
    if symbol.is_empty() || !symbol.chars().all(allowed) || symbol.chars().all(|c| c == '.') {
        return Err(ForecastError::InvalidInput(format!(
            "Invalid symbol '{}': use letters, digits, '.', '-', '_' or '^'",
            symbol
        )));
    }
    Ok(())
}

impl ModelCache {
    pub fn new(config: ForecastConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// `<model_dir>/<kind>_<symbol>.json`
    pub fn model_path(&self, symbol: &str, kind: ModelKind) -> Result<PathBuf> {
        validate_symbol(symbol)?;
        Ok(self
            .config
            .cache
            .model_dir
            .join(format!("{}_{}.json", kind.file_stem(), symbol)))
    }

    fn lock_for(&self, key: &ModelKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drop the map entry for `key` once no caller holds its lock
    fn release(&self, key: &ModelKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(key).map_or(false, |l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    /// Number of (symbol, strategy) pairs currently being loaded or trained
    pub fn in_flight(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Load the persisted model for (symbol, kind), or train and persist one
    ///
    /// A failed training run leaves any blob on disk untouched.
    pub fn train_or_load(&self, symbol: &str, kind: ModelKind, series: &[f64]) -> Result<CachedModel> {
        let path = self.model_path(symbol, kind)?;
        let key = (symbol.to_string(), kind);
        let lock = self.lock_for(&key);
        let outcome = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.load_or_train(symbol, kind, &path, series)
        };
        self.release(&key, lock);
        outcome
    }

    fn load_or_train(
        &self,
        symbol: &str,
        kind: ModelKind,
        path: &Path,
        series: &[f64],
    ) -> Result<CachedModel> {
        let mut forecaster = kind.build(&self.config)?;
        let reason = match forecaster.load(path) {
            Ok(()) => {
                let fresh = forecaster
                    .fingerprint()
                    .map_or(false, |fp| fp.matches(series));
                if self.config.cache.invalidate_on_new_data && !fresh {
                    info!(%symbol, model = %kind, "saved model was fit on other data, retraining");
                    TrainReason::Stale
                } else {
                    info!(%symbol, model = %kind, path = %path.display(), "loaded saved model");
                    return Ok(CachedModel {
                        forecaster,
                        source: ModelSource::Loaded,
                    });
                }
            }
            Err(ForecastError::PersistenceNotFound(_)) => {
                info!(%symbol, model = %kind, "no saved model, training");
                TrainReason::Missing
            }
            Err(e @ ForecastError::PersistenceCorrupt { .. }) => {
                warn!(%symbol, model = %kind, error = %e, "saved model unusable, retraining");
                TrainReason::Corrupt
            }
            Err(e) => return Err(e),
        };

        forecaster.train(series)?;
        forecaster.save(path)?;
        info!(%symbol, model = %kind, path = %path.display(), "trained and saved model");

        Ok(CachedModel {
            forecaster,
            source: ModelSource::Trained(reason),
        })
    }

    /// Holdout accuracy of `kind` on a fresh, unpersisted instance
    pub fn evaluate(&self, kind: ModelKind, series: &[f64]) -> Result<Evaluation> {
        let mut forecaster = kind.build(&self.config)?;
        forecaster.evaluate(series, self.config.evaluation.holdout)
    }

    /// Next-day forecast of one strategy, dated the day after `as_of`
    ///
    /// The predicted close comes from the cached model. The MAPE comes from
    /// [`ModelCache::evaluate`], a separate fit that never touches the cache.
    pub fn predict_strategy(
        &self,
        symbol: &str,
        kind: ModelKind,
        series: &[f64],
        as_of: NaiveDate,
    ) -> Result<ForecastResult> {
        let date = as_of.succ_opt().ok_or_else(|| {
            ForecastError::InvalidInput(format!("no calendar day follows {}", as_of))
        })?;

        let cached = self.train_or_load(symbol, kind, series)?;
        let predicted_close = cached
            .forecaster
            .predict(series, 1)?
            .first()
            .copied()
            .ok_or_else(|| ForecastError::TrainingFailure(format!("{} returned no forecast", kind)))?;

        let evaluation = self.evaluate(kind, series)?;

        Ok(ForecastResult::new(
            symbol,
            date,
            predicted_close,
            kind,
            evaluation.mape,
        ))
    }

    /// Next-day forecasts from every strategy, one after another
    pub fn predictions(&self, symbol: &str, series: &[f64], as_of: NaiveDate) -> PredictionReport {
        let outcomes = ModelKind::ALL
            .iter()
            .map(|&kind| StrategyOutcome {
                kind,
                result: self.predict_strategy(symbol, kind, series, as_of),
            })
            .collect();

        PredictionReport {
            symbol: symbol.to_string(),
            outcomes,
        }
    }

    /// Next-day forecasts from every strategy, trained in parallel on `pool`
    ///
    /// A strategy that misses `runtime.train_timeout_secs` is reported as
    /// `StillTraining`; its job keeps running and will still save its model.
    pub fn predictions_on(
        self: &Arc<Self>,
        pool: &TrainingPool,
        symbol: &str,
        series: &[f64],
        as_of: NaiveDate,
    ) -> PredictionReport {
        let series: Arc<[f64]> = Arc::from(series);
        let timeout = self.config.runtime.train_timeout();

        let tickets: Vec<_> = ModelKind::ALL
            .iter()
            .map(|&kind| {
                let cache = Arc::clone(self);
                let series = Arc::clone(&series);
                let owned_symbol = symbol.to_string();
                let ticket = pool.submit(format!("{} {}", kind, symbol), move || {
                    cache.predict_strategy(&owned_symbol, kind, &series, as_of)
                });
                (kind, ticket)
            })
            .collect();

        // One deadline for the whole batch, not one per strategy
        let deadline = Instant::now() + timeout;
        let outcomes = tickets
            .into_iter()
            .map(|(kind, ticket)| StrategyOutcome {
                kind,
                result: ticket.and_then(|t| t.wait(deadline.saturating_duration_since(Instant::now()))),
            })
            .collect();

        PredictionReport {
            symbol: symbol.to_string(),
            outcomes,
        }
    }

    /// Forecast `days` values ahead with a cached model
    pub fn future(
        &self,
        symbol: &str,
        kind: ModelKind,
        series: &[f64],
        days: usize,
    ) -> Result<HorizonForecast> {
        if days == 0 {
            return Err(ForecastError::InvalidInput(
                "forecast horizon must be at least one day".to_string(),
            ));
        }

        let cached = self.train_or_load(symbol, kind, series)?;
        let values = cached.forecaster.predict(series, days)?;
        Ok(HorizonForecast::new(kind, values))
    }
}
