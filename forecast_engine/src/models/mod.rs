//! Forecasting strategies and the contract they share

use crate::config::ForecastConfig;
use crate::error::{ForecastError, Result};
use crate::evaluation;
use crate::persistence::SeriesFingerprint;
use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::{self, Debug};
use std::path::Path;
use std::str::FromStr;

pub mod arima;
pub mod linear;
pub mod lstm;
pub mod network;

pub use arima::ArimaModel;
pub use linear::LinearModel;
pub use lstm::LstmModel;

/// Identifier of a forecasting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    /// Autoregressive model on differenced prices
    #[serde(rename = "ARIMA")]
    Arima,
    /// Two-layer recurrent network over scaled windows
    #[serde(rename = "LSTM")]
    Lstm,
    /// Least-squares regression over scaled windows
    #[serde(rename = "LINEAR")]
    Linear,
}

impl ModelKind {
    /// Every strategy, in reporting order
    pub const ALL: [ModelKind; 3] = [ModelKind::Arima, ModelKind::Lstm, ModelKind::Linear];

    /// Identifier used in result records
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Arima => "ARIMA",
            ModelKind::Lstm => "LSTM",
            ModelKind::Linear => "LINEAR",
        }
    }

    /// Prefix of the persisted blob file name
    pub fn file_stem(&self) -> &'static str {
        match self {
            ModelKind::Arima => "arima",
            ModelKind::Lstm => "lstm",
            ModelKind::Linear => "linear",
        }
    }

    /// Construct an untrained forecaster for this strategy
    pub fn build(&self, config: &ForecastConfig) -> Result<Box<dyn Forecaster>> {
        Ok(match self {
            ModelKind::Arima => Box::new(ArimaModel::new(config.arima)?),
            ModelKind::Lstm => Box::new(LstmModel::new(&config.model, &config.lstm)?),
            ModelKind::Linear => Box::new(LinearModel::new(&config.model)?),
        })
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ARIMA" => Ok(ModelKind::Arima),
            "LSTM" => Ok(ModelKind::Lstm),
            "LINEAR" => Ok(ModelKind::Linear),
            _ => Err(ForecastError::InvalidInput(format!(
                "Unknown model type '{}', expected one of ARIMA, LSTM, LINEAR",
                s
            ))),
        }
    }
}

/// Holdout accuracy of a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Mean Absolute Percentage Error over the holdout
    pub mape: f64,
    /// Values predicted for the holdout
    pub predictions: Vec<f64>,
    /// Realised holdout values
    pub actual: Vec<f64>,
}

/// Next-day forecast of one strategy for one symbol
///
/// `predicted_close` comes from the cached model fit on the full series.
/// `mape` comes from a separate fit on the series minus its holdout, so the
/// two numbers describe different fits of the same strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResult {
    symbol: String,
    date: NaiveDate,
    predicted_close: f64,
    model_type: ModelKind,
    mape: f64,
}

impl ForecastResult {
    /// Create a new forecast result
    pub fn new(
        symbol: impl Into<String>,
        date: NaiveDate,
        predicted_close: f64,
        model_type: ModelKind,
        mape: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            date,
            predicted_close,
            model_type,
            mape,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Day the forecast is for
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn predicted_close(&self) -> f64 {
        self.predicted_close
    }

    pub fn model_type(&self) -> ModelKind {
        self.model_type
    }

    /// Holdout MAPE, as a percentage
    pub fn mape(&self) -> f64 {
        self.mape
    }

    /// Serialize the result to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Multi-day forecast keyed by 1-based horizon
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonForecast {
    model_type: ModelKind,
    values: Vec<f64>,
}

impl HorizonForecast {
    pub fn new(model_type: ModelKind, values: Vec<f64>) -> Self {
        Self { model_type, values }
    }

    pub fn model_type(&self) -> ModelKind {
        self.model_type
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value for a 1-based horizon
    pub fn at(&self, horizon: usize) -> Option<f64> {
        horizon
            .checked_sub(1)
            .and_then(|idx| self.values.get(idx).copied())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for HorizonForecast {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (idx, value) in self.values.iter().enumerate() {
            map.serialize_entry(&(idx + 1).to_string(), value)?;
        }
        map.end()
    }
}

/// Common interface for forecasting strategies
///
/// A forecaster starts untrained. `train` and `load` replace the whole fitted
/// state at once: on error the previous state is kept as it was.
pub trait Forecaster: Debug + Send {
    /// Strategy identifier
    fn kind(&self) -> ModelKind;

    /// Whether a successful `train` or `load` has happened
    fn is_trained(&self) -> bool;

    /// Shortest series `train` accepts
    fn min_train_len(&self) -> usize;

    /// Fingerprint of the series the current fit was trained on
    fn fingerprint(&self) -> Option<&SeriesFingerprint>;

    /// Fit on a chronological price series
    fn train(&mut self, series: &[f64]) -> Result<()>;

    /// Forecast `steps` values following `context`
    fn predict(&self, context: &[f64], steps: usize) -> Result<Vec<f64>>;

    /// Refit on all but the last `holdout` values and score the holdout
    fn evaluate(&mut self, series: &[f64], holdout: usize) -> Result<Evaluation> {
        evaluation::walk_forward(self, series, holdout)
    }

    /// Persist the fitted state
    fn save(&self, path: &Path) -> Result<()>;

    /// Replace the fitted state with a persisted one
    fn load(&mut self, path: &Path) -> Result<()>;
}

/// Validate a training series against a strategy's minimum length
pub(crate) fn check_training_series(kind: ModelKind, series: &[f64], min_len: usize) -> Result<()> {
    if series.len() < min_len {
        return Err(ForecastError::InvalidInput(format!(
            "{} needs at least {} observations, got {}",
            kind,
            min_len,
            series.len()
        )));
    }
    forecast_math::ensure_finite(series)?;
    Ok(())
}

pub(crate) fn not_trained(kind: ModelKind) -> ForecastError {
    ForecastError::NotTrained(format!("{} model has not been trained or loaded", kind))
}
