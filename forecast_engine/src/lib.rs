//! # Forecast Engine
//!
//! Next-day and multi-day stock price forecasts from three interchangeable
//! strategies.
//!
//! ## Features
//!
//! - ARIMA(5,1,0) on differenced prices
//! - Two-layer LSTM over scaled 10-day windows
//! - Windowed linear regression over the same windows
//! - Walk-forward holdout evaluation with MAPE
//! - Cache-aside model persistence, one JSON blob per symbol and strategy
//! - A bounded training pool with per-job deadlines
//!
//! Every strategy implements [`Forecaster`], so callers train, persist, reload
//! and predict without knowing which model they hold.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use forecast_engine::{DataLoader, ForecastConfig, ModelCache, ModelKind};
//!
//! # fn main() -> forecast_engine::Result<()> {
//! let history = DataLoader::from_csv("AAPL.csv")?;
//! let cache = ModelCache::new(ForecastConfig::default());
//!
//! // Week ahead from the cached ARIMA model
//! let week = cache.future("AAPL", ModelKind::Arima, history.close(), 7)?;
//! println!("{:?}", week.values());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod persistence;
pub mod rollout;
pub mod worker;

// Re-export commonly used types
pub use crate::cache::{CachedModel, ModelCache, ModelSource, PredictionReport, StrategyOutcome, TrainReason};
pub use crate::config::ForecastConfig;
pub use crate::data::{DataLoader, PriceHistory};
pub use crate::error::{ForecastError, Result};
pub use crate::models::{Evaluation, ForecastResult, Forecaster, HorizonForecast, ModelKind};
pub use crate::worker::{TrainingPool, TrainingTicket};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
