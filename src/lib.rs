//! # Stockcast
//!
//! `stockcast_workspace` bundles the crates of the stockcast project:
//!
//! - [`math`]: scaling, windowing, least squares and error metrics
//! - [`engine`]: forecasting strategies, evaluation and the model cache
//!
//! ## Example
//!
//! ```
//! use stockcast_workspace::engine::{ForecastConfig, Forecaster, ModelKind};
//!
//! let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
//! let mut model = ModelKind::Linear.build(&ForecastConfig::default()).unwrap();
//! model.train(&prices).unwrap();
//!
//! let next = model.predict(&prices, 3).unwrap();
//! assert_eq!(next.len(), 3);
//! assert!((next[0] - 130.0).abs() < 1e-3);
//! ```

pub use forecast_engine as engine;
pub use forecast_math as math;

/// Strategies available to every caller
pub fn strategies() -> &'static [engine::ModelKind] {
    &engine::ModelKind::ALL
}
