//! Walk-forward holdout evaluation

use crate::error::{ForecastError, Result};
use crate::models::{Evaluation, Forecaster};
use tracing::debug;

/// Split a series into its training prefix and the trailing `holdout` values
pub fn split_holdout(series: &[f64], holdout: usize) -> Result<(&[f64], &[f64])> {
    if holdout == 0 {
        return Err(ForecastError::InvalidInput(
            "holdout must be at least 1".to_string(),
        ));
    }
    if holdout >= series.len() {
        return Err(ForecastError::InvalidInput(format!(
            "holdout of {} leaves no training data in a series of {}",
            holdout,
            series.len()
        )));
    }

    Ok(series.split_at(series.len() - holdout))
}

/// Refit on the prefix, forecast the holdout and score it with MAPE
///
/// The forecaster is retrained in place, so callers that need their fitted
/// state afterwards should evaluate a separate instance.
pub fn walk_forward<F>(forecaster: &mut F, series: &[f64], holdout: usize) -> Result<Evaluation>
where
    F: Forecaster + ?Sized,
{
    let (train, test) = split_holdout(series, holdout)?;

    forecaster.train(train)?;
    let predictions = forecaster.predict(train, test.len())?;
    let mape = forecast_math::mape(test, &predictions)?;

    debug!(
        model = %forecaster.kind(),
        train_len = train.len(),
        holdout,
        mape,
        "walk-forward evaluation finished"
    );

    Ok(Evaluation {
        mape,
        predictions,
        actual: test.to_vec(),
    })
}
