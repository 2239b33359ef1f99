//! Iterative multi-step forecasting
//!
//! A single-step predictor is driven over its own output: predict from the
//! current window, append the prediction, drop the oldest value, repeat.

use crate::error::{ForecastError, Result};
use forecast_math::ScalerState;
use std::collections::VecDeque;

/// Roll a single-step predictor forward `steps` times from `seed`
///
/// The window keeps the length of `seed`. Step `k` sees the last
/// `seed.len() - k` seed values followed by the first `k` predictions.
pub fn rollout<F>(seed: &[f64], steps: usize, mut step: F) -> Result<Vec<f64>>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    let mut window: VecDeque<f64> = seed.iter().copied().collect();
    let mut predictions = Vec::with_capacity(steps);

    for _ in 0..steps {
        let next = step(window.make_contiguous())?;
        if !next.is_finite() {
            return Err(ForecastError::TrainingFailure(format!(
                "prediction {} of {} is not finite",
                predictions.len() + 1,
                steps
            )));
        }

        predictions.push(next);
        window.pop_front();
        window.push_back(next);
    }

    Ok(predictions)
}

/// Roll out in scaled space using the fit-time scaler
///
/// `context` is transformed with `scaler` (never refit), its last
/// `window_len` values seed the loop and the whole batch of predictions is
/// mapped back to price units at the end.
pub fn scaled_rollout<F>(
    scaler: &ScalerState,
    context: &[f64],
    window_len: usize,
    steps: usize,
    step: F,
) -> Result<Vec<f64>>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    if context.len() < window_len {
        return Err(ForecastError::InvalidInput(format!(
            "context has {} values, the model needs at least {}",
            context.len(),
            window_len
        )));
    }
    if steps == 0 {
        return Ok(Vec::new());
    }
    forecast_math::ensure_finite(context)?;

    let scaled = scaler.transform(&context[context.len() - window_len..]);
    let predictions = rollout(&scaled, steps, step)?;
    Ok(scaler.inverse_transform(&predictions))
}
