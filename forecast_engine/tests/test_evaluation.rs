use approx::assert_relative_eq;
use forecast_engine::config::ModelConfig;
use forecast_engine::evaluation::{split_holdout, walk_forward};
use forecast_engine::models::LinearModel;
use forecast_engine::persistence::SeriesFingerprint;
use forecast_engine::rollout::{rollout, scaled_rollout};
use forecast_engine::{ForecastError, Forecaster, ModelKind, Result};
use forecast_math::MinMaxScaler;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::Path;

/// Forecaster that always predicts the same values
#[derive(Debug)]
struct FixedForecaster {
    values: Vec<f64>,
    trained_on: Option<usize>,
}

impl Forecaster for FixedForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn is_trained(&self) -> bool {
        self.trained_on.is_some()
    }

    fn min_train_len(&self) -> usize {
        1
    }

    fn fingerprint(&self) -> Option<&SeriesFingerprint> {
        None
    }

    fn train(&mut self, series: &[f64]) -> Result<()> {
        self.trained_on = Some(series.len());
        Ok(())
    }

    fn predict(&self, _context: &[f64], steps: usize) -> Result<Vec<f64>> {
        Ok(self.values.iter().copied().cycle().take(steps).collect())
    }

    fn save(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        Err(ForecastError::PersistenceNotFound(path.to_path_buf()))
    }
}

#[test]
fn test_split_holdout() {
    let series = [1.0, 2.0, 3.0, 4.0, 5.0];
    let (train, test) = split_holdout(&series, 2).unwrap();

    assert_eq!(train, &[1.0, 2.0, 3.0]);
    assert_eq!(test, &[4.0, 5.0]);
}

#[rstest]
#[case(0)]
#[case(5)]
#[case(9)]
fn test_split_holdout_rejects(#[case] holdout: usize) {
    let series = [1.0, 2.0, 3.0, 4.0, 5.0];
    assert!(matches!(
        split_holdout(&series, holdout),
        Err(ForecastError::InvalidInput(_))
    ));
}

#[test]
fn test_default_evaluate_scores_holdout() {
    let mut model = FixedForecaster {
        values: vec![110.0, 90.0, 100.0],
        trained_on: None,
    };
    let series = [95.0, 97.0, 99.0, 100.0, 100.0, 100.0];

    let evaluation = model.evaluate(&series, 3).unwrap();

    assert_eq!(model.trained_on, Some(3));
    assert_eq!(evaluation.actual, vec![100.0, 100.0, 100.0]);
    assert_eq!(evaluation.predictions, vec![110.0, 90.0, 100.0]);
    assert_relative_eq!(evaluation.mape, 20.0 / 3.0, epsilon = 1e-12);
}

#[test]
fn test_all_zero_holdout_is_rejected() {
    let mut model = FixedForecaster {
        values: vec![1.0],
        trained_on: None,
    };
    let series = [5.0, 4.0, 0.0, 0.0];

    assert!(matches!(
        model.evaluate(&series, 2),
        Err(ForecastError::InvalidInput(_))
    ));
}

#[test]
fn test_walk_forward_on_linear_model() {
    let series: Vec<f64> = (0..40).map(|i| 50.0 + 0.5 * i as f64).collect();
    let mut model = LinearModel::new(&ModelConfig::default()).unwrap();

    let evaluation = walk_forward(&mut model, &series, 10).unwrap();

    assert_eq!(evaluation.predictions.len(), 10);
    assert_eq!(evaluation.actual, series[30..].to_vec());
    assert!(evaluation.mape >= 0.0);
    assert!(evaluation.mape < 0.01);
    // The model is left fit on the training prefix
    assert_eq!(model.fingerprint().map(|f| f.len), Some(30));
}

#[test]
fn test_rollout_feeds_predictions_back() {
    let predictions = rollout(&[1.0, 2.0, 3.0], 4, |window| Ok(window.iter().sum())).unwrap();
    assert_eq!(predictions, vec![6.0, 11.0, 20.0, 37.0]);

    let prefix = rollout(&[1.0, 2.0, 3.0], 2, |window| Ok(window.iter().sum())).unwrap();
    assert_eq!(prefix, predictions[..2].to_vec());
}

#[test]
fn test_rollout_window_slides() {
    let mut seen = Vec::new();
    rollout(&[1.0, 2.0], 3, |window| {
        seen.push(window.to_vec());
        Ok(window[1] + 1.0)
    })
    .unwrap();

    assert_eq!(seen, vec![vec![1.0, 2.0], vec![2.0, 3.0], vec![3.0, 4.0]]);
}

#[test]
fn test_rollout_rejects_non_finite_step() {
    let result = rollout(&[1.0], 2, |_| Ok(f64::NAN));
    assert!(matches!(result, Err(ForecastError::TrainingFailure(_))));
}

#[test]
fn test_scaled_rollout_uses_fit_time_bounds() {
    let (_, state) = MinMaxScaler::default().fit_transform(&[0.0, 10.0]).unwrap();

    // Context outside the fitted range is not rescaled
    let predictions = scaled_rollout(&state, &[30.0, 20.0], 2, 2, |window| Ok(window[1])).unwrap();
    assert_relative_eq!(predictions[0], 20.0, epsilon = 1e-12);
    assert_relative_eq!(predictions[1], 20.0, epsilon = 1e-12);

    assert!(matches!(
        scaled_rollout(&state, &[1.0], 2, 1, |window| Ok(window[0])),
        Err(ForecastError::InvalidInput(_))
    ));
}
