use approx::assert_relative_eq;
use chrono::NaiveDate;
use forecast_engine::config::{ArimaConfig, LstmConfig, ModelConfig};
use forecast_engine::models::{ArimaModel, LinearModel, LstmModel};
use forecast_engine::{ForecastConfig, ForecastError, ForecastResult, Forecaster, HorizonForecast, ModelKind};
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::tempdir;

fn wavy_series(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 0.5 * i as f64 + 3.0 * (i as f64 * 0.7).sin())
        .collect()
}

fn small_lstm() -> LstmConfig {
    LstmConfig {
        hidden_units: 8,
        dense_units: 4,
        epochs: 3,
        batch_size: 8,
        ..LstmConfig::default()
    }
}

#[test]
fn test_model_kind_names() {
    assert_eq!(ModelKind::Arima.to_string(), "ARIMA");
    assert_eq!(ModelKind::Lstm.to_string(), "LSTM");
    assert_eq!(ModelKind::Linear.to_string(), "LINEAR");
    assert_eq!("linear".parse::<ModelKind>().unwrap(), ModelKind::Linear);
    assert_eq!("Arima".parse::<ModelKind>().unwrap(), ModelKind::Arima);
    assert!(matches!(
        "prophet".parse::<ModelKind>(),
        Err(ForecastError::InvalidInput(_))
    ));
    assert_eq!(serde_json::to_string(&ModelKind::Lstm).unwrap(), "\"LSTM\"");
}

#[test]
fn test_forecast_result_json_shape() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
    let result = ForecastResult::new("AAPL", date, 187.25, ModelKind::Arima, 1.5);
    let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();

    assert_eq!(value["symbol"], "AAPL");
    assert_eq!(value["date"], "2024-01-03");
    assert_eq!(value["predictedClose"], 187.25);
    assert_eq!(value["modelType"], "ARIMA");
    assert_eq!(value["mape"], 1.5);
}

#[test]
fn test_horizon_forecast_keys() {
    let forecast = HorizonForecast::new(ModelKind::Arima, vec![1.0, 2.0, 3.0]);
    let json = serde_json::to_string(&forecast).unwrap();

    assert_eq!(json, r#"{"1":1.0,"2":2.0,"3":3.0}"#);
    assert_eq!(forecast.at(1), Some(1.0));
    assert_eq!(forecast.at(0), None);
    assert_eq!(forecast.at(4), None);
}

#[rstest]
#[case(ModelKind::Arima)]
#[case(ModelKind::Lstm)]
#[case(ModelKind::Linear)]
fn test_predict_before_training(#[case] kind: ModelKind) {
    let model = kind.build(&ForecastConfig::default()).unwrap();

    assert!(!model.is_trained());
    assert!(model.fingerprint().is_none());
    assert!(matches!(
        model.predict(&wavy_series(30), 1),
        Err(ForecastError::NotTrained(_))
    ));
}

#[rstest]
#[case(ModelKind::Arima, 2)]
#[case(ModelKind::Lstm, 12)]
#[case(ModelKind::Linear, 11)]
fn test_minimum_training_length(#[case] kind: ModelKind, #[case] min_len: usize) {
    let mut config = ForecastConfig::default();
    config.lstm = small_lstm();
    let mut model = kind.build(&config).unwrap();
    assert_eq!(model.min_train_len(), min_len);

    let series = wavy_series(min_len);
    assert!(matches!(
        model.train(&series[..min_len - 1]),
        Err(ForecastError::InvalidInput(_))
    ));
    assert!(!model.is_trained());

    model.train(&series).unwrap();
    assert!(model.is_trained());
}

#[rstest]
#[case(ModelKind::Arima)]
#[case(ModelKind::Lstm)]
#[case(ModelKind::Linear)]
fn test_non_finite_training_data(#[case] kind: ModelKind) {
    let mut config = ForecastConfig::default();
    config.lstm = small_lstm();
    let mut model = kind.build(&config).unwrap();

    let mut series = wavy_series(30);
    series[7] = f64::NAN;
    assert!(matches!(
        model.train(&series),
        Err(ForecastError::InvalidInput(_))
    ));
}

#[test]
fn test_arima_constant_series() {
    let mut model = ArimaModel::new(ArimaConfig::default()).unwrap();
    model.train(&[50.0; 30]).unwrap();

    let forecast = model.predict(&[], 3).unwrap();
    assert_eq!(forecast, vec![50.0, 50.0, 50.0]);
}

#[test]
fn test_arima_continues_linear_trend() {
    let series: Vec<f64> = (0..40).map(|i| 100.0 + 2.0 * i as f64).collect();
    let mut model = ArimaModel::new(ArimaConfig::default()).unwrap();
    model.train(&series).unwrap();

    let forecast = model.predict(&series, 3).unwrap();
    assert_relative_eq!(forecast[0], 180.0, epsilon = 1e-6);
    assert_relative_eq!(forecast[1], 182.0, epsilon = 1e-6);
    assert_relative_eq!(forecast[2], 184.0, epsilon = 1e-6);
}

#[test]
fn test_arima_second_order_differencing() {
    // Second differences of t^2 are constant
    let series: Vec<f64> = (0..21).map(|t| (t * t) as f64).collect();
    let mut model = ArimaModel::new(ArimaConfig { p: 2, d: 2, q: 0 }).unwrap();
    model.train(&series).unwrap();

    let forecast = model.predict(&[], 2).unwrap();
    assert_relative_eq!(forecast[0], 441.0, epsilon = 1e-6);
    assert_relative_eq!(forecast[1], 484.0, epsilon = 1e-6);
}

#[test]
fn test_arima_ignores_context() {
    let series = wavy_series(50);
    let mut model = ArimaModel::new(ArimaConfig::default()).unwrap();
    model.train(&series).unwrap();

    assert_eq!(model.ar_coefficients().len(), 5);
    assert_eq!(model.predict(&[], 4).unwrap(), model.predict(&series, 4).unwrap());
    assert!(model.predict(&series, 0).unwrap().is_empty());
}

#[test]
fn test_arima_short_series_reduces_order() {
    let mut model = ArimaModel::new(ArimaConfig::default()).unwrap();
    model.train(&[10.0, 11.0, 13.0, 12.0]).unwrap();

    // Three differences leave room for two lags
    assert_eq!(model.ar_coefficients().len(), 2);
    assert!(model.predict(&[], 5).unwrap().iter().all(|v| v.is_finite()));
}

#[test]
fn test_arima_moving_average_terms() {
    let mut model = ArimaModel::new(ArimaConfig { p: 2, d: 1, q: 2 }).unwrap();
    model.train(&wavy_series(60)).unwrap();

    assert_eq!(model.ma_coefficients().len(), 2);
    assert!(model.ma_coefficients().iter().all(|c| c.abs() <= 0.99));
    assert!(model.predict(&[], 5).unwrap().iter().all(|v| v.is_finite()));
}

#[test]
fn test_linear_continues_linear_trend() {
    let series: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
    let mut model = LinearModel::new(&ModelConfig::default()).unwrap();
    model.train(&series).unwrap();

    let forecast = model.predict(&series, 3).unwrap();
    assert_relative_eq!(forecast[0], 130.0, epsilon = 1e-3);
    assert_relative_eq!(forecast[1], 131.0, epsilon = 1e-3);
    assert_relative_eq!(forecast[2], 132.0, epsilon = 1e-3);
}

#[test]
fn test_linear_constant_series() {
    let series = vec![50.0; 25];
    let mut model = LinearModel::new(&ModelConfig::default()).unwrap();
    model.train(&series).unwrap();

    let forecast = model.predict(&series, 3).unwrap();
    assert!(forecast.iter().all(|v| v.is_finite()));
    for value in forecast {
        assert_relative_eq!(value, 50.0, epsilon = 1e-9);
    }
}

#[test]
fn test_linear_context_shorter_than_window() {
    let series = wavy_series(30);
    let mut model = LinearModel::new(&ModelConfig::default()).unwrap();
    model.train(&series).unwrap();

    assert!(matches!(
        model.predict(&series[..9], 1),
        Err(ForecastError::InvalidInput(_))
    ));
    assert_eq!(model.predict(&series[..10], 1).unwrap().len(), 1);
}

#[rstest]
#[case(ModelKind::Lstm)]
#[case(ModelKind::Linear)]
fn test_rollout_prefix_stability(#[case] kind: ModelKind) {
    let mut config = ForecastConfig::default();
    config.lstm = small_lstm();
    let mut model = kind.build(&config).unwrap();
    let series = wavy_series(40);
    model.train(&series).unwrap();

    let long = model.predict(&series, 6).unwrap();
    let short = model.predict(&series, 3).unwrap();

    assert_eq!(long.len(), 6);
    assert_eq!(&long[..3], short.as_slice());
    assert!(model.predict(&series, 0).unwrap().is_empty());
}

#[test]
fn test_failed_train_keeps_previous_fit() {
    let series = wavy_series(30);
    let mut model = LinearModel::new(&ModelConfig::default()).unwrap();
    model.train(&series).unwrap();
    let before = model.predict(&series, 3).unwrap();
    let fingerprint = model.fingerprint().cloned();

    assert!(model.train(&series[..5]).is_err());
    let mut broken = series.clone();
    broken[3] = f64::INFINITY;
    assert!(model.train(&broken).is_err());

    assert_eq!(model.predict(&series, 3).unwrap(), before);
    assert_eq!(model.fingerprint().cloned(), fingerprint);
}

#[test]
fn test_lstm_training_is_deterministic() {
    let series = wavy_series(40);
    let mut first = LstmModel::new(&ModelConfig::default(), &small_lstm()).unwrap();
    let mut second = LstmModel::new(&ModelConfig::default(), &small_lstm()).unwrap();
    first.train(&series).unwrap();
    second.train(&series).unwrap();

    let a = first.predict(&series, 4).unwrap();
    let b = second.predict(&series, 4).unwrap();
    assert_eq!(a, b);
    assert!(a.iter().all(|v| v.is_finite()));

    let report = first.training_report().unwrap();
    assert_eq!(report.epochs, 3);
    assert!(report.train_loss.is_finite());
    assert!(report.validation_loss.is_some());
}

#[test]
fn test_lstm_constant_series_is_finite() {
    let series = vec![50.0; 20];
    let mut model = LstmModel::new(&ModelConfig::default(), &small_lstm()).unwrap();
    model.train(&series).unwrap();

    assert!(model.predict(&series, 3).unwrap().iter().all(|v| v.is_finite()));
}

#[rstest]
#[case(ModelKind::Arima)]
#[case(ModelKind::Lstm)]
#[case(ModelKind::Linear)]
fn test_save_and_load_predict_identically(#[case] kind: ModelKind) {
    let dir = tempdir().unwrap();
    let path = dir.path().join(format!("{}_TEST.json", kind.file_stem()));
    let mut config = ForecastConfig::default();
    config.lstm = small_lstm();

    let series = wavy_series(45);
    let mut trained = kind.build(&config).unwrap();
    trained.train(&series).unwrap();
    trained.save(&path).unwrap();

    let mut restored = kind.build(&config).unwrap();
    restored.load(&path).unwrap();

    assert!(restored.is_trained());
    assert_eq!(restored.fingerprint(), trained.fingerprint());

    let expected = trained.predict(&series, 5).unwrap();
    let actual = restored.predict(&series, 5).unwrap();
    for (e, a) in expected.iter().zip(actual.iter()) {
        assert_relative_eq!(e, a, epsilon = 1e-12);
    }
}

#[test]
fn test_save_untrained_model() {
    let dir = tempdir().unwrap();
    let model = LinearModel::new(&ModelConfig::default()).unwrap();

    assert!(matches!(
        model.save(&dir.path().join("linear_X.json")),
        Err(ForecastError::NotTrained(_))
    ));
}
