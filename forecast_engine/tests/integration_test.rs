use approx::assert_relative_eq;
use forecast_engine::config::LstmConfig;
use forecast_engine::{DataLoader, ForecastConfig, ModelCache, ModelKind, ModelSource};
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

// Helper function to create a simple test dataset
fn create_sample_data(days: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Date,Open,High,Low,Close,Volume").unwrap();

    let start = chrono::NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    for i in 0..days {
        let date = start + chrono::Duration::days(i as i64);
        let close = 150.0 + 0.3 * i as f64 + 2.0 * (i as f64 / 3.0).sin();
        let open = close - 0.5;
        writeln!(
            file,
            "{},{:.4},{:.4},{:.4},{:.4},{}",
            date,
            open,
            close + 1.0,
            open - 1.0,
            close,
            1_000 + i
        )
        .unwrap();
    }

    file
}

fn quick_config() -> ForecastConfig {
    let mut config = ForecastConfig::from_toml_str(
        r#"
        [lstm]
        hidden_units = 6
        dense_units = 3
        epochs = 2
        "#,
    )
    .unwrap();
    config.lstm = LstmConfig {
        batch_size: 16,
        ..config.lstm
    };
    config
}

#[test]
fn test_full_forecast_workflow() {
    // 1. Load data
    let data_file = create_sample_data(60);
    let history = DataLoader::from_csv(data_file.path()).unwrap();
    assert_eq!(history.len(), 60);

    // 2. Predict with every strategy
    let models = tempdir().unwrap();
    let mut config = quick_config();
    config.cache.model_dir = models.path().to_path_buf();
    let cache = ModelCache::new(config);

    let as_of = history.last_date().unwrap();
    let report = cache.predictions("AAPL", history.close(), as_of);
    assert_eq!(report.results().count(), 3);
    for result in report.results() {
        assert_eq!(result.date(), as_of.succ_opt().unwrap());
        // Next close stays in the neighbourhood of the recent prices
        assert!((result.predicted_close() - 168.0).abs() < 50.0);
    }

    // 3. Every model was saved; the LSTM with its scaler
    for kind in ModelKind::ALL {
        assert!(cache.model_path("AAPL", kind).unwrap().exists());
    }
    assert!(models.path().join("lstm_AAPL_scaler.json").exists());

    // 4. Week ahead reuses the saved ARIMA model
    let cached = cache.train_or_load("AAPL", ModelKind::Arima, history.close()).unwrap();
    assert_eq!(cached.source, ModelSource::Loaded);
    let week = cache.future("AAPL", ModelKind::Arima, history.close(), 7).unwrap();
    assert_eq!(week.values().len(), 7);
    let next_day = report.results().next().unwrap().predicted_close();
    assert_relative_eq!(week.at(1).unwrap(), next_day, epsilon = 1e-12);
}
