use approx::assert_relative_eq;
use chrono::NaiveDate;
use forecast_engine::data::{DataLoader, PriceHistory};
use forecast_engine::ForecastError;
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_csv(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

#[test]
fn test_data_loader_from_csv() {
    let file = write_csv(&[
        "Date,Open,High,Low,Close,Volume",
        "2023-01-03,100.0,105.0,98.0,103.0,1000",
        "2023-01-04,103.0,107.0,101.0,106.0,1200",
        "2023-01-05,106.0,110.0,104.0,104.0,1500",
    ]);

    let history = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(history.len(), 3);
    assert!(!history.is_empty());
    assert_eq!(history.close(), &[103.0, 106.0, 104.0]);
    assert_eq!(history.open(), Some(&[100.0, 103.0, 106.0][..]));
    assert_eq!(history.last_date(), NaiveDate::from_ymd_opt(2023, 1, 5));
}

#[test]
fn test_derived_change_fields() {
    let file = write_csv(&[
        "date,open,close",
        "2023-01-03,100.0,103.0",
        "2023-01-04,103.0,106.0",
        "2023-01-05,106.0,104.0",
    ]);
    let history = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(history.change().unwrap(), vec![3.0, 3.0, -2.0]);
    let percent = history.change_percent().unwrap();
    assert_relative_eq!(percent[0], 3.0, epsilon = 1e-12);
    assert_relative_eq!(percent[2], -2.0 / 106.0 * 100.0, epsilon = 1e-12);
}

#[test]
fn test_price_column_fallback() {
    let file = write_csv(&["date,price", "2023-01-01,100", "2023-01-02,102"]);
    let history = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(history.close(), &[100.0, 102.0]);
    assert!(history.open().is_none());
    assert!(matches!(history.change(), Err(ForecastError::DataError(_))));
}

#[test]
fn test_csv_without_dates() {
    let file = write_csv(&["Close", "10.5", "11.0", "11.5"]);
    let history = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(history.len(), 3);
    assert!(history.dates().is_empty());
    assert_eq!(history.last_date(), None);
}

#[test]
fn test_data_loader_error_handling() {
    // Test with non-existent file
    let result = DataLoader::from_csv("nonexistent_file.csv");
    assert!(matches!(result, Err(ForecastError::IoError(_))));

    // No close or price column
    let file = write_csv(&["date,volume", "2023-01-01,100"]);
    assert!(matches!(
        DataLoader::from_csv(file.path()),
        Err(ForecastError::DataError(_))
    ));

    // Dates out of order
    let file = write_csv(&["date,close", "2023-01-02,1.0", "2023-01-01,2.0"]);
    assert!(matches!(
        DataLoader::from_csv(file.path()),
        Err(ForecastError::DataError(_))
    ));
}

#[test]
fn test_price_history_construction() {
    let dates: Vec<NaiveDate> = ["2023-01-01", "2023-01-02"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();

    let history = PriceHistory::new(dates.clone(), vec![1.0, 2.0]).unwrap();
    assert_eq!(history.dates(), dates.as_slice());

    assert!(PriceHistory::new(dates.clone(), vec![1.0]).is_err());
    assert!(PriceHistory::new(Vec::new(), Vec::new()).is_err());
    assert!(history.clone().with_open(vec![1.0]).is_err());

    let with_open = history.with_open(vec![0.0, 1.0]).unwrap();
    assert!(matches!(
        with_open.change_percent(),
        Err(ForecastError::DataError(_))
    ));
}
