//! Loading daily price histories
//!
//! Forecasting only needs the chronological close prices. Dates and opening
//! prices are carried along when the source has them: dates to label the
//! forecast day, opens for the derived daily change.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Daily prices of one instrument, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    dates: Vec<NaiveDate>,
    open: Option<Vec<f64>>,
    close: Vec<f64>,
}

/// Data loader for price histories
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load a price history from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<PriceHistory> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(&df)
    }

    /// Build a price history from an existing DataFrame
    pub fn from_dataframe(df: &DataFrame) -> Result<PriceHistory> {
        let close_column = Self::detect_close_column(df)?;
        let close = Self::float_column(df, &close_column)?;

        let open = match Self::find_column(df, |name| name == "open") {
            Some(name) => Some(Self::float_column(df, &name)?),
            None => None,
        };

        let dates = match Self::find_column(df, |name| name.contains("date") || name.contains("time")) {
            Some(name) => Self::date_column(df, &name)?,
            None => Vec::new(),
        };

        let history = PriceHistory { dates, open, close };
        history.check_lengths()?;
        Ok(history)
    }

    fn find_column<F>(df: &DataFrame, predicate: F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        df.get_column_names()
            .iter()
            .find(|name| predicate(&name.to_lowercase()))
            .map(|name| name.to_string())
    }

    /// `Close`, then any column mentioning close, then any mentioning price
    fn detect_close_column(df: &DataFrame) -> Result<String> {
        Self::find_column(df, |name| name == "close")
            .or_else(|| Self::find_column(df, |name| name.contains("close")))
            .or_else(|| Self::find_column(df, |name| name.contains("price")))
            .ok_or_else(|| ForecastError::DataError("No close or price column found in data".to_string()))
    }

    fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
        let series = df.column(name)?.cast(&DataType::Float64)?;
        series
            .f64()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                value.ok_or_else(|| {
                    ForecastError::DataError(format!("Missing value in column '{}' at row {}", name, row))
                })
            })
            .collect()
    }

    fn date_column(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>> {
        let series = df.column(name)?.cast(&DataType::Utf8)?;
        series
            .utf8()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                let raw = value.ok_or_else(|| {
                    ForecastError::DataError(format!("Missing date in column '{}' at row {}", name, row))
                })?;
                // Timestamps keep only their calendar day
                let day = raw.get(..10).unwrap_or(raw);
                NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
                    ForecastError::DataError(format!("Invalid date '{}' at row {}: {}", raw, row, e))
                })
            })
            .collect()
    }
}

impl PriceHistory {
    /// Close prices with optional dates
    pub fn new(dates: Vec<NaiveDate>, close: Vec<f64>) -> Result<Self> {
        let history = Self {
            dates,
            open: None,
            close,
        };
        history.check_lengths()?;
        Ok(history)
    }

    /// Attach opening prices
    pub fn with_open(mut self, open: Vec<f64>) -> Result<Self> {
        self.open = Some(open);
        self.check_lengths()?;
        Ok(self)
    }

    fn check_lengths(&self) -> Result<()> {
        if self.close.is_empty() {
            return Err(ForecastError::DataError("Price history is empty".to_string()));
        }
        if !self.dates.is_empty() && self.dates.len() != self.close.len() {
            return Err(ForecastError::DataError(format!(
                "{} dates for {} close prices",
                self.dates.len(),
                self.close.len()
            )));
        }
        if let Some(open) = &self.open {
            if open.len() != self.close.len() {
                return Err(ForecastError::DataError(format!(
                    "{} open prices for {} close prices",
                    open.len(),
                    self.close.len()
                )));
            }
        }
        if self.dates.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ForecastError::DataError(
                "Dates must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }

    pub fn close(&self) -> &[f64] {
        &self.close
    }

    pub fn open(&self) -> Option<&[f64]> {
        self.open.as_deref()
    }

    /// Dates of each row, empty when the source had no date column
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Close minus open for each day
    pub fn change(&self) -> Result<Vec<f64>> {
        let open = self.require_open()?;
        Ok(self.close.iter().zip(open).map(|(c, o)| c - o).collect())
    }

    /// Daily change as a percentage of the open
    pub fn change_percent(&self) -> Result<Vec<f64>> {
        let open = self.require_open()?;
        self.close
            .iter()
            .zip(open)
            .enumerate()
            .map(|(row, (c, o))| {
                if *o == 0.0 {
                    Err(ForecastError::DataError(format!("Open price is zero at row {}", row)))
                } else {
                    Ok((c - o) / o * 100.0)
                }
            })
            .collect()
    }

    fn require_open(&self) -> Result<&[f64]> {
        self.open
            .as_deref()
            .ok_or_else(|| ForecastError::DataError("No open prices in data".to_string()))
    }
}
