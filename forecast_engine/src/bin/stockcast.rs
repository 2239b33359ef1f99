use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use forecast_engine::{DataLoader, ForecastConfig, ForecastError, ModelCache, ModelKind, PriceHistory, TrainingPool};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Stock price forecasts from ARIMA, LSTM and linear models", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for saved models (overrides the config file and STOCKCAST_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Next-day close from every model, with holdout MAPE
    Predict {
        #[arg(long)]
        symbol: String,
        /// CSV with a header row and a Close column
        #[arg(long)]
        csv: PathBuf,
        /// Train the models on the worker pool
        #[arg(long)]
        parallel: bool,
    },
    /// Multi-day forecast from a single model
    Future {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = 7)]
        days: usize,
        #[arg(long, default_value = "ARIMA")]
        model: ModelKind,
    },
    /// Holdout accuracy of a model, without touching saved models
    Evaluate {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "ARIMA")]
        model: ModelKind,
    },
}

fn load_config(path: Option<&Path>, model_dir: Option<PathBuf>) -> Result<ForecastConfig> {
    let config = match path {
        Some(path) => ForecastConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ForecastConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(dir) = model_dir {
        config.cache.model_dir = dir;
    }
    Ok(config)
}

fn load_history(csv: &Path) -> Result<PriceHistory> {
    DataLoader::from_csv(csv).with_context(|| format!("reading prices from {}", csv.display()))
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays valid JSON
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(stderr_layer)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.model_dir)?;
    info!(model_dir = %config.cache.model_dir.display(), "stockcast {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Predict {
            symbol,
            csv,
            parallel,
        } => {
            let history = load_history(&csv)?;
            let as_of = history
                .last_date()
                .unwrap_or_else(|| Local::now().date_naive());

            // The pool outlives the report: dropping it waits for its jobs
            let pool = if parallel {
                Some(TrainingPool::new(config.runtime.workers)?)
            } else {
                None
            };
            let cache = Arc::new(ModelCache::new(config));
            let report = match &pool {
                Some(pool) => cache.predictions_on(pool, &symbol, history.close(), as_of),
                None => cache.predictions(&symbol, history.close(), as_of),
            };
            println!("{}", report.to_json()?);

            let pending = report
                .failures()
                .filter(|(_, e)| matches!(e, ForecastError::StillTraining(_)))
                .count();
            if pending > 0 {
                info!(pending, "waiting for background training to save its models");
            }
            drop(pool);
        }
        Command::Future {
            symbol,
            csv,
            days,
            model,
        } => {
            let history = load_history(&csv)?;
            let forecast = ModelCache::new(config).future(&symbol, model, history.close(), days)?;
            let output = json!({
                "symbol": symbol,
                "modelType": forecast.model_type(),
                "forecast": forecast,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Evaluate { csv, model } => {
            let history = load_history(&csv)?;
            let cache = ModelCache::new(config);
            let evaluation = cache.evaluate(model, history.close())?;
            let metrics = forecast_math::error_metrics(&evaluation.actual, &evaluation.predictions)?;

            eprintln!("{} holdout of {} days", model, evaluation.actual.len());
            eprint!("{}", metrics);
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
        }
    }

    Ok(())
}
