//! Train (or load) the model pair of every tracked symbol, persist it, and
//! print sample predictions.
//!
//! # Usage
//! ```sh
//! cargo run --bin train_models
//! cargo run --bin train_models -- --force --sample BTC --sample SOL
//! ```

use anyhow::Result;
use clap::Parser;
use cryptocast::application::forecasting::{PredictionEngine, ResolveOutcome};
use cryptocast::config::Config;
use cryptocast::infrastructure::factory::ServiceFactory;
use tracing::{Level, error, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Retrain symbols even when a stored model loaded successfully
    #[arg(long)]
    force: bool,

    /// Symbols to print a sample prediction for
    #[arg(long = "sample", default_values = ["BTC", "ETH"])]
    samples: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    info!(
        "Training {} models for {} symbols ({} days of history, {} epochs)",
        config.forecast.model_kind,
        config.forecast.symbols.len(),
        config.forecast.training_history_days,
        config.forecast.epochs
    );

    let engine = PredictionEngine::new(
        config.engine_settings(),
        ServiceFactory::create_provider(&config),
        ServiceFactory::create_store(&config),
    );

    let results = engine.resolve_all().await;

    if args.force {
        for (symbol, outcome) in &results {
            if matches!(outcome, Ok(ResolveOutcome::Loaded))
                && let Err(e) = engine.retrain(symbol).await
            {
                warn!("{}", e);
            }
        }
    }

    for status in engine.catalogue().await {
        match (&status.failure, &status.report) {
            (Some(failure), _) => error!(
                "{}: {} ({})",
                status.symbol, failure.reason, failure.detail
            ),
            (None, Some(report)) => info!(
                "{}: trained on {} samples, MAE {}, RMSE {}",
                status.symbol,
                report.training_samples,
                report.mae.map_or("n/a".to_string(), |v| format!("{:.2}", v)),
                report.rmse.map_or("n/a".to_string(), |v| format!("{:.2}", v)),
            ),
            (None, None) => info!("{}: {:?} (stored model)", status.symbol, status.state),
        }
    }

    for symbol in &args.samples {
        match engine.predict_price(symbol).await {
            Ok(p) => info!(
                "{} prediction for {}: ${:.2} -> ${:.2} ({:+.2}%)",
                p.symbol, p.prediction_date, p.current_price, p.predicted_price, p.change_percent
            ),
            Err(e) => warn!("{}", e),
        }
    }

    Ok(())
}
