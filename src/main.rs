//! Cryptocast CLI
//!
//! Resolves the tracked symbols' models (load or train) and prints
//! predictions, price history or the model catalogue as JSON on stdout.
//! Logs go to stderr.
//!
//! # Usage
//! ```sh
//! cargo run -- predict BTC ETH
//! cargo run -- history SOL --days 30
//! DATA_SOURCE=yahoo cargo run -- status
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use cryptocast::application::forecasting::PredictionEngine;
use cryptocast::config::Config;
use cryptocast::infrastructure::factory::ServiceFactory;
use serde_json::json;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Next-day crypto price forecasts", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict tomorrow's close for one or more tracked symbols
    Predict {
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Daily closes for charting
    History {
        symbol: String,
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Resolve every tracked symbol and print the model catalogue
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stderr_layer)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    info!(
        "Cryptocast {}: {} model, lookback {}, symbols {:?}",
        env!("CARGO_PKG_VERSION"),
        config.forecast.model_kind,
        config.forecast.lookback_days,
        config.forecast.symbols
    );

    let engine = PredictionEngine::new(
        config.engine_settings(),
        ServiceFactory::create_provider(&config),
        ServiceFactory::create_store(&config),
    );

    let output = match args.command {
        Command::Predict { symbols } => {
            let mut results = Vec::with_capacity(symbols.len());
            for symbol in &symbols {
                if let Err(e) = engine.resolve_symbol(symbol).await {
                    warn!("{}", e);
                }
                results.push(match engine.predict_price(symbol).await {
                    Ok(prediction) => serde_json::to_value(prediction)?,
                    Err(e) => json!({ "symbol": e.symbol, "error": e.reason }),
                });
            }
            json!(results)
        }
        Command::History { symbol, days } => match engine.get_historical_data(&symbol, days).await {
            Ok(points) => json!({ "symbol": symbol.to_uppercase(), "days": days, "data": points }),
            Err(e) => json!({ "symbol": e.symbol, "error": e.reason }),
        },
        Command::Status => {
            engine.resolve_all().await;
            serde_json::to_value(engine.catalogue().await)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
