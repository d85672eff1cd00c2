//! Configuration module for Cryptocast.
//!
//! Structured configuration loading from environment variables, organized by
//! concern: data source, forecasting and model storage.

mod data_source_config;
mod forecast_config;
mod store_config;

pub use data_source_config::{DataSource, DataSourceEnvConfig};
pub use forecast_config::{DEFAULT_SYMBOLS, ForecastEnvConfig, parse_symbols};
pub use store_config::StoreEnvConfig;

use crate::application::forecasting::prediction_engine::EngineSettings;
use crate::application::forecasting::trainer::TrainingSettings;
use crate::application::ml::predictor::ModelSettings;
use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data_source: DataSourceEnvConfig,
    pub forecast: ForecastEnvConfig,
    pub store: StoreEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            data_source: DataSourceEnvConfig::from_env()
                .context("Failed to load data source config")?,
            forecast: ForecastEnvConfig::from_env().context("Failed to load forecast config")?,
            store: StoreEnvConfig::from_env(),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.data_source.fetch_timeout_secs)
    }

    pub fn model_settings(&self) -> ModelSettings {
        let f = &self.forecast;
        ModelSettings {
            kind: f.model_kind,
            epochs: f.epochs,
            batch_size: f.batch_size,
            hidden_units: f.hidden_units,
            layers: f.layers,
            dropout: f.dropout,
            learning_rate: f.learning_rate,
            seed: f.seed,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            symbols: self.forecast.symbols.clone(),
            training: TrainingSettings {
                lookback: self.forecast.lookback_days,
                model: self.model_settings(),
                holdout_ratio: self.forecast.holdout_ratio,
            },
            training_history_days: self.forecast.training_history_days,
            fetch_timeout: self.fetch_timeout(),
            max_parallel_training: self.forecast.training_workers,
        }
    }
}

/// Parse `key` from the environment, falling back to `default` when unset.
pub(crate) fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .context(format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}
