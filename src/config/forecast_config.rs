//! Forecasting configuration parsing from environment variables.
//!
//! Tracked symbols, the regression variant and its training hyper-parameters.

use super::parse_env;
use crate::domain::forecasting::ModelKind;
use anyhow::{Context, Result, ensure};
use std::env;
use std::str::FromStr;

pub const DEFAULT_SYMBOLS: &str = "BTC,ETH,ADA,SOL,MATIC,DOT,AVAX,LINK,UNI,LTC";

#[derive(Debug, Clone)]
pub struct ForecastEnvConfig {
    pub symbols: Vec<String>,
    pub model_kind: ModelKind,
    pub lookback_days: usize,
    pub training_history_days: u32,
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_units: usize,
    pub layers: usize,
    pub dropout: f64,
    pub learning_rate: f64,
    pub seed: u64,
    pub holdout_ratio: f64,
    pub training_workers: usize,
}

impl Default for ForecastEnvConfig {
    fn default() -> Self {
        let model_kind = ModelKind::Recurrent;
        Self {
            symbols: parse_symbols(DEFAULT_SYMBOLS),
            model_kind,
            lookback_days: model_kind.default_lookback(),
            training_history_days: 730,
            epochs: 25,
            batch_size: 32,
            hidden_units: 32,
            layers: 3,
            dropout: 0.2,
            learning_rate: 0.001,
            seed: 42,
            holdout_ratio: 0.2,
            training_workers: default_training_workers(),
        }
    }
}

impl ForecastEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let symbols = parse_symbols(
            &env::var("SYMBOLS").unwrap_or_else(|_| DEFAULT_SYMBOLS.to_string()),
        );
        ensure!(!symbols.is_empty(), "SYMBOLS must name at least one symbol");

        let model_kind = match env::var("MODEL_KIND") {
            Ok(value) => ModelKind::from_str(&value)?,
            Err(_) => defaults.model_kind,
        };

        let config = Self {
            symbols,
            model_kind,
            // The lookback default follows the chosen variant.
            lookback_days: parse_env("LOOKBACK_DAYS", model_kind.default_lookback())?,
            training_history_days: parse_env("TRAINING_HISTORY_DAYS", defaults.training_history_days)?,
            epochs: parse_env("TRAINING_EPOCHS", defaults.epochs)?,
            batch_size: parse_env("BATCH_SIZE", defaults.batch_size)?,
            hidden_units: parse_env("HIDDEN_UNITS", defaults.hidden_units)?,
            layers: parse_env("RECURRENT_LAYERS", defaults.layers)?,
            dropout: parse_env("DROPOUT", defaults.dropout)?,
            learning_rate: parse_env("LEARNING_RATE", defaults.learning_rate)?,
            seed: parse_env("TRAINING_SEED", defaults.seed)?,
            holdout_ratio: parse_env("HOLDOUT_RATIO", defaults.holdout_ratio)?,
            training_workers: parse_env("TRAINING_WORKERS", defaults.training_workers)?,
        };
        config.validate().context("Invalid forecast configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.lookback_days >= 1, "LOOKBACK_DAYS must be at least 1");
        ensure!(
            self.training_history_days as usize > self.lookback_days,
            "TRAINING_HISTORY_DAYS ({}) must exceed LOOKBACK_DAYS ({})",
            self.training_history_days,
            self.lookback_days
        );
        ensure!(self.epochs >= 1, "TRAINING_EPOCHS must be at least 1");
        ensure!(self.batch_size >= 1, "BATCH_SIZE must be at least 1");
        ensure!(self.hidden_units >= 1, "HIDDEN_UNITS must be at least 1");
        ensure!(self.layers >= 1, "RECURRENT_LAYERS must be at least 1");
        ensure!(
            (0.0..1.0).contains(&self.dropout),
            "DROPOUT must be in [0, 1), got {}",
            self.dropout
        );
        ensure!(
            self.learning_rate > 0.0 && self.learning_rate.is_finite(),
            "LEARNING_RATE must be positive, got {}",
            self.learning_rate
        );
        ensure!(
            (0.0..=0.5).contains(&self.holdout_ratio),
            "HOLDOUT_RATIO must be in [0, 0.5], got {}",
            self.holdout_ratio
        );
        ensure!(self.training_workers >= 1, "TRAINING_WORKERS must be at least 1");
        Ok(())
    }
}

/// Comma list to trimmed, upper-cased, de-duplicated symbols, order kept.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for symbol in raw.split(',').map(|s| s.trim().to_uppercase()) {
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

fn default_training_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
