//! Market data source configuration parsing from environment variables.

use super::parse_env;
use anyhow::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Where daily closes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Mock,
    Yahoo,
    Csv,
}

impl FromStr for DataSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(DataSource::Mock),
            "yahoo" => Ok(DataSource::Yahoo),
            "csv" => Ok(DataSource::Csv),
            _ => anyhow::bail!(
                "Invalid DATA_SOURCE: {}. Must be 'mock', 'yahoo', or 'csv'",
                s
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataSourceEnvConfig {
    pub source: DataSource,
    pub yahoo_chart_url: String,
    /// Appended to symbols to form tickers (`BTC` -> `BTC-USD`)
    pub quote_currency: String,
    pub csv_dir: PathBuf,
    pub fetch_timeout_secs: u64,
}

impl Default for DataSourceEnvConfig {
    fn default() -> Self {
        Self {
            source: DataSource::Mock,
            yahoo_chart_url: "https://query1.finance.yahoo.com/v8/finance/chart".to_string(),
            quote_currency: "USD".to_string(),
            csv_dir: PathBuf::from("data/prices"),
            fetch_timeout_secs: 30,
        }
    }
}

impl DataSourceEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let source = match env::var("DATA_SOURCE") {
            Ok(value) => DataSource::from_str(&value)?,
            Err(_) => defaults.source,
        };
        let fetch_timeout_secs = parse_env("FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs)?;
        anyhow::ensure!(fetch_timeout_secs > 0, "FETCH_TIMEOUT_SECS must be at least 1");

        Ok(Self {
            source,
            yahoo_chart_url: env::var("YAHOO_CHART_URL").unwrap_or(defaults.yahoo_chart_url),
            quote_currency: env::var("QUOTE_CURRENCY")
                .map(|q| q.trim().to_uppercase())
                .unwrap_or(defaults.quote_currency),
            csv_dir: env::var("CSV_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.csv_dir),
            fetch_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_parsing() {
        assert_eq!(DataSource::from_str("Yahoo").unwrap(), DataSource::Yahoo);
        assert_eq!(DataSource::from_str(" csv ").unwrap(), DataSource::Csv);
        assert!(DataSource::from_str("binance").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = DataSourceEnvConfig::default();
        assert_eq!(config.source, DataSource::Mock);
        assert_eq!(config.quote_currency, "USD");
        assert_eq!(config.fetch_timeout_secs, 30);
    }
}
