//! Offline price history from `date,close` CSV files, one file per symbol.

use crate::domain::market::price_series::{PricePoint, PriceSeries};
use crate::domain::ports::PriceHistoryProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    close: f64,
}

/// Reads `<dir>/<symbol lowercase>.csv`. The trailing window is anchored at
/// the newest row in the file, not at today, so archived data stays usable.
pub struct CsvPriceHistoryProvider {
    dir: PathBuf,
}

impl CsvPriceHistoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol.to_lowercase()))
    }
}

#[async_trait]
impl PriceHistoryProvider for CsvPriceHistoryProvider {
    async fn fetch_daily_closes(&self, symbol: &str, days: u32) -> Result<Option<PriceSeries>> {
        let path = self.path_for(symbol);
        if days == 0 || !path.exists() {
            return Ok(None);
        }

        let key = symbol.to_uppercase();
        let series = tokio::task::spawn_blocking(move || read_series(&key, &path))
            .await
            .context("CSV reader task failed")??;

        debug!(
            "CsvPriceHistoryProvider: {} rows for {}",
            series.len(),
            symbol
        );
        let window = series.trailing_days(days);
        Ok((!window.is_empty()).then_some(window))
    }

    fn name(&self) -> &str {
        "CSV files"
    }
}

fn read_series(symbol: &str, path: &Path) -> Result<PriceSeries> {
    let mut reader =
        csv::Reader::from_path(path).context(format!("Failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<CsvRow>().enumerate() {
        let row = record.context(format!("Invalid row {} in {}", line + 2, path.display()))?;
        rows.push(row);
    }
    rows.sort_by_key(|row| row.date);
    rows.dedup_by_key(|row| row.date);

    let points = rows
        .into_iter()
        .map(|row| PricePoint::new(row.date.and_time(NaiveTime::default()).and_utc(), row.close))
        .collect();
    PriceSeries::new(symbol, points).context(format!("Invalid price data in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_dir() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("cryptocast_csv_{}_{}", std::process::id(), n));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_reads_and_anchors_window_at_newest_row() {
        let dir = temp_dir();
        std::fs::write(
            dir.join("btc.csv"),
            "date,close\n2024-03-03,103.0\n2024-03-01,101.0\n2024-03-02,102.0\n2024-03-04,104.0\n",
        )
        .unwrap();
        let provider = CsvPriceHistoryProvider::new(&dir);

        let series = provider.fetch_daily_closes("BTC", 2).await.unwrap().unwrap();
        assert_eq!(series.symbol(), "BTC");
        assert_eq!(series.closes(), vec![103.0, 104.0]);

        let all = provider.fetch_daily_closes("btc", 365).await.unwrap().unwrap();
        assert_eq!(all.closes(), vec![101.0, 102.0, 103.0, 104.0]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_file_is_no_data() {
        let dir = temp_dir();
        let provider = CsvPriceHistoryProvider::new(&dir);
        assert!(provider.fetch_daily_closes("ETH", 30).await.unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_bad_rows_are_errors() {
        let dir = temp_dir();
        std::fs::write(dir.join("ada.csv"), "date,close\n2024-03-01,abc\n").unwrap();
        std::fs::write(dir.join("sol.csv"), "date,close\n2024-03-01,-5.0\n").unwrap();
        let provider = CsvPriceHistoryProvider::new(&dir);

        assert!(provider.fetch_daily_closes("ADA", 30).await.is_err());
        assert!(provider.fetch_daily_closes("SOL", 30).await.is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
