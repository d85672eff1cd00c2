use crate::domain::market::price_series::PriceSeries;
use crate::domain::ports::PriceHistoryProvider;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory price history.
///
/// Explicit series registered with [`with_series`](Self::with_series) win.
/// In synthetic mode any other symbol gets a seeded random walk ending today,
/// generated backwards from a fixed anchor price so every request window sees
/// the same recent prices.
pub struct MockPriceHistoryProvider {
    series: RwLock<HashMap<String, PriceSeries>>,
    synthetic_seed: Option<u64>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MockPriceHistoryProvider {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            synthetic_seed: None,
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Demo mode: random walks for every symbol.
    pub fn synthetic(seed: u64) -> Self {
        Self {
            synthetic_seed: Some(seed),
            ..Self::new()
        }
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.series
            .get_mut()
            .insert(series.symbol().to_uppercase(), series);
        self
    }

    /// Every fetch sleeps first; used to exercise fetch timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn set_series(&self, series: PriceSeries) {
        self.series
            .write()
            .await
            .insert(series.symbol().to_uppercase(), series);
    }

    pub async fn remove_series(&self, symbol: &str) {
        self.series.write().await.remove(&symbol.to_uppercase());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn random_walk(seed: u64, symbol: &str, days: u32) -> Option<PriceSeries> {
        let symbol_seed = symbol
            .bytes()
            .fold(seed, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        let mut rng = StdRng::seed_from_u64(symbol_seed);

        let mut price = base_price(symbol);
        let mut closes = Vec::with_capacity(days as usize);
        for _ in 0..days {
            closes.push(price);
            let daily_return: f64 = rng.random_range(-0.035..0.035);
            price = (price / (1.0 + daily_return + 0.0005)).max(0.01);
        }
        closes.reverse();

        PriceSeries::daily_ending(symbol, Utc::now().date_naive(), &closes).ok()
    }
}

impl Default for MockPriceHistoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn base_price(symbol: &str) -> f64 {
    match symbol {
        "BTC" => 96_000.0,
        "ETH" => 3_400.0,
        "SOL" => 180.0,
        "AVAX" => 40.0,
        "LINK" => 22.0,
        "LTC" => 100.0,
        "UNI" => 12.0,
        "DOT" => 7.0,
        "ADA" => 0.95,
        "MATIC" => 0.5,
        _ => 150.0,
    }
}

#[async_trait]
impl PriceHistoryProvider for MockPriceHistoryProvider {
    async fn fetch_daily_closes(&self, symbol: &str, days: u32) -> Result<Option<PriceSeries>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let symbol = symbol.to_uppercase();
        if let Some(series) = self.series.read().await.get(&symbol) {
            debug!("MockPriceHistoryProvider: Serving stored series for {}", symbol);
            let window = series.trailing_days(days);
            return Ok((!window.is_empty()).then_some(window));
        }

        Ok(self
            .synthetic_seed
            .filter(|_| days > 0)
            .and_then(|seed| Self::random_walk(seed, &symbol, days)))
    }

    fn name(&self) -> &str {
        "Mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_unknown_symbol_without_synthetic_mode_is_absent() {
        let provider = MockPriceHistoryProvider::new();
        assert!(provider.fetch_daily_closes("BTC", 30).await.unwrap().is_none());
        assert_eq!(provider.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_registered_series_is_trimmed_to_window() {
        let series = PriceSeries::daily_ending(
            "eth",
            NaiveDate::from_ymd_opt(2025, 2, 10).unwrap(),
            &[1.0, 2.0, 3.0, 4.0, 5.0],
        )
        .unwrap();
        let provider = MockPriceHistoryProvider::new().with_series(series);

        let window = provider.fetch_daily_closes("ETH", 3).await.unwrap().unwrap();
        assert_eq!(window.closes(), vec![3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn test_synthetic_walk_is_stable_across_windows() {
        let provider = MockPriceHistoryProvider::synthetic(42);

        let long = provider.fetch_daily_closes("BTC", 400).await.unwrap().unwrap();
        let short = provider.fetch_daily_closes("BTC", 30).await.unwrap().unwrap();

        assert_eq!(long.len(), 400);
        assert_eq!(short.len(), 30);
        assert_eq!(long.latest_close(), Some(96_000.0));
        assert_eq!(short.closes()[..], long.closes()[370..]);
        assert!(long.closes().iter().all(|c| *c > 0.0));
    }
}
