use crate::domain::market::price_series::PriceSeries;
use anyhow::Result;
use async_trait::async_trait;

/// Source of daily closing prices.
///
/// `Ok(None)` and an empty series both mean "no data"; callers treat them the same.
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    /// Daily closes covering roughly the trailing `days` calendar days, oldest first.
    async fn fetch_daily_closes(&self, symbol: &str, days: u32) -> Result<Option<PriceSeries>>;

    fn name(&self) -> &str;
}
