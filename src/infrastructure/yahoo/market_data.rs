//! Yahoo Finance chart API
//!
//! Daily closes come from `GET {base}/{SYMBOL}-{QUOTE}?period1=..&period2=..&interval=1d`.
//! Missing closes are `null` in the payload and are dropped.

use crate::domain::market::price_series::{PricePoint, PriceSeries};
use crate::domain::ports::PriceHistoryProvider;
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, build_url_with_query};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tracing::{debug, warn};

pub struct YahooPriceHistoryProvider {
    client: ClientWithMiddleware,
    base_url: String,
    quote_currency: String,
}

impl YahooPriceHistoryProvider {
    pub fn new(
        base_url: impl Into<String>,
        quote_currency: impl Into<String>,
        request_timeout: std::time::Duration,
    ) -> Self {
        Self {
            client: HttpClientFactory::create_client(request_timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            quote_currency: quote_currency.into(),
        }
    }

    /// `BTC` -> `BTC-USD`; symbols that already carry a pair are passed through.
    fn ticker(&self, symbol: &str) -> String {
        let symbol = symbol.to_uppercase();
        if symbol.contains('-') || self.quote_currency.is_empty() {
            symbol
        } else {
            format!("{}-{}", symbol, self.quote_currency.to_uppercase())
        }
    }
}

#[async_trait]
impl PriceHistoryProvider for YahooPriceHistoryProvider {
    async fn fetch_daily_closes(&self, symbol: &str, days: u32) -> Result<Option<PriceSeries>> {
        if days == 0 {
            return Ok(None);
        }

        let ticker = self.ticker(symbol);
        let end = Utc::now();
        let start = end - Duration::days(i64::from(days));
        let url = build_url_with_query(
            &format!("{}/{}", self.base_url, ticker),
            &[
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", "1d".to_string()),
            ],
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context(format!("Failed to request chart for {}", ticker))?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!("YahooPriceHistoryProvider: Unknown ticker {}", ticker);
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .context(format!("Chart request for {} was rejected", ticker))?;
        let body = response
            .text()
            .await
            .context("Failed to read chart response body")?;

        let series = parse_chart(symbol, &body)?;
        if let Some(series) = &series {
            debug!(
                "YahooPriceHistoryProvider: {} daily closes for {} over {} days",
                series.len(),
                ticker,
                days
            );
        }
        Ok(series)
    }

    fn name(&self) -> &str {
        "Yahoo Finance"
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// One close per UTC calendar day; a later bar for the same day (the live
/// intraday bar) replaces the earlier one.
fn parse_chart(symbol: &str, body: &str) -> Result<Option<PriceSeries>> {
    let response: ChartResponse =
        serde_json::from_str(body).context("Failed to parse chart response")?;

    if let Some(error) = response.chart.error {
        anyhow::bail!("Chart API error {}: {}", error.code, error.description);
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(None);
    };
    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    let mut points: Vec<PricePoint> = Vec::with_capacity(result.timestamp.len());
    for (ts, close) in result.timestamp.iter().zip(closes) {
        let Some(close) = close.filter(|c| c.is_finite() && *c > 0.0) else {
            continue;
        };
        let Some(timestamp) = DateTime::<Utc>::from_timestamp(*ts, 0) else {
            continue;
        };
        let point = PricePoint::new(timestamp, close);
        match points.last_mut() {
            Some(last) if last.date() == point.date() => *last = point,
            Some(last) if last.timestamp >= point.timestamp => continue,
            _ => points.push(point),
        }
    }

    if points.is_empty() {
        return Ok(None);
    }
    let series = PriceSeries::new(symbol.to_uppercase(), points)
        .context("Chart response is not a valid price series")?;
    Ok(Some(series))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const DAY: i64 = 86_400;
    const JAN_1_2025: i64 = 1_735_689_600;

    fn chart_body(timestamps: &[i64], closes: &str) -> String {
        format!(
            r#"{{"chart":{{"result":[{{"meta":{{"symbol":"BTC-USD","currency":"USD"}},
            "timestamp":{:?},
            "indicators":{{"quote":[{{"close":{},"open":[]}}]}}}}],"error":null}}}}"#,
            timestamps, closes
        )
    }

    #[test]
    fn test_parses_daily_closes_and_drops_nulls() {
        let body = chart_body(
            &[JAN_1_2025, JAN_1_2025 + DAY, JAN_1_2025 + 2 * DAY, JAN_1_2025 + 3 * DAY],
            "[94000.5, null, 96000.0, 97250.25]",
        );
        let series = parse_chart("btc", &body).unwrap().unwrap();

        assert_eq!(series.symbol(), "BTC");
        assert_eq!(series.closes(), vec![94000.5, 96000.0, 97250.25]);
        assert_eq!(
            series.last().unwrap().date(),
            NaiveDate::from_ymd_opt(2025, 1, 4).unwrap()
        );
    }

    #[test]
    fn test_same_day_bar_replaces_previous() {
        let body = chart_body(
            &[JAN_1_2025, JAN_1_2025 + DAY, JAN_1_2025 + DAY + 3_600],
            "[100.0, 101.0, 102.5]",
        );
        let series = parse_chart("ETH", &body).unwrap().unwrap();
        assert_eq!(series.closes(), vec![100.0, 102.5]);
    }

    #[test]
    fn test_empty_result_is_no_data() {
        let body = r#"{"chart":{"result":[],"error":null}}"#;
        assert!(parse_chart("BTC", body).unwrap().is_none());

        let all_null = chart_body(&[JAN_1_2025], "[null]");
        assert!(parse_chart("BTC", &all_null).unwrap().is_none());
    }

    #[test]
    fn test_api_error_is_reported() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input"}}}"#;
        let err = parse_chart("BTC", body).unwrap_err();
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn test_ticker_mapping() {
        let provider = YahooPriceHistoryProvider::new(
            "https://query1.finance.yahoo.com/v8/finance/chart/",
            "USD",
            std::time::Duration::from_secs(5),
        );
        assert_eq!(provider.ticker("btc"), "BTC-USD");
        assert_eq!(provider.ticker("ETH-EUR"), "ETH-EUR");
        assert_eq!(
            provider.base_url,
            "https://query1.finance.yahoo.com/v8/finance/chart"
        );
    }
}
