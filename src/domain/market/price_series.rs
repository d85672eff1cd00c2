use crate::domain::errors::ForecastError;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One daily observation: the bar timestamp and its closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self { timestamp, close }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// A (date, price) pair formatted for charting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Chronological closing prices for one symbol.
///
/// Timestamps are strictly increasing and every close is finite and positive.
/// An empty series is allowed and means "no data".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, ForecastError> {
        for (i, point) in points.iter().enumerate() {
            if !point.close.is_finite() || point.close <= 0.0 {
                return Err(ForecastError::InvalidSeries {
                    reason: format!("close {} at {} is not a positive price", point.close, point.timestamp),
                });
            }
            if i > 0 && point.timestamp <= points[i - 1].timestamp {
                return Err(ForecastError::InvalidSeries {
                    reason: format!("timestamp {} is not after {}", point.timestamp, points[i - 1].timestamp),
                });
            }
        }

        Ok(Self {
            symbol: symbol.into(),
            points,
        })
    }

    /// Builds a series of consecutive daily closes whose last bar falls on `last_day`.
    pub fn daily_ending(
        symbol: impl Into<String>,
        last_day: NaiveDate,
        closes: &[f64],
    ) -> Result<Self, ForecastError> {
        let last = Utc.from_utc_datetime(&last_day.and_time(chrono::NaiveTime::default()));
        let n = closes.len() as i64;
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint::new(last - Duration::days(n - 1 - i as i64), close))
            .collect();
        Self::new(symbol, points)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.last().map(|p| p.close)
    }

    /// Observations within the trailing `days` calendar days, counted back from the newest bar.
    pub fn trailing_days(&self, days: u32) -> Self {
        let points = match self.last() {
            Some(last) if days > 0 => {
                let cutoff = last.timestamp - Duration::days(i64::from(days) - 1);
                self.points
                    .iter()
                    .filter(|p| p.timestamp >= cutoff)
                    .copied()
                    .collect()
            }
            _ => Vec::new(),
        };
        Self {
            symbol: self.symbol.clone(),
            points,
        }
    }

    pub fn to_historical(&self) -> Vec<HistoricalPoint> {
        self.points
            .iter()
            .map(|p| HistoricalPoint {
                date: p.date(),
                price: p.close,
            })
            .collect()
    }
}
