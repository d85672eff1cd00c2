use chrono::NaiveDate;
use serde::Serialize;

/// Next-step forecast for one symbol, created fresh on every inference call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub symbol: String,
    pub current_price: f64,
    pub predicted_price: f64,
    pub change_percent: f64,
    pub prediction_date: NaiveDate,
}

impl PredictionResult {
    /// `current_price` must be positive; it always comes from a validated series.
    pub fn new(
        symbol: impl Into<String>,
        current_price: f64,
        predicted_price: f64,
        prediction_date: NaiveDate,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            current_price,
            predicted_price,
            change_percent: (predicted_price - current_price) / current_price * 100.0,
            prediction_date,
        }
    }
}
