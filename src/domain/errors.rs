use serde::Serialize;
use thiserror::Error;

/// Errors raised inside the forecasting pipeline (windowing, scaling, models, store)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("Insufficient data: need {required} observations, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Degenerate price range: every value equals {value}")]
    DegenerateRange { value: f64 },

    #[error("Model has not been trained or loaded")]
    ModelNotTrained,

    #[error("Stored artifacts for {symbol} are unusable: {reason}")]
    StoreCorruption { symbol: String, reason: String },

    #[error("Invalid price series: {reason}")]
    InvalidSeries { reason: String },

    #[error("Model training failed: {reason}")]
    Training { reason: String },
}

/// Reason code attached to a [`PredictionUnavailable`] at the engine boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    UnknownSymbol,
    NotReady,
    RetrainInProgress,
    NoData,
    Timeout,
    InsufficientData,
    DegenerateRange,
    ModelNotTrained,
    StoreCorruption,
    InvalidSeries,
    TrainingFailed,
    InferenceFailed,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::UnknownSymbol => "unknown symbol",
            UnavailableReason::NotReady => "model not ready",
            UnavailableReason::RetrainInProgress => "retrain already in progress",
            UnavailableReason::NoData => "no market data",
            UnavailableReason::Timeout => "market data fetch timed out",
            UnavailableReason::InsufficientData => "insufficient market data",
            UnavailableReason::DegenerateRange => "degenerate price range",
            UnavailableReason::ModelNotTrained => "model not trained",
            UnavailableReason::StoreCorruption => "stored model unusable",
            UnavailableReason::InvalidSeries => "invalid price series",
            UnavailableReason::TrainingFailed => "model training failed",
            UnavailableReason::InferenceFailed => "inference failed",
        }
    }
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ForecastError> for UnavailableReason {
    fn from(err: &ForecastError) -> Self {
        match err {
            ForecastError::InsufficientData { .. } => UnavailableReason::InsufficientData,
            ForecastError::DegenerateRange { .. } => UnavailableReason::DegenerateRange,
            ForecastError::ModelNotTrained => UnavailableReason::ModelNotTrained,
            ForecastError::StoreCorruption { .. } => UnavailableReason::StoreCorruption,
            ForecastError::InvalidSeries { .. } => UnavailableReason::InvalidSeries,
            ForecastError::Training { .. } => UnavailableReason::TrainingFailed,
        }
    }
}

/// The only failure that crosses the prediction boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Prediction unavailable for {symbol}: {reason}")]
pub struct PredictionUnavailable {
    pub symbol: String,
    pub reason: UnavailableReason,
}

impl PredictionUnavailable {
    pub fn new(symbol: impl Into<String>, reason: UnavailableReason) -> Self {
        Self {
            symbol: symbol.into(),
            reason,
        }
    }

    pub fn from_forecast(symbol: impl Into<String>, err: &ForecastError) -> Self {
        Self::new(symbol, UnavailableReason::from(err))
    }
}
