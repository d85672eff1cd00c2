use crate::application::ml::predictor::SequenceModel;
use crate::domain::errors::ForecastError;
use crate::domain::forecasting::normalization::NormalizationState;
use anyhow::Result;

/// Durable mapping from a symbol to its (model, scaler) pair.
///
/// Implementations are synchronous; the engine calls them from
/// `spawn_blocking` so file IO never stalls the runtime.
pub trait ModelStore: Send + Sync {
    fn exists(&self, symbol: &str) -> bool;

    /// Persist both artifacts. A crash part-way through must surface as
    /// `StoreCorruption` on the next `load`, never as a mismatched pair.
    fn save(&self, symbol: &str, model: &SequenceModel, scaler: &NormalizationState) -> Result<()>;

    /// Fails with `StoreCorruption` when either artifact is missing, unreadable or inconsistent.
    fn load(&self, symbol: &str) -> Result<(SequenceModel, NormalizationState), ForecastError>;
}
