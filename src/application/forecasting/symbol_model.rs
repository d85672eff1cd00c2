use crate::application::ml::predictor::{SequenceModel, SequenceRegressor};
use crate::domain::errors::ForecastError;
use crate::domain::forecasting::normalization::NormalizationState;
use crate::domain::forecasting::windowing::Window;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Holdout metrics from the training pass, in price units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub training_samples: usize,
    pub holdout_samples: usize,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
    pub final_loss: Option<f64>,
}

/// A trained regressor bound to the scaler it was trained with.
///
/// The pair is only ever built or replaced as a whole; there is no way to
/// swap the scaler of an existing `SymbolModel`.
#[derive(Debug, Clone)]
pub struct SymbolModel {
    symbol: String,
    model: SequenceModel,
    scaler: NormalizationState,
    trained_at: Option<DateTime<Utc>>,
    report: Option<TrainingReport>,
}

impl SymbolModel {
    pub fn trained(
        symbol: impl Into<String>,
        model: SequenceModel,
        scaler: NormalizationState,
        report: TrainingReport,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            model,
            scaler,
            trained_at: Some(Utc::now()),
            report: Some(report),
        }
    }

    /// A pair restored from the model store; training metadata is not persisted.
    pub fn restored(symbol: impl Into<String>, model: SequenceModel, scaler: NormalizationState) -> Self {
        Self {
            symbol: symbol.into(),
            model,
            scaler,
            trained_at: None,
            report: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn model(&self) -> &SequenceModel {
        &self.model
    }

    pub fn scaler(&self) -> &NormalizationState {
        &self.scaler
    }

    pub fn lookback(&self) -> usize {
        self.model.lookback()
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    /// Scale a raw-price window, run the regressor, and map the output back to price.
    pub fn predict_next(&self, window: &Window) -> Result<f64, ForecastError> {
        let scaled = window.scaled(&self.scaler);
        let output = self.model.predict(&scaled)?;
        Ok(self.scaler.invert(output))
    }
}
