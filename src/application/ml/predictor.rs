use super::gru_regressor::{GruConfig, GruRegressor};
use super::linear_regressor::LinearWindowRegressor;
use crate::domain::errors::ForecastError;
use crate::domain::forecasting::ModelKind;
use crate::domain::forecasting::windowing::Window;
use serde::{Deserialize, Serialize};

/// Interface for next-value sequence regressors.
///
/// Inputs and targets are already scaled; implementations never see raw prices.
pub trait SequenceRegressor: Send + Sync {
    fn fit(&mut self, windows: &[Window], targets: &[f64]) -> Result<(), ForecastError>;

    /// Fails with `ModelNotTrained` before a successful `fit` or load.
    fn predict(&self, window: &Window) -> Result<f64, ForecastError>;

    /// Structural check of restored parameters against the model's own
    /// configuration. A model that passes never panics in `predict`.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    fn lookback(&self) -> usize;

    fn is_trained(&self) -> bool;

    /// Get model name/type
    fn name(&self) -> &str;

    /// Mean squared error of the last training epoch, when the model tracks it
    fn training_loss(&self) -> Option<f64> {
        None
    }
}

/// Hyper-parameters shared by both regressor variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub kind: ModelKind,
    pub epochs: usize,
    pub batch_size: usize,
    pub hidden_units: usize,
    pub layers: usize,
    pub dropout: f64,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            kind: ModelKind::Recurrent,
            epochs: 25,
            batch_size: 32,
            hidden_units: 32,
            layers: 3,
            dropout: 0.2,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}

/// The regressor behind a symbol, one variant per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceModel {
    Linear(LinearWindowRegressor),
    Recurrent(GruRegressor),
}

impl SequenceModel {
    pub fn untrained(settings: &ModelSettings, lookback: usize) -> Self {
        match settings.kind {
            ModelKind::Linear => SequenceModel::Linear(LinearWindowRegressor::new(lookback)),
            ModelKind::Recurrent => SequenceModel::Recurrent(GruRegressor::new(GruConfig {
                lookback,
                hidden_units: settings.hidden_units,
                layers: settings.layers,
                dropout: settings.dropout,
                learning_rate: settings.learning_rate,
                epochs: settings.epochs,
                batch_size: settings.batch_size,
                seed: settings.seed,
                ..GruConfig::default()
            })),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            SequenceModel::Linear(_) => ModelKind::Linear,
            SequenceModel::Recurrent(_) => ModelKind::Recurrent,
        }
    }

    fn inner(&self) -> &dyn SequenceRegressor {
        match self {
            SequenceModel::Linear(m) => m,
            SequenceModel::Recurrent(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn SequenceRegressor {
        match self {
            SequenceModel::Linear(m) => m,
            SequenceModel::Recurrent(m) => m,
        }
    }
}

impl SequenceRegressor for SequenceModel {
    fn fit(&mut self, windows: &[Window], targets: &[f64]) -> Result<(), ForecastError> {
        self.inner_mut().fit(windows, targets)
    }

    fn predict(&self, window: &Window) -> Result<f64, ForecastError> {
        self.inner().predict(window)
    }

    fn validate(&self) -> Result<(), String> {
        self.inner().validate()
    }

    fn lookback(&self) -> usize {
        self.inner().lookback()
    }

    fn is_trained(&self) -> bool {
        self.inner().is_trained()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn training_loss(&self) -> Option<f64> {
        self.inner().training_loss()
    }
}

/// Shape checks every `fit` implementation runs before touching its solver.
pub(crate) fn validate_training_batch(
    windows: &[Window],
    targets: &[f64],
    lookback: usize,
) -> Result<(), ForecastError> {
    if windows.is_empty() {
        return Err(ForecastError::InsufficientData {
            required: 1,
            available: 0,
        });
    }
    if windows.len() != targets.len() {
        return Err(ForecastError::Training {
            reason: format!("{} windows but {} targets", windows.len(), targets.len()),
        });
    }
    if let Some(w) = windows.iter().find(|w| w.len() != lookback) {
        return Err(ForecastError::InsufficientData {
            required: lookback,
            available: w.len(),
        });
    }
    if targets.iter().any(|t| !t.is_finite()) {
        return Err(ForecastError::Training {
            reason: "non-finite training target".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn check_window(window: &Window, lookback: usize) -> Result<(), ForecastError> {
    if window.len() != lookback {
        return Err(ForecastError::InsufficientData {
            required: lookback,
            available: window.len(),
        });
    }
    Ok(())
}
