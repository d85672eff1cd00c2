pub mod normalization;
pub mod prediction;
pub mod windowing;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Regression strategy used for every symbol of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Flattened-window linear regression
    Linear,
    /// Stacked GRU network
    Recurrent,
}

impl ModelKind {
    pub fn default_lookback(&self) -> usize {
        match self {
            ModelKind::Linear => 5,
            ModelKind::Recurrent => 60,
        }
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(ModelKind::Linear),
            "recurrent" | "gru" => Ok(ModelKind::Recurrent),
            _ => anyhow::bail!("Invalid MODEL_KIND: {}. Must be 'linear' or 'recurrent'", s),
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Linear => write!(f, "linear"),
            ModelKind::Recurrent => write!(f, "recurrent"),
        }
    }
}

/// Lifecycle of a tracked symbol inside the prediction engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Unloaded,
    Ready,
    Retraining,
}

impl ModelState {
    /// Ready and Retraining both serve predictions from the active model.
    pub fn can_serve(&self) -> bool {
        matches!(self, ModelState::Ready | ModelState::Retraining)
    }
}
