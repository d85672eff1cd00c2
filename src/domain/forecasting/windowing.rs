//! Fixed-length lookback windows over closing prices.
//!
//! A [`Window`] can only be built with exactly `lookback` values, so every
//! consumer downstream can rely on the length without re-checking shapes.

use crate::domain::errors::ForecastError;
use crate::domain::forecasting::normalization::NormalizationState;

#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    values: Vec<f64>,
}

impl Window {
    pub fn new(values: Vec<f64>, lookback: usize) -> Result<Self, ForecastError> {
        check_lookback(lookback)?;
        if values.len() != lookback {
            return Err(ForecastError::InsufficientData {
                required: lookback,
                available: values.len(),
            });
        }
        Ok(Self { values })
    }

    /// Oldest value first.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn scaled(&self, state: &NormalizationState) -> Self {
        Self {
            values: state.apply_all(&self.values),
        }
    }
}

/// (window, next value) pairs for one symbol, all sharing one lookback length.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    lookback: usize,
    windows: Vec<Window>,
    targets: Vec<f64>,
}

impl TrainingSet {
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&Window, f64)> {
        self.windows.iter().zip(self.targets.iter().copied())
    }

    /// Windows and targets mapped through the scaler.
    pub fn scaled(&self, state: &NormalizationState) -> Self {
        Self {
            lookback: self.lookback,
            windows: self.windows.iter().map(|w| w.scaled(state)).collect(),
            targets: state.apply_all(&self.targets),
        }
    }

    /// Subset by index, in the order given.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            lookback: self.lookback,
            windows: indices.iter().map(|&i| self.windows[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
        }
    }
}

/// One pair per index `i` in `[lookback, len)`: `closes[i - lookback..i]` predicts `closes[i]`.
pub fn make_training_pairs(closes: &[f64], lookback: usize) -> Result<TrainingSet, ForecastError> {
    check_lookback(lookback)?;
    if closes.len() <= lookback {
        return Err(ForecastError::InsufficientData {
            required: lookback + 1,
            available: closes.len(),
        });
    }

    let windows = closes
        .windows(lookback)
        .take(closes.len() - lookback)
        .map(|slice| Window {
            values: slice.to_vec(),
        })
        .collect();
    let targets = closes[lookback..].to_vec();

    Ok(TrainingSet {
        lookback,
        windows,
        targets,
    })
}

/// The most recent `lookback` closes, oldest first.
pub fn make_inference_window(closes: &[f64], lookback: usize) -> Result<Window, ForecastError> {
    check_lookback(lookback)?;
    if closes.len() < lookback {
        return Err(ForecastError::InsufficientData {
            required: lookback,
            available: closes.len(),
        });
    }
    Window::new(closes[closes.len() - lookback..].to_vec(), lookback)
}

fn check_lookback(lookback: usize) -> Result<(), ForecastError> {
    if lookback == 0 {
        return Err(ForecastError::InvalidSeries {
            reason: "lookback length must be at least 1".to_string(),
        });
    }
    Ok(())
}
