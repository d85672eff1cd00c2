use super::predictor::{SequenceRegressor, check_window, validate_training_batch};
use crate::domain::errors::ForecastError;
use crate::domain::forecasting::windowing::Window;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{LinearRegression, LinearRegressionParameters};
use tracing::debug;

type Regressor = LinearRegression<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Fitted OLS parameters, one weight per lag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Coefficients {
    weights: Vec<f64>,
    intercept: f64,
}

/// Ordinary least squares over the flattened window (one feature per lag).
///
/// smartcore solves the system; only the resulting weights are kept, so the
/// persisted form is plain numbers that `validate` can check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearWindowRegressor {
    lookback: usize,
    fitted: Option<Coefficients>,
}

impl LinearWindowRegressor {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback,
            fitted: None,
        }
    }
}

impl SequenceRegressor for LinearWindowRegressor {
    fn fit(&mut self, windows: &[Window], targets: &[f64]) -> Result<(), ForecastError> {
        validate_training_batch(windows, targets, self.lookback)?;

        let rows: Vec<Vec<f64>> = windows.iter().map(|w| w.values().to_vec()).collect();
        let x = DenseMatrix::from_2d_vec(&rows).map_err(|e| ForecastError::Training {
            reason: format!("Matrix creation failed: {}", e),
        })?;
        let y = targets.to_vec();

        let model: Regressor = LinearRegression::fit(&x, &y, LinearRegressionParameters::default())
            .map_err(|e| ForecastError::Training {
                reason: format!("Linear regression fit failed: {}", e),
            })?;

        let fitted = Coefficients {
            weights: model.coefficients().iterator(0).copied().collect(),
            intercept: *model.intercept(),
        };
        if fitted.weights.len() != self.lookback
            || !fitted.intercept.is_finite()
            || fitted.weights.iter().any(|w| !w.is_finite())
        {
            return Err(ForecastError::Training {
                reason: "Linear regression produced unusable coefficients".to_string(),
            });
        }

        debug!(
            "LinearWindowRegressor: fitted on {} windows (lookback {})",
            rows.len(),
            self.lookback
        );
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, window: &Window) -> Result<f64, ForecastError> {
        let fitted = self.fitted.as_ref().ok_or(ForecastError::ModelNotTrained)?;
        check_window(window, self.lookback)?;

        Ok(fitted.intercept
            + fitted
                .weights
                .iter()
                .zip(window.values())
                .map(|(w, x)| w * x)
                .sum::<f64>())
    }

    fn validate(&self) -> Result<(), String> {
        let Some(fitted) = &self.fitted else {
            return Ok(());
        };
        if fitted.weights.len() != self.lookback {
            return Err(format!(
                "{} coefficients for lookback {}",
                fitted.weights.len(),
                self.lookback
            ));
        }
        if !fitted.intercept.is_finite() || fitted.weights.iter().any(|w| !w.is_finite()) {
            return Err("non-finite coefficient".to_string());
        }
        Ok(())
    }

    fn lookback(&self) -> usize {
        self.lookback
    }

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    fn name(&self) -> &str {
        "SmartCore Linear Regression"
    }
}
