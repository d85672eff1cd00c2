use crate::domain::errors::ForecastError;
use serde::{Deserialize, Serialize};

/// Min-max scaler fitted once from a symbol's training closes.
///
/// `apply` and `invert` extrapolate linearly outside `[min, max]`; live prices
/// routinely leave the training range and clamping would hide that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationState {
    min: f64,
    max: f64,
}

impl NormalizationState {
    pub fn fit(values: &[f64]) -> Result<Self, ForecastError> {
        if values.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: 1,
                available: 0,
            });
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidSeries {
                reason: format!("cannot fit scaler on non-finite value {}", bad),
            });
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self::from_bounds(min, max)
    }

    pub fn from_bounds(min: f64, max: f64) -> Result<Self, ForecastError> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ForecastError::InvalidSeries {
                reason: format!("invalid scaler bounds [{}, {}]", min, max),
            });
        }
        if max == min {
            return Err(ForecastError::DegenerateRange { value: min });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// False for states that could only come from a damaged artifact.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max > self.min
    }

    pub fn apply(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn invert(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.min
    }

    pub fn apply_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.apply(v)).collect()
    }

    pub fn invert_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.invert(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_apply_invert_small_example() {
        let state = NormalizationState::fit(&[10.0, 20.0, 30.0]).unwrap();

        assert_eq!(state.min(), 10.0);
        assert_eq!(state.max(), 30.0);
        assert_eq!(state.apply(15.0), 0.25);
        assert_eq!(state.invert(0.25), 15.0);
    }

    #[test]
    fn test_training_values_land_in_unit_interval() {
        let values = [3.5, 9.0, 1.25, 7.75, 4.0];
        let state = NormalizationState::fit(&values).unwrap();

        for v in values {
            let scaled = state.apply(v);
            assert!((0.0..=1.0).contains(&scaled));
            assert!(state.min() <= v && v <= state.max());
        }
    }

    #[test]
    fn test_round_trip_within_relative_tolerance() {
        let state = NormalizationState::fit(&[0.31, 64_000.0, 12_345.678]).unwrap();

        for v in [0.31, 1.0, 999.99, 64_000.0, 70_123.45, -50.0] {
            let back = state.invert(state.apply(v));
            let tolerance = 1e-9 * v.abs().max(1.0);
            assert!((back - v).abs() <= tolerance, "{} -> {}", v, back);
        }
    }

    #[test]
    fn test_extrapolates_outside_training_range() {
        let state = NormalizationState::fit(&[100.0, 200.0]).unwrap();

        assert_eq!(state.apply(250.0), 1.5);
        assert_eq!(state.apply(50.0), -0.5);
        assert_eq!(state.invert(1.5), 250.0);
    }

    #[test]
    fn test_constant_series_is_degenerate() {
        let err = NormalizationState::fit(&[42.0, 42.0, 42.0]).unwrap_err();
        assert_eq!(err, ForecastError::DegenerateRange { value: 42.0 });
    }

    #[test]
    fn test_empty_and_non_finite_inputs_fail() {
        assert!(matches!(
            NormalizationState::fit(&[]),
            Err(ForecastError::InsufficientData { .. })
        ));
        assert!(matches!(
            NormalizationState::fit(&[1.0, f64::INFINITY]),
            Err(ForecastError::InvalidSeries { .. })
        ));
    }

    #[test]
    fn test_slice_helpers_match_scalar_mapping() {
        let state = NormalizationState::fit(&[1.0, 5.0]).unwrap();
        let scaled = state.apply_all(&[1.0, 3.0, 5.0]);
        assert_eq!(scaled, vec![0.0, 0.5, 1.0]);
        assert_eq!(state.invert_all(&scaled), vec![1.0, 3.0, 5.0]);
    }
}
