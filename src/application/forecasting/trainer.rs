//! Single-symbol training pass: window, fit scaler, fit regressor, evaluate.

use super::symbol_model::{SymbolModel, TrainingReport};
use crate::application::ml::predictor::{ModelSettings, SequenceModel, SequenceRegressor};
use crate::domain::errors::ForecastError;
use crate::domain::forecasting::normalization::NormalizationState;
use crate::domain::forecasting::windowing::{TrainingSet, make_training_pairs};
use crate::domain::market::price_series::PriceSeries;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

/// Below this many pairs the holdout split is skipped and everything is used for fitting.
const MIN_PAIRS_FOR_HOLDOUT: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSettings {
    pub lookback: usize,
    pub model: ModelSettings,
    pub holdout_ratio: f64,
}

/// Train a fresh `SymbolModel` from a historical series.
pub fn train_symbol_model(
    symbol: &str,
    series: &PriceSeries,
    settings: &TrainingSettings,
) -> Result<SymbolModel, ForecastError> {
    let closes = series.closes();
    let pairs = make_training_pairs(&closes, settings.lookback)?;
    let scaler = NormalizationState::fit(&closes)?;
    let scaled = pairs.scaled(&scaler);

    let (train, holdout) = split_holdout(&scaled, settings.holdout_ratio, settings.model.seed);

    let mut model = SequenceModel::untrained(&settings.model, settings.lookback);
    model.fit(train.windows(), train.targets())?;

    let report = evaluate(symbol, &model, &scaler, &train, holdout.as_ref())?;
    Ok(SymbolModel::trained(symbol, model, scaler, report))
}

/// Seeded shuffle, then the last `ratio` share becomes the holdout set.
fn split_holdout(set: &TrainingSet, ratio: f64, seed: u64) -> (TrainingSet, Option<TrainingSet>) {
    let n = set.len();
    let holdout_len = (n as f64 * ratio.clamp(0.0, 0.5)).round() as usize;
    if n < MIN_PAIRS_FOR_HOLDOUT || holdout_len == 0 {
        return (set.clone(), None);
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (train_idx, test_idx) = indices.split_at(n - holdout_len);
    (set.select(train_idx), Some(set.select(test_idx)))
}

fn evaluate(
    symbol: &str,
    model: &SequenceModel,
    scaler: &NormalizationState,
    train: &TrainingSet,
    holdout: Option<&TrainingSet>,
) -> Result<TrainingReport, ForecastError> {
    let mut report = TrainingReport {
        training_samples: train.len(),
        holdout_samples: 0,
        mae: None,
        rmse: None,
        final_loss: model.training_loss(),
    };

    let Some(holdout) = holdout else {
        info!(
            "Trainer: {} trained on {} samples (no holdout)",
            symbol,
            train.len()
        );
        return Ok(report);
    };

    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    for (window, target) in holdout.pairs() {
        let predicted = scaler.invert(model.predict(window)?);
        let actual = scaler.invert(target);
        abs_sum += (predicted - actual).abs();
        sq_sum += (predicted - actual).powi(2);
    }
    let n = holdout.len() as f64;
    let mae = abs_sum / n;
    let rmse = (sq_sum / n).sqrt();

    info!(
        "Trainer: {} Model - MAE: {:.2}, RMSE: {:.2} (train={}, holdout={})",
        symbol,
        mae,
        rmse,
        train.len(),
        holdout.len()
    );

    report.holdout_samples = holdout.len();
    report.mae = Some(mae);
    report.rmse = Some(rmse);
    Ok(report)
}
