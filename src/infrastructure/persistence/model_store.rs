//! JSON artifacts on disk: `model_<symbol>.json` and `scaler_<symbol>.json`.
//!
//! Both files of a pair carry the same `pair_id`. Each is written to a
//! `.tmp` sibling and renamed into place, scaler first, model last, so an
//! interrupted save leaves either the previous pair intact or two files whose
//! ids disagree. `load` rejects the latter as corruption.

use crate::application::forecasting::model_store::ModelStore;
use crate::application::ml::predictor::{SequenceModel, SequenceRegressor};
use crate::domain::errors::ForecastError;
use crate::domain::forecasting::normalization::NormalizationState;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    pair_id: Uuid,
    symbol: String,
    lookback: usize,
    saved_at: DateTime<Utc>,
    model: SequenceModel,
}

#[derive(Serialize, Deserialize)]
struct ScalerArtifact {
    pair_id: Uuid,
    symbol: String,
    lookback: usize,
    scaler: NormalizationState,
}

pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("model_{}.json", symbol.to_lowercase()))
    }

    pub fn scaler_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("scaler_{}.json", symbol.to_lowercase()))
    }
}

impl ModelStore for FileModelStore {
    fn exists(&self, symbol: &str) -> bool {
        self.model_path(symbol).exists() && self.scaler_path(symbol).exists()
    }

    fn save(&self, symbol: &str, model: &SequenceModel, scaler: &NormalizationState) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .context(format!("Failed to create model directory {:?}", self.dir))?;

        let pair_id = Uuid::new_v4();
        let symbol = symbol.to_uppercase();
        let scaler_artifact = ScalerArtifact {
            pair_id,
            symbol: symbol.clone(),
            lookback: model.lookback(),
            scaler: *scaler,
        };
        let model_artifact = ModelArtifact {
            pair_id,
            symbol: symbol.clone(),
            lookback: model.lookback(),
            saved_at: Utc::now(),
            model: model.clone(),
        };

        let scaler_path = self.scaler_path(&symbol);
        let model_path = self.model_path(&symbol);
        let scaler_tmp = scaler_path.with_extension("tmp");
        let model_tmp = model_path.with_extension("tmp");

        let scaler_json =
            serde_json::to_vec(&scaler_artifact).context("Failed to serialize scaler")?;
        let model_json = serde_json::to_vec(&model_artifact).context("Failed to serialize model")?;
        fs::write(&scaler_tmp, scaler_json).context("Failed to write temp scaler file")?;
        fs::write(&model_tmp, model_json).context("Failed to write temp model file")?;

        fs::rename(&scaler_tmp, &scaler_path).context("Failed to rename scaler file")?;
        fs::rename(&model_tmp, &model_path).context("Failed to rename model file")?;

        info!(
            "FileModelStore: Saved {} pair {} to {:?}",
            symbol, pair_id, self.dir
        );
        Ok(())
    }

    fn load(&self, symbol: &str) -> Result<(SequenceModel, NormalizationState), ForecastError> {
        let symbol = symbol.to_uppercase();
        let corrupt = |reason: String| ForecastError::StoreCorruption {
            symbol: symbol.clone(),
            reason,
        };

        let scaler: ScalerArtifact = read_artifact(&self.scaler_path(&symbol)).map_err(&corrupt)?;
        let model: ModelArtifact = read_artifact(&self.model_path(&symbol)).map_err(&corrupt)?;

        if scaler.pair_id != model.pair_id {
            return Err(corrupt(format!(
                "scaler pair {} does not match model pair {}",
                scaler.pair_id, model.pair_id
            )));
        }
        if !scaler.symbol.eq_ignore_ascii_case(&symbol) || !model.symbol.eq_ignore_ascii_case(&symbol) {
            return Err(corrupt(format!(
                "artifacts belong to {}/{}",
                model.symbol, scaler.symbol
            )));
        }
        if !scaler.scaler.is_valid() {
            return Err(corrupt("scaler bounds are invalid".to_string()));
        }
        if model.model.lookback() != model.lookback || scaler.lookback != model.lookback {
            return Err(corrupt(format!(
                "lookback mismatch (model {}, recorded {}, scaler {})",
                model.model.lookback(),
                model.lookback,
                scaler.lookback
            )));
        }
        if !model.model.is_trained() {
            return Err(corrupt("model artifact holds no trained weights".to_string()));
        }
        model
            .model
            .validate()
            .map_err(|reason| corrupt(format!("model weights are malformed: {}", reason)))?;

        info!(
            "FileModelStore: Loaded {} pair {} (saved {})",
            symbol, model.pair_id, model.saved_at
        );
        Ok((model.model, scaler.scaler))
    }
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> std::result::Result<T, String> {
    let content = fs::read(path).map_err(|e| format!("cannot read {:?}: {}", path, e))?;
    serde_json::from_slice(&content).map_err(|e| format!("cannot parse {:?}: {}", path, e))
}
