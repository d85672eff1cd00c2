//! In-memory model store
//!
//! Keeps (model, scaler) pairs in a map for tests and throwaway runs.
//! Nothing survives a restart. A pair can be marked torn to simulate an
//! interrupted save, and saves can be forced to fail.

use crate::application::forecasting::model_store::ModelStore;
use crate::application::ml::predictor::SequenceModel;
use crate::domain::errors::ForecastError;
use crate::domain::forecasting::normalization::NormalizationState;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

/// `None` marks a torn pair.
type Entry = Option<(SequenceModel, NormalizationState)>;

pub struct InMemoryModelStore {
    entries: RwLock<HashMap<String, Entry>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
    loads: AtomicUsize,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fail_saves: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    /// Replace the stored pair with a torn one; `exists` stays true.
    pub fn tear(&self, symbol: &str) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_lowercase(), None);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStore for InMemoryModelStore {
    fn exists(&self, symbol: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&symbol.to_lowercase())
    }

    fn save(&self, symbol: &str, model: &SequenceModel, scaler: &NormalizationState) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("InMemoryModelStore: save rejected for {}", symbol);
        }
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_lowercase(), Some((model.clone(), *scaler)));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, symbol: &str) -> Result<(SequenceModel, NormalizationState), ForecastError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(&symbol.to_lowercase()) {
            Some(Some(pair)) => Ok(pair.clone()),
            Some(None) => Err(ForecastError::StoreCorruption {
                symbol: symbol.to_uppercase(),
                reason: "torn pair".to_string(),
            }),
            None => Err(ForecastError::StoreCorruption {
                symbol: symbol.to_uppercase(),
                reason: "no stored artifacts".to_string(),
            }),
        }
    }
}
