//! Per-symbol model lifecycle.
//!
//! Every tracked symbol starts `Unloaded`. Startup resolution either restores
//! the stored (model, scaler) pair or runs a training pass, then moves the
//! symbol to `Ready`. Predictions read an `Arc<SymbolModel>` snapshot taken
//! under a short read lock, so a retrain swapping in a new pair can never be
//! observed half-way.

use super::model_store::ModelStore;
use super::symbol_model::{SymbolModel, TrainingReport};
use super::trainer::{TrainingSettings, train_symbol_model};
use crate::application::ml::predictor::SequenceRegressor;
use crate::domain::errors::{ForecastError, PredictionUnavailable, UnavailableReason};
use crate::domain::forecasting::ModelState;
use crate::domain::forecasting::prediction::PredictionResult;
use crate::domain::forecasting::windowing::make_inference_window;
use crate::domain::market::price_series::{HistoricalPoint, PriceSeries};
use crate::domain::ports::PriceHistoryProvider;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub symbols: Vec<String>,
    pub training: TrainingSettings,
    /// Calendar days of history fetched for a training pass
    pub training_history_days: u32,
    pub fetch_timeout: Duration,
    /// Upper bound on concurrent training passes
    pub max_parallel_training: usize,
}

/// How a symbol reached `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    Loaded,
    Trained,
    AlreadyReady,
}

/// Why a symbol could not be made ready, as kept in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolFailure {
    pub reason: UnavailableReason,
    pub detail: String,
}

impl SymbolFailure {
    fn new(reason: UnavailableReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    fn from_forecast(err: &ForecastError) -> Self {
        Self::new(UnavailableReason::from(err), err.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolStatus {
    pub symbol: String,
    pub state: ModelState,
    pub version: u64,
    pub model: Option<String>,
    pub lookback: Option<usize>,
    pub trained_at: Option<DateTime<Utc>>,
    pub report: Option<TrainingReport>,
    pub failure: Option<SymbolFailure>,
}

struct SymbolSlot {
    state: ModelState,
    active: Option<Arc<SymbolModel>>,
    /// Bumped on every install; 0 means nothing was ever installed.
    version: u64,
    resolving: bool,
    failure: Option<SymbolFailure>,
}

impl SymbolSlot {
    fn unloaded() -> Self {
        Self {
            state: ModelState::Unloaded,
            active: None,
            version: 0,
            resolving: false,
            failure: None,
        }
    }

    fn status(&self, symbol: &str) -> SymbolStatus {
        SymbolStatus {
            symbol: symbol.to_string(),
            state: self.state,
            version: self.version,
            model: self.active.as_ref().map(|m| m.model().name().to_string()),
            lookback: self.active.as_ref().map(|m| m.lookback()),
            trained_at: self.active.as_ref().and_then(|m| m.trained_at()),
            report: self.active.as_ref().and_then(|m| m.report().cloned()),
            failure: self.failure.clone(),
        }
    }
}

pub struct PredictionEngine {
    settings: EngineSettings,
    symbols: Vec<String>,
    provider: Arc<dyn PriceHistoryProvider>,
    store: Arc<dyn ModelStore>,
    slots: RwLock<HashMap<String, SymbolSlot>>,
    training_permits: Semaphore,
}

impl PredictionEngine {
    pub fn new(
        settings: EngineSettings,
        provider: Arc<dyn PriceHistoryProvider>,
        store: Arc<dyn ModelStore>,
    ) -> Self {
        let mut symbols: Vec<String> = Vec::new();
        for symbol in settings.symbols.iter().map(|s| normalize_symbol(s)) {
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        let slots = symbols
            .iter()
            .map(|s| (s.clone(), SymbolSlot::unloaded()))
            .collect();
        let training_permits = Semaphore::new(settings.max_parallel_training.max(1));

        Self {
            settings,
            symbols,
            provider,
            store,
            slots: RwLock::new(slots),
            training_permits,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Tracked symbols, upper-cased, in configuration order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Startup resolution for every tracked symbol. Symbols are independent,
    /// so they resolve concurrently; CPU-bound training is capped by the
    /// training semaphore.
    pub async fn resolve_all(&self) -> Vec<(String, Result<ResolveOutcome, PredictionUnavailable>)> {
        info!(
            "PredictionEngine: Resolving {} symbols (provider: {}, lookback: {})",
            self.symbols.len(),
            self.provider.name(),
            self.settings.training.lookback
        );

        let results = join_all(self.symbols.iter().map(|symbol| async move {
            (symbol.clone(), self.resolve_symbol(symbol).await)
        }))
        .await;

        let ready = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(
            "PredictionEngine: {}/{} symbols ready",
            ready,
            results.len()
        );
        results
    }

    /// Load-or-train one symbol. A symbol whose resolution already failed is
    /// not retried for the lifetime of the engine.
    pub async fn resolve_symbol(&self, symbol: &str) -> Result<ResolveOutcome, PredictionUnavailable> {
        let symbol = normalize_symbol(symbol);
        {
            let mut slots = self.slots.write().await;
            let slot = slots
                .get_mut(&symbol)
                .ok_or_else(|| PredictionUnavailable::new(&symbol, UnavailableReason::UnknownSymbol))?;
            if slot.state.can_serve() {
                return Ok(ResolveOutcome::AlreadyReady);
            }
            if let Some(failure) = &slot.failure {
                return Err(PredictionUnavailable::new(&symbol, failure.reason));
            }
            if slot.resolving {
                return Err(PredictionUnavailable::new(&symbol, UnavailableReason::NotReady));
            }
            slot.resolving = true;
        }

        match self.load_from_store(&symbol).await {
            Ok(model) => {
                info!(
                    "PredictionEngine: Loaded stored {} model for {}",
                    model.model().name(),
                    symbol
                );
                self.install(&symbol, Arc::new(model)).await;
                return Ok(ResolveOutcome::Loaded);
            }
            Err(failure) => {
                info!(
                    "PredictionEngine: No usable stored model for {} ({}), training",
                    symbol, failure.detail
                );
            }
        }

        match self.train_and_persist(&symbol).await {
            Ok(model) => {
                self.install(&symbol, model).await;
                Ok(ResolveOutcome::Trained)
            }
            Err(failure) => {
                error!(
                    "PredictionEngine: {} stays UNLOADED: {} ({})",
                    symbol, failure.reason, failure.detail
                );
                let reason = failure.reason;
                let mut slots = self.slots.write().await;
                if let Some(slot) = slots.get_mut(&symbol) {
                    slot.resolving = false;
                    slot.failure = Some(failure);
                }
                Err(PredictionUnavailable::new(&symbol, reason))
            }
        }
    }

    /// Next-day forecast from fresh data. Never fails with anything but a typed absence.
    pub async fn predict_price(&self, symbol: &str) -> Result<PredictionResult, PredictionUnavailable> {
        let symbol = normalize_symbol(symbol);
        let model = self.active_model(&symbol).await?;
        let lookback = model.lookback();

        let series = self
            .fetch_series(&symbol, recent_window_days(lookback))
            .await
            .map_err(|f| PredictionUnavailable::new(&symbol, f.reason))?;

        let window = make_inference_window(&series.closes(), lookback).map_err(|e| {
            warn!("PredictionEngine: Cannot build window for {}: {}", symbol, e);
            PredictionUnavailable::from_forecast(&symbol, &e)
        })?;

        let inference = tokio::task::spawn_blocking(move || model.predict_next(&window))
            .await
            .map_err(|e| {
                error!("PredictionEngine: Inference task for {} failed: {}", symbol, e);
                PredictionUnavailable::new(&symbol, UnavailableReason::InferenceFailed)
            })?;
        let predicted = inference.map_err(|e| {
            warn!("PredictionEngine: Inference failed for {}: {}", symbol, e);
            PredictionUnavailable::from_forecast(&symbol, &e)
        })?;
        if !predicted.is_finite() {
            warn!("PredictionEngine: Non-finite prediction for {}", symbol);
            return Err(PredictionUnavailable::new(
                &symbol,
                UnavailableReason::InferenceFailed,
            ));
        }

        let current_price = series
            .latest_close()
            .ok_or_else(|| PredictionUnavailable::new(&symbol, UnavailableReason::NoData))?;
        let today = Utc::now().date_naive();
        let prediction_date = today.succ_opt().unwrap_or(today);

        debug!(
            "PredictionEngine: {} current {:.4} predicted {:.4}",
            symbol, current_price, predicted
        );
        Ok(PredictionResult::new(
            symbol,
            current_price,
            predicted,
            prediction_date,
        ))
    }

    /// (date, close) pairs for charting over the trailing `days` calendar days.
    /// Not limited to tracked symbols.
    pub async fn get_historical_data(
        &self,
        symbol: &str,
        days: u32,
    ) -> Result<Vec<HistoricalPoint>, PredictionUnavailable> {
        let symbol = normalize_symbol(symbol);
        if days == 0 {
            return Ok(Vec::new());
        }
        let series = self
            .fetch_series(&symbol, days)
            .await
            .map_err(|f| PredictionUnavailable::new(&symbol, f.reason))?;
        Ok(series.trailing_days(days).to_historical())
    }

    /// Replace a ready symbol's pair with a freshly trained one. The previous
    /// pair keeps serving until the new one is persisted and swapped in, and
    /// stays active if training fails.
    pub async fn retrain(&self, symbol: &str) -> Result<SymbolStatus, PredictionUnavailable> {
        let symbol = normalize_symbol(symbol);
        {
            let mut slots = self.slots.write().await;
            let slot = slots
                .get_mut(&symbol)
                .ok_or_else(|| PredictionUnavailable::new(&symbol, UnavailableReason::UnknownSymbol))?;
            match slot.state {
                ModelState::Ready => slot.state = ModelState::Retraining,
                ModelState::Retraining => {
                    return Err(PredictionUnavailable::new(
                        &symbol,
                        UnavailableReason::RetrainInProgress,
                    ));
                }
                ModelState::Unloaded => {
                    return Err(PredictionUnavailable::new(&symbol, UnavailableReason::NotReady));
                }
            }
        }

        info!("PredictionEngine: Retraining {}", symbol);
        match self.train_and_persist(&symbol).await {
            Ok(model) => {
                let mut slots = self.slots.write().await;
                let slot = slots
                    .get_mut(&symbol)
                    .ok_or_else(|| PredictionUnavailable::new(&symbol, UnavailableReason::UnknownSymbol))?;
                slot.active = Some(model);
                slot.version += 1;
                slot.state = ModelState::Ready;
                info!(
                    "PredictionEngine: {} retrained (version {})",
                    symbol, slot.version
                );
                Ok(slot.status(&symbol))
            }
            Err(failure) => {
                warn!(
                    "PredictionEngine: Retrain of {} failed, keeping previous model: {}",
                    symbol, failure.detail
                );
                let mut slots = self.slots.write().await;
                if let Some(slot) = slots.get_mut(&symbol) {
                    slot.state = ModelState::Ready;
                }
                Err(PredictionUnavailable::new(&symbol, failure.reason))
            }
        }
    }

    pub async fn state(&self, symbol: &str) -> Option<ModelState> {
        let symbol = normalize_symbol(symbol);
        self.slots.read().await.get(&symbol).map(|slot| slot.state)
    }

    pub async fn status(&self, symbol: &str) -> Option<SymbolStatus> {
        let symbol = normalize_symbol(symbol);
        self.slots
            .read()
            .await
            .get(&symbol)
            .map(|slot| slot.status(&symbol))
    }

    /// One entry per tracked symbol, including those that failed to resolve.
    pub async fn catalogue(&self) -> Vec<SymbolStatus> {
        let slots = self.slots.read().await;
        self.symbols
            .iter()
            .filter_map(|symbol| slots.get(symbol).map(|slot| slot.status(symbol)))
            .collect()
    }

    async fn active_model(&self, symbol: &str) -> Result<Arc<SymbolModel>, PredictionUnavailable> {
        let slots = self.slots.read().await;
        let slot = slots
            .get(symbol)
            .ok_or_else(|| PredictionUnavailable::new(symbol, UnavailableReason::UnknownSymbol))?;
        match (&slot.active, slot.state.can_serve()) {
            (Some(model), true) => Ok(Arc::clone(model)),
            _ => Err(PredictionUnavailable::new(symbol, UnavailableReason::NotReady)),
        }
    }

    async fn install(&self, symbol: &str, model: Arc<SymbolModel>) {
        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get_mut(symbol) {
            slot.active = Some(model);
            slot.version += 1;
            slot.state = ModelState::Ready;
            slot.resolving = false;
            slot.failure = None;
        }
    }

    async fn load_from_store(&self, symbol: &str) -> Result<SymbolModel, SymbolFailure> {
        let store = Arc::clone(&self.store);
        let key = symbol.to_string();
        let loaded = tokio::task::spawn_blocking(move || {
            if !store.exists(&key) {
                return Ok(None);
            }
            store.load(&key).map(Some)
        })
        .await
        .map_err(|e| {
            SymbolFailure::new(
                UnavailableReason::StoreCorruption,
                format!("load task failed: {}", e),
            )
        })?;

        let (model, scaler) = match loaded {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                return Err(SymbolFailure::new(
                    UnavailableReason::StoreCorruption,
                    "no stored artifacts",
                ));
            }
            Err(e) => {
                warn!("PredictionEngine: {}", e);
                return Err(SymbolFailure::from_forecast(&e));
            }
        };

        let expected = &self.settings.training;
        let incompatible = if !model.is_trained() {
            Some("stored model is untrained".to_string())
        } else if model.kind() != expected.model.kind {
            Some(format!(
                "stored model is {}, configured {}",
                model.kind(),
                expected.model.kind
            ))
        } else if model.lookback() != expected.lookback {
            Some(format!(
                "stored lookback {} differs from configured {}",
                model.lookback(),
                expected.lookback
            ))
        } else {
            None
        };
        if let Some(reason) = incompatible {
            warn!("PredictionEngine: Stored model for {} rejected: {}", symbol, reason);
            return Err(SymbolFailure::from_forecast(&ForecastError::StoreCorruption {
                symbol: symbol.to_string(),
                reason,
            }));
        }

        Ok(SymbolModel::restored(symbol, model, scaler))
    }

    async fn train_and_persist(&self, symbol: &str) -> Result<Arc<SymbolModel>, SymbolFailure> {
        let series = self
            .fetch_series(symbol, self.settings.training_history_days)
            .await?;
        info!(
            "PredictionEngine: Training {} on {} daily closes",
            symbol,
            series.len()
        );

        let permit = self.training_permits.acquire().await.map_err(|e| {
            SymbolFailure::new(
                UnavailableReason::TrainingFailed,
                format!("training pool closed: {}", e),
            )
        })?;
        let settings = self.settings.training.clone();
        let key = symbol.to_string();
        let trained = tokio::task::spawn_blocking(move || train_symbol_model(&key, &series, &settings))
            .await
            .map_err(|e| {
                SymbolFailure::new(
                    UnavailableReason::TrainingFailed,
                    format!("training task failed: {}", e),
                )
            })?
            .map_err(|e| SymbolFailure::from_forecast(&e))?;
        drop(permit);

        let model = Arc::new(trained);
        let store = Arc::clone(&self.store);
        let to_save = Arc::clone(&model);
        let key = symbol.to_string();
        match tokio::task::spawn_blocking(move || store.save(&key, to_save.model(), to_save.scaler()))
            .await
        {
            Ok(Ok(())) => debug!("PredictionEngine: Persisted model for {}", symbol),
            // The pair is still valid in memory; the next start retrains.
            Ok(Err(e)) => warn!(
                "PredictionEngine: Failed to persist model for {}: {:#}",
                symbol, e
            ),
            Err(e) => warn!("PredictionEngine: Persist task for {} failed: {}", symbol, e),
        }

        Ok(model)
    }

    async fn fetch_series(&self, symbol: &str, days: u32) -> Result<PriceSeries, SymbolFailure> {
        let timeout = self.settings.fetch_timeout;
        let fetch = self.provider.fetch_daily_closes(symbol, days);
        match tokio::time::timeout(timeout, fetch).await {
            Err(_) => {
                warn!(
                    "PredictionEngine: {} fetch for {} timed out after {:?}",
                    self.provider.name(),
                    symbol,
                    timeout
                );
                Err(SymbolFailure::new(
                    UnavailableReason::Timeout,
                    format!("fetch timed out after {:?}", timeout),
                ))
            }
            Ok(Err(e)) => {
                warn!(
                    "PredictionEngine: {} fetch for {} failed: {:#}",
                    self.provider.name(),
                    symbol,
                    e
                );
                Err(SymbolFailure::new(
                    UnavailableReason::NoData,
                    format!("fetch failed: {:#}", e),
                ))
            }
            Ok(Ok(Some(series))) if !series.is_empty() => Ok(series),
            Ok(Ok(_)) => Err(SymbolFailure::new(
                UnavailableReason::NoData,
                "provider returned no data",
            )),
        }
    }
}

/// Calendar days of recent data fetched for one inference: the lookback plus
/// margin for missing days, never less than a month.
pub fn recent_window_days(lookback: usize) -> u32 {
    let days = (lookback + lookback / 2 + 10).max(30);
    u32::try_from(days).unwrap_or(u32::MAX)
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
