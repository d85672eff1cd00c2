use chrono::Utc;
use cryptocast::application::forecasting::{
    EngineSettings, ModelStore, PredictionEngine, ResolveOutcome, TrainingSettings,
};
use cryptocast::application::ml::predictor::ModelSettings;
use cryptocast::domain::errors::UnavailableReason;
use cryptocast::domain::forecasting::{ModelKind, ModelState};
use cryptocast::domain::market::price_series::PriceSeries;
use cryptocast::infrastructure::mock::MockPriceHistoryProvider;
use cryptocast::infrastructure::persistence::FileModelStore;
use cryptocast::infrastructure::repositories::InMemoryModelStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_dir() -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("cryptocast_engine_{}_{}", std::process::id(), n))
}

fn linear_settings(symbols: &[&str], lookback: usize) -> EngineSettings {
    EngineSettings {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        training: TrainingSettings {
            lookback,
            model: ModelSettings {
                kind: ModelKind::Linear,
                ..ModelSettings::default()
            },
            holdout_ratio: 0.2,
        },
        training_history_days: 730,
        fetch_timeout: Duration::from_secs(5),
        max_parallel_training: 2,
    }
}

fn series_ending_today(symbol: &str, closes: &[f64]) -> PriceSeries {
    PriceSeries::daily_ending(symbol, Utc::now().date_naive(), closes).unwrap()
}

fn wavy(symbol: &str, n: usize, base: f64) -> PriceSeries {
    let closes: Vec<f64> = (0..n)
        .map(|i| {
            // Period-11 jitter keeps lagged windows linearly independent.
            let jitter = ((i * 37) % 11) as f64 - 5.0;
            base + base * 0.05 * (i as f64 * 0.3).sin() + i as f64 * base * 0.001 + jitter * base * 0.002
        })
        .collect();
    series_ending_today(symbol, &closes)
}

#[tokio::test]
async fn test_short_history_leaves_symbol_unloaded() {
    // Three days of data against a 60-day lookback.
    let provider = Arc::new(
        MockPriceHistoryProvider::new().with_series(series_ending_today("BTC", &[95_000.0, 96_500.0, 97_100.0])),
    );
    let mut settings = linear_settings(&["BTC"], 60);
    settings.training.model.kind = ModelKind::Recurrent;
    let engine = PredictionEngine::new(settings, provider.clone(), Arc::new(InMemoryModelStore::new()));

    let results = engine.resolve_all().await;
    assert_eq!(results.len(), 1);
    let err = results[0].1.as_ref().unwrap_err();
    assert_eq!(err.reason, UnavailableReason::InsufficientData);

    assert_eq!(engine.state("BTC").await, Some(ModelState::Unloaded));
    let catalogue = engine.catalogue().await;
    let failure = catalogue[0].failure.as_ref().unwrap();
    assert_eq!(failure.reason, UnavailableReason::InsufficientData);
    assert!(failure.detail.contains("61"));

    let err = engine.predict_price("BTC").await.unwrap_err();
    assert_eq!(err.symbol, "BTC");
    assert_eq!(err.reason, UnavailableReason::NotReady);

    // No automatic retry for the lifetime of the engine.
    let fetches = provider.fetch_count();
    assert!(engine.resolve_symbol("BTC").await.is_err());
    assert_eq!(provider.fetch_count(), fetches);
}

#[tokio::test]
async fn test_flat_recent_data_still_gives_a_well_formed_prediction() {
    let training = wavy("ETH", 300, 3_400.0);
    let last_training_price = training.latest_close().unwrap();
    let provider = Arc::new(MockPriceHistoryProvider::new().with_series(training));
    let engine = PredictionEngine::new(
        linear_settings(&["ETH"], 5),
        provider.clone(),
        Arc::new(InMemoryModelStore::new()),
    );
    assert_eq!(
        engine.resolve_symbol("ETH").await.unwrap(),
        ResolveOutcome::Trained
    );

    provider
        .set_series(series_ending_today("ETH", &[last_training_price; 40]))
        .await;
    let result = engine.predict_price("ETH").await.unwrap();

    assert_eq!(result.current_price, last_training_price);
    assert!(result.predicted_price.is_finite());
    assert!(result.change_percent.is_finite());
    let expected = (result.predicted_price - result.current_price) / result.current_price * 100.0;
    assert!((result.change_percent - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_torn_store_entry_triggers_retraining() {
    let provider = Arc::new(MockPriceHistoryProvider::new().with_series(wavy("BTC", 200, 96_000.0)));
    let store = Arc::new(InMemoryModelStore::new());
    store.tear("BTC");
    let engine = PredictionEngine::new(linear_settings(&["BTC"], 5), provider, store.clone());

    assert_eq!(
        engine.resolve_symbol("BTC").await.unwrap(),
        ResolveOutcome::Trained
    );
    assert_eq!(store.save_count(), 1);
    assert!(store.load("BTC").is_ok());
}

#[tokio::test]
async fn test_failed_save_still_serves_the_trained_model() {
    let provider = Arc::new(MockPriceHistoryProvider::new().with_series(wavy("SOL", 200, 180.0)));
    let store = Arc::new(InMemoryModelStore::new());
    store.fail_saves(true);
    let engine = PredictionEngine::new(linear_settings(&["SOL"], 5), provider, store.clone());

    assert!(engine.resolve_symbol("SOL").await.is_ok());
    assert!(!store.exists("SOL"));
    assert!(engine.predict_price("SOL").await.is_ok());
}

#[tokio::test]
async fn test_restart_loads_stored_pair_instead_of_training() {
    let dir = temp_dir();
    let history = wavy("ADA", 250, 0.95);

    let provider = Arc::new(MockPriceHistoryProvider::new().with_series(history.clone()));
    let first = PredictionEngine::new(
        linear_settings(&["ADA"], 5),
        provider,
        Arc::new(FileModelStore::new(&dir)),
    );
    assert_eq!(first.resolve_symbol("ADA").await.unwrap(), ResolveOutcome::Trained);
    let before = first.predict_price("ADA").await.unwrap();

    let provider = Arc::new(MockPriceHistoryProvider::new().with_series(history));
    let second = PredictionEngine::new(
        linear_settings(&["ADA"], 5),
        provider.clone(),
        Arc::new(FileModelStore::new(&dir)),
    );
    assert_eq!(second.resolve_symbol("ADA").await.unwrap(), ResolveOutcome::Loaded);
    // Loading needs no history fetch.
    assert_eq!(provider.fetch_count(), 0);

    let after = second.predict_price("ADA").await.unwrap();
    assert!((after.predicted_price - before.predicted_price).abs() < 1e-9);
    assert!(second.status("ADA").await.unwrap().report.is_none());

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_stored_model_with_other_lookback_is_retrained() {
    let dir = temp_dir();
    let history = wavy("DOT", 250, 7.0);

    let first = PredictionEngine::new(
        linear_settings(&["DOT"], 5),
        Arc::new(MockPriceHistoryProvider::new().with_series(history.clone())),
        Arc::new(FileModelStore::new(&dir)),
    );
    first.resolve_symbol("DOT").await.unwrap();

    let second = PredictionEngine::new(
        linear_settings(&["DOT"], 7),
        Arc::new(MockPriceHistoryProvider::new().with_series(history)),
        Arc::new(FileModelStore::new(&dir)),
    );
    assert_eq!(second.resolve_symbol("DOT").await.unwrap(), ResolveOutcome::Trained);
    assert_eq!(second.status("DOT").await.unwrap().lookback, Some(7));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_retrain_swaps_pair_and_keeps_old_one_on_failure() {
    let provider = Arc::new(MockPriceHistoryProvider::new().with_series(wavy("LINK", 200, 22.0)));
    let engine = PredictionEngine::new(
        linear_settings(&["LINK"], 5),
        provider.clone(),
        Arc::new(InMemoryModelStore::new()),
    );
    engine.resolve_symbol("LINK").await.unwrap();

    let status = engine.retrain("link").await.unwrap();
    assert_eq!(status.state, ModelState::Ready);
    assert_eq!(status.version, 2);

    // A constant series cannot be scaled, so this retrain fails.
    provider
        .set_series(series_ending_today("LINK", &[22.0; 120]))
        .await;
    let err = engine.retrain("LINK").await.unwrap_err();
    assert_eq!(err.reason, UnavailableReason::DegenerateRange);

    let status = engine.status("LINK").await.unwrap();
    assert_eq!(status.state, ModelState::Ready);
    assert_eq!(status.version, 2);
    assert!(engine.predict_price("LINK").await.is_ok());
}

#[tokio::test]
async fn test_concurrent_retrain_is_rejected_while_predictions_continue() {
    let provider = Arc::new(
        MockPriceHistoryProvider::new()
            .with_series(wavy("UNI", 200, 12.0))
            .with_delay(Duration::from_millis(200)),
    );
    let engine = PredictionEngine::new(
        linear_settings(&["UNI"], 5),
        provider,
        Arc::new(InMemoryModelStore::new()),
    );
    engine.resolve_symbol("UNI").await.unwrap();

    let (first, (second, prediction)) = tokio::join!(engine.retrain("UNI"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.state("UNI").await, Some(ModelState::Retraining));
        (engine.retrain("UNI").await, engine.predict_price("UNI").await)
    });

    assert!(first.is_ok());
    assert_eq!(second.unwrap_err().reason, UnavailableReason::RetrainInProgress);
    assert!(prediction.is_ok());
    assert_eq!(engine.status("UNI").await.unwrap().version, 2);
}

#[tokio::test]
async fn test_stalled_fetch_is_reported_as_timeout() {
    let provider = Arc::new(
        MockPriceHistoryProvider::new()
            .with_series(wavy("LTC", 200, 100.0))
            .with_delay(Duration::from_millis(500)),
    );
    let mut settings = linear_settings(&["LTC"], 5);
    settings.fetch_timeout = Duration::from_millis(50);
    let engine = PredictionEngine::new(settings, provider, Arc::new(InMemoryModelStore::new()));

    let err = engine.resolve_symbol("LTC").await.unwrap_err();
    assert_eq!(err.reason, UnavailableReason::Timeout);

    let err = engine.get_historical_data("LTC", 10).await.unwrap_err();
    assert_eq!(err.reason, UnavailableReason::Timeout);
}

#[tokio::test]
async fn test_catalogue_covers_every_symbol() {
    let provider = Arc::new(
        MockPriceHistoryProvider::new()
            .with_series(wavy("BTC", 200, 96_000.0))
            .with_series(wavy("ETH", 200, 3_400.0)),
    );
    let engine = PredictionEngine::new(
        linear_settings(&["BTC", "ETH", "MATIC"], 5),
        provider,
        Arc::new(InMemoryModelStore::new()),
    );
    engine.resolve_all().await;

    let catalogue = engine.catalogue().await;
    let symbols: Vec<&str> = catalogue.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BTC", "ETH", "MATIC"]);
    assert_eq!(catalogue[0].state, ModelState::Ready);
    assert_eq!(catalogue[1].state, ModelState::Ready);
    assert_eq!(catalogue[2].state, ModelState::Unloaded);
    assert_eq!(
        catalogue[2].failure.as_ref().unwrap().reason,
        UnavailableReason::NoData
    );
}

#[tokio::test]
async fn test_recurrent_engine_end_to_end() {
    let provider = Arc::new(MockPriceHistoryProvider::new().with_series(wavy("AVAX", 160, 40.0)));
    let settings = EngineSettings {
        symbols: vec!["AVAX".to_string()],
        training: TrainingSettings {
            lookback: 10,
            model: ModelSettings {
                kind: ModelKind::Recurrent,
                epochs: 5,
                batch_size: 16,
                hidden_units: 6,
                layers: 2,
                dropout: 0.1,
                learning_rate: 0.01,
                seed: 7,
            },
            holdout_ratio: 0.2,
        },
        training_history_days: 730,
        fetch_timeout: Duration::from_secs(5),
        max_parallel_training: 1,
    };
    let engine = PredictionEngine::new(settings, provider, Arc::new(InMemoryModelStore::new()));

    assert_eq!(engine.resolve_symbol("AVAX").await.unwrap(), ResolveOutcome::Trained);
    let status = engine.status("AVAX").await.unwrap();
    assert_eq!(status.model.as_deref(), Some("GRU Sequence Regressor"));
    assert!(status.report.unwrap().final_loss.is_some());

    // Stochastic fit: only a wide band is asserted.
    let result = engine.predict_price("AVAX").await.unwrap();
    assert!(result.predicted_price > result.current_price * 0.5);
    assert!(result.predicted_price < result.current_price * 1.5);
}

#[tokio::test]
async fn test_reshaped_recurrent_weights_are_retrained_not_served() {
    let dir = temp_dir();
    let history = wavy("AVAX", 160, 40.0);
    let settings = || EngineSettings {
        symbols: vec!["AVAX".to_string()],
        training: TrainingSettings {
            lookback: 10,
            model: ModelSettings {
                kind: ModelKind::Recurrent,
                epochs: 2,
                batch_size: 16,
                hidden_units: 4,
                layers: 2,
                dropout: 0.0,
                learning_rate: 0.01,
                seed: 7,
            },
            holdout_ratio: 0.2,
        },
        training_history_days: 730,
        fetch_timeout: Duration::from_secs(5),
        max_parallel_training: 1,
    };

    let first = PredictionEngine::new(
        settings(),
        Arc::new(MockPriceHistoryProvider::new().with_series(history.clone())),
        Arc::new(FileModelStore::new(&dir)),
    );
    assert_eq!(first.resolve_symbol("AVAX").await.unwrap(), ResolveOutcome::Trained);

    // Valid JSON, but the output head no longer matches the hidden size.
    let store = FileModelStore::new(&dir);
    let path = store.model_path("AVAX");
    let mut artifact: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    artifact["model"]["head_w"] = serde_json::json!({"v": 1, "dim": [1], "data": [0.5]});
    std::fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();
    assert!(store.load("AVAX").is_err());

    let second = PredictionEngine::new(
        settings(),
        Arc::new(MockPriceHistoryProvider::new().with_series(history)),
        Arc::new(FileModelStore::new(&dir)),
    );
    assert_eq!(second.resolve_symbol("AVAX").await.unwrap(), ResolveOutcome::Trained);
    assert!(second.predict_price("AVAX").await.unwrap().predicted_price.is_finite());
    assert!(store.load("AVAX").is_ok());

    std::fs::remove_dir_all(&dir).ok();
}
