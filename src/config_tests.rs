use crate::config::{Config, DataSource};
use crate::domain::forecasting::ModelKind;
use std::env;
use std::sync::Mutex;
use std::sync::OnceLock;

// Global lock to prevent race conditions when modifying environment variables in tests
static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn get_env_lock() -> &'static Mutex<()> {
    ENV_LOCK.get_or_init(|| Mutex::new(()))
}

const KEYS: &[&str] = &[
    "DATA_SOURCE",
    "YAHOO_CHART_URL",
    "QUOTE_CURRENCY",
    "CSV_DATA_DIR",
    "FETCH_TIMEOUT_SECS",
    "SYMBOLS",
    "MODEL_KIND",
    "LOOKBACK_DAYS",
    "TRAINING_HISTORY_DAYS",
    "TRAINING_EPOCHS",
    "BATCH_SIZE",
    "HIDDEN_UNITS",
    "RECURRENT_LAYERS",
    "DROPOUT",
    "LEARNING_RATE",
    "TRAINING_SEED",
    "HOLDOUT_RATIO",
    "TRAINING_WORKERS",
    "MODEL_DIR",
];

fn clear_env() {
    for key in KEYS {
        // SAFETY: tests touching the environment hold ENV_LOCK.
        unsafe { env::remove_var(key) };
    }
}

fn set(key: &str, value: &str) {
    // SAFETY: tests touching the environment hold ENV_LOCK.
    unsafe { env::set_var(key, value) };
}

#[test]
fn test_config_defaults() {
    let _guard = get_env_lock().lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let config = Config::from_env().unwrap();

    assert_eq!(config.data_source.source, DataSource::Mock);
    assert_eq!(config.forecast.model_kind, ModelKind::Recurrent);
    assert_eq!(config.forecast.lookback_days, 60);
    assert_eq!(config.forecast.training_history_days, 730);
    assert_eq!(config.forecast.symbols[0], "BTC");
    assert_eq!(config.store.model_dir.to_str(), Some("models"));

    let settings = config.engine_settings();
    assert_eq!(settings.training.lookback, 60);
    assert_eq!(settings.training.model.epochs, 25);
    assert_eq!(settings.training.model.batch_size, 32);
    assert_eq!(settings.fetch_timeout.as_secs(), 30);
}

#[test]
fn test_linear_model_defaults_to_short_lookback() {
    let _guard = get_env_lock().lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    set("MODEL_KIND", "linear");
    set("SYMBOLS", "eth, btc ,eth");
    set("DATA_SOURCE", "csv");
    set("CSV_DATA_DIR", "/tmp/prices");

    let config = Config::from_env().unwrap();

    assert_eq!(config.forecast.model_kind, ModelKind::Linear);
    assert_eq!(config.forecast.lookback_days, 5);
    assert_eq!(config.forecast.symbols, vec!["ETH", "BTC"]);
    assert_eq!(config.data_source.source, DataSource::Csv);
    assert_eq!(config.data_source.csv_dir.to_str(), Some("/tmp/prices"));

    clear_env();
}

#[test]
fn test_explicit_lookback_wins() {
    let _guard = get_env_lock().lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    set("MODEL_KIND", "gru");
    set("LOOKBACK_DAYS", "30");
    set("TRAINING_EPOCHS", "5");

    let config = Config::from_env().unwrap();
    assert_eq!(config.forecast.lookback_days, 30);
    assert_eq!(config.engine_settings().training.model.epochs, 5);

    clear_env();
}

#[test]
fn test_invalid_values_fail_with_context() {
    let _guard = get_env_lock().lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    set("BATCH_SIZE", "many");
    let err = Config::from_env().unwrap_err();
    assert!(format!("{:#}", err).contains("BATCH_SIZE"));

    clear_env();
    set("DATA_SOURCE", "carrier-pigeon");
    assert!(Config::from_env().is_err());

    clear_env();
    set("DROPOUT", "1.5");
    assert!(Config::from_env().is_err());

    clear_env();
}
