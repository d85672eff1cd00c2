use std::env;
use std::path::PathBuf;

/// Model artifact location
#[derive(Debug, Clone)]
pub struct StoreEnvConfig {
    pub model_dir: PathBuf,
}

impl Default for StoreEnvConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
        }
    }
}

impl StoreEnvConfig {
    pub fn from_env() -> Self {
        Self {
            model_dir: env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| Self::default().model_dir),
        }
    }
}
