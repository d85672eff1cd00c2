pub mod model_store;
pub mod prediction_engine;
pub mod symbol_model;
pub mod trainer;

pub use model_store::ModelStore;
pub use prediction_engine::{EngineSettings, PredictionEngine, ResolveOutcome, SymbolStatus};
pub use symbol_model::{SymbolModel, TrainingReport};
pub use trainer::TrainingSettings;
