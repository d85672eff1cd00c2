// Per-symbol model lifecycle and prediction pipeline
pub mod forecasting;

// Sequence regressors
pub mod ml;
