// Market data domain
pub mod market;

// Windowing, scaling and prediction records
pub mod forecasting;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
