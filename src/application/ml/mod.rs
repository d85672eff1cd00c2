pub mod gru_regressor;
pub mod linear_regressor;
pub mod predictor;
