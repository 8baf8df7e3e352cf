pub mod artifact;
pub mod config;
pub mod dataset;
pub mod gbdt;
pub mod logging;
pub mod predictor;
pub mod scaler;
pub mod server;
pub mod trainer;
pub mod verifier;

// Trainer, Predictor, VerifierFetcher
//
// 1. Trainer (offline)
// Dataset -> TrainTestSplit
// Train split -> StandardScaler
// Scaled train split -> GradientBoostedRegressor
// Columns, Scaler, Regressor -> ModelArtifact -> file
//
// 2. Predictor (service)
// file -> ModelArtifact -> Predictor
// FeatureRecord - target -> row (training column order)
// row -> Scaler -> Regressor -> prediction
//
// 3. VerifierFetcher (one-shot)
// API key, circuit id -> Solidity verifier source -> file
