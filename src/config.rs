//! Configuration file support.
//!
//! Every section is optional and falls back to the defaults below; command
//! line flags are applied on top by the binary.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 5001
//! model_path = "model/credit_score_model.bin"
//! allowed_origins = ["*"]
//!
//! [training]
//! dataset_path = "nigeria_fintech_with_scaled_credit_scores.json"
//! model_path = "model/credit_score_model.bin"
//! target = "Credit Score"
//! test_size = 0.2
//! seed = 42
//!
//! [training.booster]
//! n_estimators = 100
//! learning_rate = 0.3
//! max_depth = 6
//!
//! [verifier]
//! api_url = "https://sindri.app/api/v1"
//! circuit_id = "530bd741-af55-4c4b-9dc2-71e8b962bb43"
//! output_path = "Verifier.sol"
//! api_key_env = "SINDRI_API_KEY"
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::gbdt::BoosterParams;

pub const DEFAULT_MODEL_PATH: &str = "model/credit_score_model.bin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub training: TrainingConfig,
    pub verifier: VerifierConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub model_path: PathBuf,
    /// `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5001,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub dataset_path: PathBuf,
    pub model_path: PathBuf,
    pub target: String,
    pub test_size: f64,
    pub seed: u64,
    pub booster: BoosterParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("nigeria_fintech_with_scaled_credit_scores.json"),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            target: "Credit Score".to_string(),
            test_size: 0.2,
            seed: 42,
            booster: BoosterParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub api_url: String,
    pub circuit_id: String,
    pub output_path: PathBuf,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            api_url: crate::verifier::DEFAULT_API_URL.to_string(),
            circuit_id: "530bd741-af55-4c4b-9dc2-71e8b962bb43".to_string(),
            output_path: PathBuf::from("Verifier.sol"),
            api_key_env: crate::verifier::API_KEY_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.server.port == 0 {
            return invalid("server.port must be non-zero".into());
        }
        for origin in &self.server.allowed_origins {
            if origin != "*" && !(origin.starts_with("http://") || origin.starts_with("https://")) {
                return invalid(format!("server.allowed_origins: invalid origin `{origin}`"));
            }
        }
        let test_size = self.training.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            return invalid(format!("training.test_size must be in (0, 1), got {test_size}"));
        }
        if self.training.target.is_empty() {
            return invalid("training.target must not be empty".into());
        }
        self.training
            .booster
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("training.booster: {e}")))?;
        if self.verifier.circuit_id.trim().is_empty() {
            return invalid("verifier.circuit_id must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
