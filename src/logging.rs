use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level `{level}`: {message}")]
    InvalidLevel { level: String, message: String },
    #[error("failed to install global tracing subscriber: {0}")]
    SetGlobal(String),
}

/// `RUST_LOG` wins over the configured level.
pub fn filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|err| LoggingError::InvalidLevel {
        level: level.to_string(),
        message: err.to_string(),
    })
}

pub fn init(level: &str) -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level)?)
        .try_init()
        .map_err(|err| LoggingError::SetGlobal(err.to_string()))
}
