//! Client for fetching generated Solidity verifiers from the Sindri
//! circuit service.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

pub const DEFAULT_API_URL: &str = "https://sindri.app/api/v1";
pub const API_KEY_ENV: &str = "SINDRI_API_KEY";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;
const MAX_ERROR_BYTES: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("API key not set; export {0}")]
    MissingApiKey(String),
    #[error("circuit identifier is empty")]
    EmptyCircuitId,
    #[error("circuit identifier `{0}` is not a single path segment")]
    InvalidCircuitId(String),
    #[error("API key rejected (HTTP {0})")]
    Unauthorized(u16),
    #[error("circuit {0} not found")]
    CircuitNotFound(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("no verifier source returned for circuit {0}")]
    EmptyContract(String),
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Deserialize)]
struct SmartContractVerifierResponse {
    #[serde(default)]
    contract_code: Option<String>,
}

pub struct VerifierClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl VerifierClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, FetchError> {
        if api_key.trim().is_empty() {
            return Err(FetchError::MissingApiKey(API_KEY_ENV.to_string()));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .build();
        Ok(Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
        })
    }

    /// Reads the API key from `var`; an unset or blank variable is an error.
    pub fn from_env(base_url: &str, var: &str) -> Result<Self, FetchError> {
        let api_key = std::env::var(var).unwrap_or_default();
        Self::new(base_url, &api_key).map_err(|err| match err {
            FetchError::MissingApiKey(_) => FetchError::MissingApiKey(var.to_string()),
            other => other,
        })
    }

    pub fn fetch_smart_contract_verifier(&self, circuit_id: &str) -> Result<String, FetchError> {
        let circuit_id = circuit_id.trim();
        if circuit_id.is_empty() {
            return Err(FetchError::EmptyCircuitId);
        }
        if circuit_id
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace())
        {
            return Err(FetchError::InvalidCircuitId(circuit_id.to_string()));
        }
        let url = format!(
            "{}/circuit/{}/smart_contract_verifier",
            self.base_url, circuit_id
        );
        let request = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .set("Authorization", &format!("Bearer {}", self.api_key));

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = read_body_limited(response, MAX_ERROR_BYTES).unwrap_or_else(|err| err);
                return Err(map_status_error(code, circuit_id, body));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(FetchError::Transport(err.to_string()));
            }
        };

        let body =
            read_body_limited(response, MAX_RESPONSE_BYTES).map_err(FetchError::InvalidResponse)?;
        let parsed: SmartContractVerifierResponse = serde_json::from_str(&body)
            .map_err(|err| FetchError::InvalidResponse(err.to_string()))?;
        match parsed.contract_code {
            Some(code) if !code.is_empty() => Ok(code),
            _ => Err(FetchError::EmptyContract(circuit_id.to_string())),
        }
    }
}

fn map_status_error(code: u16, circuit_id: &str, body: String) -> FetchError {
    match code {
        401 | 403 => FetchError::Unauthorized(code),
        404 => FetchError::CircuitNotFound(circuit_id.to_string()),
        _ => FetchError::Status { status: code, body },
    }
}

fn read_body_limited(response: ureq::Response, max_bytes: usize) -> Result<String, String> {
    let mut limited = response.into_reader().take(max_bytes as u64 + 1);
    let mut bytes = Vec::new();
    limited
        .read_to_end(&mut bytes)
        .map_err(|err| err.to_string())?;
    if bytes.len() > max_bytes {
        return Err(format!("response exceeded {max_bytes} bytes"));
    }
    String::from_utf8(bytes).map_err(|err| err.to_string())
}

/// Replaces `path` with `source` atomically; on error the old file is left untouched.
pub fn write_verifier(path: &Path, source: &str) -> Result<(), FetchError> {
    let write_err = |source| FetchError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    file.write_all(source.as_bytes()).map_err(write_err)?;
    file.as_file().sync_all().map_err(write_err)?;
    file.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Fetch then write; nothing touches `path` unless the fetch succeeded.
pub fn fetch_and_write(
    client: &VerifierClient,
    circuit_id: &str,
    path: &Path,
) -> Result<usize, FetchError> {
    info!("Fetching smart contract verifier for circuit {}", circuit_id);
    let source = client.fetch_smart_contract_verifier(circuit_id)?;
    write_verifier(path, &source)?;
    info!("Wrote {} bytes to {}", source.len(), path.display());
    Ok(source.len())
}
