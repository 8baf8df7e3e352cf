use bincode::{deserialize, serialize};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::{gbdt::GradientBoostedRegressor, scaler::StandardScaler};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to access model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode model artifact: {0}")]
    Encode(bincode::Error),
    #[error("failed to decode model artifact {path}: {source}")]
    Decode {
        path: PathBuf,
        source: bincode::Error,
    },
    #[error("unsupported artifact format version {found} (expected {FORMAT_VERSION})")]
    Version { found: u32 },
    #[error("model artifact is inconsistent: {0}")]
    Corrupt(String),
}

/// Everything the predictor needs to score a record the way the trainer saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub target: String,
    pub feature_columns: Vec<String>,
    pub scaler: StandardScaler,
    pub booster: GradientBoostedRegressor,
}

impl ModelArtifact {
    pub fn new(
        target: String,
        feature_columns: Vec<String>,
        scaler: StandardScaler,
        booster: GradientBoostedRegressor,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            target,
            feature_columns,
            scaler,
            booster,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        save_to_file(self, path.as_ref())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        let artifact: Self = load_from_file(path.as_ref())?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.version != FORMAT_VERSION {
            return Err(ArtifactError::Version {
                found: self.version,
            });
        }
        let width = self.feature_columns.len();
        if self.scaler.num_features() != width || self.booster.num_features() != width {
            return Err(ArtifactError::Corrupt(format!(
                "{} columns, scaler width {}, booster width {}",
                width,
                self.scaler.num_features(),
                self.booster.num_features()
            )));
        }
        if self.feature_columns.iter().any(|c| c == &self.target) {
            return Err(ArtifactError::Corrupt(format!(
                "target `{}` listed as a feature",
                self.target
            )));
        }
        if !self.booster.is_well_formed() {
            return Err(ArtifactError::Corrupt("malformed tree".to_string()));
        }
        Ok(())
    }
}

/// Writes through a temp file in the destination directory, then renames it into place.
pub fn save_to_file<T: Serialize>(value: &T, path: &Path) -> Result<(), ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    let encoded: Vec<u8> = serialize(value).map_err(ArtifactError::Encode)?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    file.write_all(&encoded).map_err(io_err)?;
    file.as_file().sync_all().map_err(io_err)?;
    file.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

pub fn load_from_file<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let mut buffer = Vec::new();
    File::open(path)
        .and_then(|mut file| file.read_to_end(&mut buffer))
        .map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    deserialize(&buffer).map_err(|source| ArtifactError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
