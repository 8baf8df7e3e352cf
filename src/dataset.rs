use std::fs;
use std::path::{Path, PathBuf};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse dataset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("dataset must be an array of records or an object of columns")]
    UnsupportedLayout,
    #[error("dataset contains no records")]
    Empty,
    #[error("target column `{0}` not found")]
    MissingTarget(String),
    #[error("record {row} is missing column `{column}`")]
    MissingColumn { row: usize, column: String },
    #[error("record {row} has unexpected column `{column}`")]
    UnexpectedColumn { row: usize, column: String },
    #[error("record {row} has a non-numeric value for column `{column}`")]
    NonNumeric { row: usize, column: String },
    #[error("test size must be in (0, 1), got {0}")]
    InvalidTestSize(f64),
    #[error("dataset with {0} records is too small to split")]
    TooSmall(usize),
}

/// Numeric view of a JSON feature value. Booleans count as 0/1.
pub fn as_feature(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Labeled rows with the target separated from the features.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub target: String,
    pub feature_columns: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Dataset,
    pub holdout: Dataset,
}

impl Dataset {
    pub fn load<P: AsRef<Path>>(path: P, target: &str) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DatasetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content, target)
    }

    pub fn from_json_str(content: &str, target: &str) -> Result<Self, DatasetError> {
        let value: Value = serde_json::from_str(content)?;
        let records = match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    _ => Err(DatasetError::UnsupportedLayout),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Value::Object(columns) => columns_to_records(columns)?,
            _ => return Err(DatasetError::UnsupportedLayout),
        };
        Self::from_records(&records, target)
    }

    /// Column order follows the key order of the first record.
    pub fn from_records(records: &[Record], target: &str) -> Result<Self, DatasetError> {
        let first = records.first().ok_or(DatasetError::Empty)?;
        if !first.contains_key(target) {
            return Err(DatasetError::MissingTarget(target.to_string()));
        }
        let feature_columns: Vec<String> = first
            .keys()
            .filter(|key| key.as_str() != target)
            .cloned()
            .collect();

        let mut features = Vec::with_capacity(records.len());
        let mut labels = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            if let Some(column) = record
                .keys()
                .find(|key| key.as_str() != target && !feature_columns.contains(*key))
            {
                return Err(DatasetError::UnexpectedColumn {
                    row,
                    column: column.clone(),
                });
            }
            let label = cell(record, row, target)?;
            let values = feature_columns
                .iter()
                .map(|column| cell(record, row, column))
                .collect::<Result<Vec<_>, _>>()?;
            features.push(values);
            labels.push(label);
        }

        Ok(Self {
            target: target.to_string(),
            feature_columns,
            features,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.feature_columns.len()
    }

    /// Shuffles row indices with a seeded RNG; the first `ceil(test_size * n)`
    /// go to the holdout, the remainder to the training split.
    pub fn split(&self, test_size: f64, seed: u64) -> Result<TrainTestSplit, DatasetError> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(DatasetError::InvalidTestSize(test_size));
        }
        let n = self.len();
        let n_holdout = (test_size * n as f64).ceil() as usize;
        if n_holdout == 0 || n_holdout >= n {
            return Err(DatasetError::TooSmall(n));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        let (holdout, train) = indices.split_at(n_holdout);

        Ok(TrainTestSplit {
            train: self.subset(train),
            holdout: self.subset(holdout),
        })
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            target: self.target.clone(),
            feature_columns: self.feature_columns.clone(),
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

fn cell(record: &Record, row: usize, column: &str) -> Result<f64, DatasetError> {
    let value = record.get(column).ok_or_else(|| DatasetError::MissingColumn {
        row,
        column: column.to_string(),
    })?;
    as_feature(value).ok_or_else(|| DatasetError::NonNumeric {
        row,
        column: column.to_string(),
    })
}

// {"col": {"0": v, "1": v}} or {"col": [v, v]}
fn columns_to_records(columns: Record) -> Result<Vec<Record>, DatasetError> {
    let mut records: Vec<Record> = Vec::new();
    let mut row_keys: Option<Vec<String>> = None;
    let mut column_len: Option<usize> = None;

    for (column, values) in columns {
        match values {
            Value::Array(values) => {
                let expected = *column_len.get_or_insert(values.len());
                if row_keys.is_some() || values.len() != expected {
                    return Err(DatasetError::UnsupportedLayout);
                }
                if records.is_empty() {
                    records.resize_with(values.len(), Record::new);
                }
                for (record, value) in records.iter_mut().zip(values) {
                    record.insert(column.clone(), value);
                }
            }
            Value::Object(mut values) => {
                let keys = match row_keys.clone() {
                    Some(keys) => keys,
                    None if column_len.is_none() => {
                        let keys: Vec<String> = values.keys().cloned().collect();
                        records.resize_with(keys.len(), Record::new);
                        row_keys = Some(keys.clone());
                        keys
                    }
                    None => return Err(DatasetError::UnsupportedLayout),
                };
                if values.len() != keys.len() {
                    return Err(DatasetError::UnsupportedLayout);
                }
                for (record, key) in records.iter_mut().zip(&keys) {
                    let value = values.remove(key).ok_or(DatasetError::UnsupportedLayout)?;
                    record.insert(column.clone(), value);
                }
            }
            _ => return Err(DatasetError::UnsupportedLayout),
        }
    }
    Ok(records)
}
