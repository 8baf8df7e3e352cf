use std::path::Path;

use serde_json::{Map, Value};

use crate::{
    artifact::{ArtifactError, ModelArtifact},
    dataset::as_feature,
};

pub type FeatureRecord = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    #[error("{}", describe_mismatch(.missing, .unexpected))]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("feature `{column}` must be a number")]
    InvalidValue { column: String },
    #[error("model produced a non-finite prediction")]
    NonFinite,
}

fn describe_mismatch(missing: &[String], unexpected: &[String]) -> String {
    let mut parts = vec![];
    if !missing.is_empty() {
        parts.push(format!("missing features: {}", missing.join(", ")));
    }
    if !unexpected.is_empty() {
        parts.push(format!("unexpected features: {}", unexpected.join(", ")));
    }
    format!("record does not match the model schema ({})", parts.join("; "))
}

/// A fitted model that scores rows laid out in `feature_columns` order.
pub trait Regressor: Send + Sync {
    fn target(&self) -> &str;
    fn feature_columns(&self) -> &[String];
    fn predict_row(&self, row: &[f64]) -> f64;
}

impl Regressor for ModelArtifact {
    fn target(&self) -> &str {
        &self.target
    }

    fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let scaled = self.scaler.transform_row(row);
        self.booster.predict_row(&scaled)
    }
}

pub struct Predictor<M = ModelArtifact> {
    model: M,
}

impl Predictor<ModelArtifact> {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        ModelArtifact::load(path).map(Self::new)
    }
}

impl<M: Regressor> Predictor<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn predict(&self, record: &FeatureRecord) -> Result<f64, PredictError> {
        let row = self.feature_row(record)?;
        let prediction = self.model.predict_row(&row);
        if !prediction.is_finite() {
            return Err(PredictError::NonFinite);
        }
        Ok(prediction)
    }

    /// Drops the target field if present and lays the record out in training column order.
    pub fn feature_row(&self, record: &FeatureRecord) -> Result<Vec<f64>, PredictError> {
        let target = self.model.target();
        let columns = self.model.feature_columns();

        let missing: Vec<String> = columns
            .iter()
            .filter(|column| !record.contains_key(column.as_str()))
            .cloned()
            .collect();
        let unexpected: Vec<String> = record
            .keys()
            .filter(|key| key.as_str() != target && !columns.contains(*key))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(PredictError::SchemaMismatch {
                missing,
                unexpected,
            });
        }

        columns
            .iter()
            .map(|column| {
                as_feature(&record[column.as_str()]).ok_or_else(|| PredictError::InvalidValue {
                    column: column.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct WeightedSum {
        columns: Vec<String>,
        weights: Vec<f64>,
    }

    impl Regressor for WeightedSum {
        fn target(&self) -> &str {
            "Credit Score"
        }

        fn feature_columns(&self) -> &[String] {
            &self.columns
        }

        fn predict_row(&self, row: &[f64]) -> f64 {
            row.iter().zip(&self.weights).map(|(x, w)| x * w).sum()
        }
    }

    fn predictor() -> Predictor<WeightedSum> {
        Predictor::new(WeightedSum {
            columns: vec!["Income".to_string(), "Age".to_string()],
            weights: vec![0.01, 1.0],
        })
    }

    fn record(value: Value) -> FeatureRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_predict() {
        let p = predictor();
        let value = p.predict(&record(json!({"Income": 50000, "Age": 30}))).unwrap();
        assert_eq!(value, 530.0);
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let p = predictor();
        assert_eq!(
            p.feature_row(&record(json!({"Age": 30, "Income": 50000}))).unwrap(),
            vec![50000.0, 30.0]
        );
    }

    #[test]
    fn test_target_is_dropped() {
        let p = predictor();
        let with_target = record(json!({"Income": 50000, "Age": 30, "Credit Score": 700}));
        let without_target = record(json!({"Income": 50000, "Age": 30}));
        assert_eq!(
            p.predict(&with_target).unwrap(),
            p.predict(&without_target).unwrap()
        );
    }

    #[test]
    fn test_schema_mismatch() {
        let p = predictor();
        let err = p
            .predict(&record(json!({"Income": 50000, "Height": 180})))
            .unwrap_err();
        assert_eq!(
            err,
            PredictError::SchemaMismatch {
                missing: vec!["Age".to_string()],
                unexpected: vec!["Height".to_string()],
            }
        );
        assert_eq!(
            err.to_string(),
            "record does not match the model schema (missing features: Age; unexpected features: Height)"
        );
    }

    #[test]
    fn test_invalid_value() {
        let p = predictor();
        let err = p
            .predict(&record(json!({"Income": "lots", "Age": 30})))
            .unwrap_err();
        assert_eq!(
            err,
            PredictError::InvalidValue {
                column: "Income".to_string()
            }
        );
        assert!(p.predict(&record(json!({"Income": null, "Age": 30}))).is_err());
    }

    #[test]
    fn test_non_finite_output() {
        let p = Predictor::new(WeightedSum {
            columns: vec!["Income".to_string()],
            weights: vec![f64::INFINITY],
        });
        assert_eq!(
            p.predict(&record(json!({"Income": 1}))),
            Err(PredictError::NonFinite)
        );
    }
}
