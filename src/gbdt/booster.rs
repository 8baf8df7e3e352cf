use serde::{Deserialize, Serialize};

use crate::gbdt::tree::{Tree, TreeBuilder, TreeParams};

#[derive(Debug, thiserror::Error)]
pub enum FitError {
    #[error("cannot fit on an empty training set")]
    Empty,
    #[error("{rows} feature rows but {labels} labels")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("row {row} has {found} features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("training data contains a non-finite value at row {0}")]
    NonFinite(usize),
    #[error("invalid booster parameter: {0}")]
    InvalidParams(String),
}

/// Hyperparameters, defaulting to XGBoost's regressor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
        }
    }
}

impl BoosterParams {
    pub fn validate(&self) -> Result<(), FitError> {
        let invalid = |msg: &str| Err(FitError::InvalidParams(msg.to_string()));
        if self.n_estimators == 0 {
            return invalid("n_estimators must be at least 1");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return invalid("learning_rate must be positive");
        }
        if !(self.min_child_weight >= 0.0) {
            return invalid("min_child_weight must be non-negative");
        }
        if !(self.reg_lambda >= 0.0) {
            return invalid("reg_lambda must be non-negative");
        }
        if !(self.gamma >= 0.0) {
            return invalid("gamma must be non-negative");
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_child_weight: self.min_child_weight,
            reg_lambda: self.reg_lambda,
            gamma: self.gamma,
            learning_rate: self.learning_rate,
        }
    }
}

/// Squared-error gradient boosting over second-order regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    num_features: usize,
    base_score: f64,
    trees: Vec<Tree>,
}

impl GradientBoostedRegressor {
    pub fn new(num_features: usize, base_score: f64, trees: Vec<Tree>) -> Self {
        Self {
            num_features,
            base_score,
            trees,
        }
    }

    pub fn fit(rows: &[Vec<f64>], labels: &[f64], params: &BoosterParams) -> Result<Self, FitError> {
        params.validate()?;
        if rows.is_empty() {
            return Err(FitError::Empty);
        }
        if rows.len() != labels.len() {
            return Err(FitError::LengthMismatch {
                rows: rows.len(),
                labels: labels.len(),
            });
        }
        let num_features = rows[0].len();
        for (row, (values, label)) in rows.iter().zip(labels).enumerate() {
            if values.len() != num_features {
                return Err(FitError::RaggedRow {
                    row,
                    expected: num_features,
                    found: values.len(),
                });
            }
            if !label.is_finite() || values.iter().any(|x| !x.is_finite()) {
                return Err(FitError::NonFinite(row));
            }
        }

        let base_score = labels.iter().sum::<f64>() / labels.len() as f64;
        let mut predictions = vec![base_score; rows.len()];
        let hess = vec![1.0; rows.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let grad: Vec<f64> = predictions
                .iter()
                .zip(labels)
                .map(|(pred, label)| pred - label)
                .collect();
            let tree = TreeBuilder::new(params.tree_params(), rows, &grad, &hess).build();
            for (pred, row) in predictions.iter_mut().zip(rows) {
                *pred += tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self::new(num_features, base_score, trees))
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn is_well_formed(&self) -> bool {
        self.base_score.is_finite() && self.trees.iter().all(|t| t.is_well_formed(self.num_features))
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + tree.predict(row))
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

pub fn rmse(predictions: &[f64], labels: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let sse: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(p, y)| (p - y) * (p - y))
        .sum();
    (sse / labels.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::tree::Node;

    fn synthetic(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![(i % 17) as f64, ((i * 7) % 11) as f64])
            .collect();
        let labels = rows.iter().map(|r| 3.0 * r[0] - 2.0 * r[1] + 5.0).collect();
        (rows, labels)
    }

    #[test]
    fn test_stump_model() {
        let model = GradientBoostedRegressor::new(
            1,
            0.5,
            vec![Tree::new(vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 1,
                    right: 2,
                },
                Node::Leaf(-1.0),
                Node::Leaf(1.0),
            ])],
        );
        assert_eq!(model.predict_row(&[-3.0]), -0.5);
        assert_eq!(model.predict_row(&[3.0]), 1.5);
        assert!(model.is_well_formed());
    }

    #[test]
    fn test_fit_reduces_error() {
        let (rows, labels) = synthetic(200);
        let baseline = labels.iter().sum::<f64>() / labels.len() as f64;
        let baseline_rmse = rmse(&vec![baseline; labels.len()], &labels);

        let model = GradientBoostedRegressor::fit(&rows, &labels, &BoosterParams::default()).unwrap();
        let fitted_rmse = rmse(&model.predict(&rows), &labels);

        assert_eq!(model.trees().len(), 100);
        assert!(fitted_rmse < baseline_rmse * 0.1, "{fitted_rmse} vs {baseline_rmse}");
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (rows, labels) = synthetic(120);
        let params = BoosterParams {
            n_estimators: 20,
            ..Default::default()
        };
        let a = GradientBoostedRegressor::fit(&rows, &labels, &params).unwrap();
        let b = GradientBoostedRegressor::fit(&rows, &labels, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let params = BoosterParams::default();
        assert!(matches!(
            GradientBoostedRegressor::fit(&[], &[], &params),
            Err(FitError::Empty)
        ));
        assert!(matches!(
            GradientBoostedRegressor::fit(&[vec![1.0]], &[1.0, 2.0], &params),
            Err(FitError::LengthMismatch { .. })
        ));
        assert!(matches!(
            GradientBoostedRegressor::fit(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0], &params),
            Err(FitError::RaggedRow { row: 1, .. })
        ));
        assert!(matches!(
            GradientBoostedRegressor::fit(&[vec![f64::NAN]], &[1.0], &params),
            Err(FitError::NonFinite(0))
        ));
        let zero_trees = BoosterParams {
            n_estimators: 0,
            ..Default::default()
        };
        assert!(matches!(
            GradientBoostedRegressor::fit(&[vec![1.0]], &[1.0], &zero_trees),
            Err(FitError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_rmse() {
        assert_eq!(rmse(&[1.0, 3.0], &[1.0, 1.0]), 2.0_f64.sqrt());
        assert_eq!(rmse(&[], &[]), 0.0);
    }
}
