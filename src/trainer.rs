use std::time::Instant;

use tracing::info;

use crate::{
    artifact::{ArtifactError, ModelArtifact},
    config::TrainingConfig,
    dataset::{Dataset, DatasetError},
    gbdt::{rmse, FitError, GradientBoostedRegressor},
    scaler::StandardScaler,
};

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("failed to fit model: {0}")]
    Fit(#[from] FitError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub holdout_rows: usize,
    pub num_features: usize,
    pub num_trees: usize,
    pub train_rmse: f64,
    pub holdout_rmse: f64,
}

/// Split, scale and fit. The scaler only ever sees the training split.
pub fn train(
    dataset: &Dataset,
    config: &TrainingConfig,
) -> Result<(ModelArtifact, TrainingReport), TrainError> {
    let split = dataset.split(config.test_size, config.seed)?;
    info!(
        train = split.train.len(),
        holdout = split.holdout.len(),
        seed = config.seed,
        "split dataset"
    );

    let scaler = StandardScaler::fit(&split.train.features);
    let train_rows = scaler.transform(&split.train.features);
    let holdout_rows = scaler.transform(&split.holdout.features);

    let started = Instant::now();
    let booster = GradientBoostedRegressor::fit(&train_rows, &split.train.labels, &config.booster)?;
    info!(
        trees = booster.trees().len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fitted gradient boosted regressor"
    );

    let report = TrainingReport {
        train_rows: split.train.len(),
        holdout_rows: split.holdout.len(),
        num_features: dataset.num_features(),
        num_trees: booster.trees().len(),
        train_rmse: rmse(&booster.predict(&train_rows), &split.train.labels),
        holdout_rmse: rmse(&booster.predict(&holdout_rows), &split.holdout.labels),
    };

    let artifact = ModelArtifact::new(
        dataset.target.clone(),
        dataset.feature_columns.clone(),
        scaler,
        booster,
    );
    Ok((artifact, report))
}

/// Load the configured dataset, train, and write the artifact.
pub fn run(config: &TrainingConfig) -> Result<TrainingReport, TrainError> {
    let dataset = Dataset::load(&config.dataset_path, &config.target)?;
    info!(
        path = %config.dataset_path.display(),
        records = dataset.len(),
        features = dataset.num_features(),
        "loaded dataset"
    );

    let (artifact, report) = train(&dataset, config)?;
    info!(
        train_rmse = report.train_rmse,
        holdout_rmse = report.holdout_rmse,
        "evaluated model"
    );

    artifact.save(&config.model_path)?;
    info!("Saved model to {}", config.model_path.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gbdt::BoosterParams;
    use serde_json::json;

    fn dataset(n: usize) -> Dataset {
        let records: Vec<_> = (0..n)
            .map(|i| {
                let income = 20_000.0 + (i * 1_337 % 80_000) as f64;
                let age = 21.0 + (i * 7 % 50) as f64;
                let score = 300.0 + income / 200.0 + age;
                match json!({"Income": income, "Age": age, "Credit Score": score}) {
                    serde_json::Value::Object(map) => map,
                    _ => unreachable!(),
                }
            })
            .collect();
        Dataset::from_records(&records, "Credit Score").unwrap()
    }

    fn config() -> TrainingConfig {
        TrainingConfig {
            booster: BoosterParams {
                n_estimators: 30,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_train_report() {
        let (artifact, report) = train(&dataset(100), &config()).unwrap();
        assert_eq!(report.train_rows, 80);
        assert_eq!(report.holdout_rows, 20);
        assert_eq!(report.num_features, 2);
        assert_eq!(report.num_trees, 30);
        assert!(report.holdout_rmse.is_finite());
        assert_eq!(artifact.feature_columns, vec!["Income", "Age"]);
        assert!(artifact.validate().is_ok());
    }

    #[test]
    fn test_scaler_fit_on_train_split_only() {
        let data = dataset(50);
        let config = config();
        let (artifact, _) = train(&data, &config).unwrap();
        let split = data.split(config.test_size, config.seed).unwrap();
        assert_eq!(artifact.scaler, StandardScaler::fit(&split.train.features));
        assert_ne!(artifact.scaler, StandardScaler::fit(&data.features));
    }

    #[test]
    fn test_run_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let dataset_path = dir.path().join("data.json");
        let records: Vec<_> = (0..40)
            .map(|i| json!({"Income": 1000 * i, "Age": 20 + i % 30, "Credit Score": 500 + i}))
            .collect();
        std::fs::write(&dataset_path, serde_json::to_string(&records).unwrap()).unwrap();

        let config = TrainingConfig {
            dataset_path,
            model_path: dir.path().join("model").join("model.bin"),
            ..config()
        };
        let report = run(&config).unwrap();
        assert_eq!(report.train_rows + report.holdout_rows, 40);
        assert!(ModelArtifact::load(&config.model_path).is_ok());
    }

    #[test]
    fn test_run_missing_dataset_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig {
            dataset_path: dir.path().join("absent.json"),
            model_path: dir.path().join("model.bin"),
            ..config()
        };
        assert!(matches!(
            run(&config),
            Err(TrainError::Dataset(DatasetError::Read { .. }))
        ));
        assert!(!config.model_path.exists());
    }
}
