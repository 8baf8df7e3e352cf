use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use credit_inference::{
    artifact::ModelArtifact,
    gbdt::{BoosterParams, GradientBoostedRegressor},
    predictor::{FeatureRecord, Predictor},
    scaler::StandardScaler,
};
use serde_json::{json, Value};

fn synthetic(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            vec![
                20_000.0 + (i * 1_337 % 80_000) as f64,
                21.0 + (i * 7 % 50) as f64,
                (i % 5) as f64,
            ]
        })
        .collect();
    let labels = rows
        .iter()
        .map(|r| 300.0 + r[0] / 200.0 + r[1] - 10.0 * r[2])
        .collect();
    (rows, labels)
}

fn predictor(n_estimators: usize) -> Predictor {
    let (rows, labels) = synthetic(1_000);
    let scaler = StandardScaler::fit(&rows);
    let params = BoosterParams {
        n_estimators,
        ..Default::default()
    };
    let booster = GradientBoostedRegressor::fit(&scaler.transform(&rows), &labels, &params).unwrap();
    Predictor::new(ModelArtifact::new(
        "Credit Score".to_string(),
        vec!["Income".to_string(), "Age".to_string(), "Loans".to_string()],
        scaler,
        booster,
    ))
}

fn record() -> FeatureRecord {
    match json!({"Income": 50000, "Age": 30, "Loans": 2, "Credit Score": 700}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn bench_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("Bench Predict: single record");
    for n_estimators in [10, 100, 300] {
        let predictor = predictor(n_estimators);
        let record = record();
        group.bench_with_input(
            BenchmarkId::new("Number of trees", n_estimators),
            &n_estimators,
            |b, _| b.iter(|| predictor.predict(black_box(&record))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_predict);
criterion_main!(benches);
