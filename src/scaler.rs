use serde::{Deserialize, Serialize};

/// Per-column standardization to zero mean and unit variance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Columns with zero variance keep a scale of 1.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let Some(first) = rows.first() else {
            return Self::default();
        };
        let width = first.len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut variance = vec![0.0; width];
        for row in rows {
            for ((v, x), m) in variance.iter_mut().zip(row).zip(&mean) {
                *v += (x - m) * (x - m);
            }
        }
        let scale = variance
            .into_iter()
            .map(|v| {
                let std = (v / n).sqrt();
                if std > f64::EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Self { mean, scale }
    }

    pub fn num_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((x, m), s)| (x - m) / s)
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}
