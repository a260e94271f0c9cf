use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::encoder::{LabeledVector, FEATURE_COUNT, FEATURE_NAMES};
use crate::error::PipelineError;
use crate::metrics::RegressionMetrics;

/// Shuffles row indices with a seeded rng and cuts them at `train_fraction`.
///
/// Same rows and seed, same split.
pub fn train_test_split<T: Clone>(
    rows: &[T],
    train_fraction: f64,
    seed: u64,
) -> (Vec<T>, Vec<T>) {
    // generate vector from 0 to # of rows
    let mut indices: Vec<usize> = (0..rows.len()).collect();

    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let split_idx = ((rows.len() as f64 * train_fraction).round() as usize).min(rows.len());

    let train = indices[..split_idx].iter().map(|&i| rows[i].clone()).collect();
    let test = indices[split_idx..].iter().map(|&i| rows[i].clone()).collect();
    (train, test)
}

/// L2-regularized least squares.
///
/// Features and label are standardized before solving, so `reg_param` is
/// independent of the feature units. The intercept is not penalized.
#[derive(Debug, Clone, Copy)]
pub struct RidgeRegression {
    pub reg_param: f64,
}

impl RidgeRegression {
    pub fn new(reg_param: f64) -> Self {
        Self { reg_param }
    }

    pub fn fit(&self, rows: &[LabeledVector]) -> Result<FittedModel, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::NoTrainableRows);
        }
        let n = rows.len() as f64;

        let x_mean = column_means(rows);
        let x_std = column_stds(rows, &x_mean);
        let y_mean = rows.iter().map(|r| r.label).sum::<f64>() / n;
        let y_std = sample_std(rows.iter().map(|r| r.label), y_mean, rows.len());

        if y_std == 0.0 {
            debug!("constant label, fitting intercept only");
            return Ok(FittedModel {
                weights: [0.0; FEATURE_COUNT],
                intercept: y_mean,
                reg_param: self.reg_param,
            });
        }

        // only features with spread take part in the solve
        let active: Vec<usize> = (0..FEATURE_COUNT).filter(|&j| x_std[j] > 0.0).collect();
        let mut weights = [0.0; FEATURE_COUNT];

        if !active.is_empty() {
            let k = active.len();
            let z = DMatrix::from_fn(rows.len(), k, |i, c| {
                let j = active[c];
                (rows[i].features.0[j] - x_mean[j]) / x_std[j]
            });
            let ys = DVector::from_iterator(
                rows.len(),
                rows.iter().map(|r| (r.label - y_mean) / y_std),
            );

            let mut gram = z.transpose() * &z / n;
            let penalty = self.reg_param / y_std;
            for d in 0..k {
                gram[(d, d)] += penalty;
            }
            let rhs = z.transpose() * ys / n;

            let beta = gram
                .cholesky()
                .ok_or(PipelineError::SingularSystem)?
                .solve(&rhs);

            for (c, &j) in active.iter().enumerate() {
                weights[j] = beta[c] * y_std / x_std[j];
            }
        }

        let intercept = y_mean
            - weights
                .iter()
                .zip(x_mean.iter())
                .map(|(w, m)| w * m)
                .sum::<f64>();

        let model = FittedModel {
            weights,
            intercept,
            reg_param: self.reg_param,
        };
        info!(
            rows = rows.len(),
            reg_param = self.reg_param,
            intercept = model.intercept,
            "fitted ridge regression"
        );
        Ok(model)
    }
}

fn column_means(rows: &[LabeledVector]) -> [f64; FEATURE_COUNT] {
    let mut means = [0.0; FEATURE_COUNT];
    for row in rows {
        for (m, v) in means.iter_mut().zip(row.features.0.iter()) {
            *m += v;
        }
    }
    let n = rows.len() as f64;
    means.iter_mut().for_each(|m| *m /= n);
    means
}

fn column_stds(rows: &[LabeledVector], means: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
    let mut stds = [0.0; FEATURE_COUNT];
    for (j, s) in stds.iter_mut().enumerate() {
        *s = sample_std(rows.iter().map(|r| r.features.0[j]), means[j], rows.len());
    }
    stds
}

fn sample_std(values: impl Iterator<Item = f64>, mean: f64, n: usize) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let ss: f64 = values.map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Weights in [`FEATURE_NAMES`] order plus an intercept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedModel {
    pub weights: [f64; FEATURE_COUNT],
    pub intercept: f64,
    pub reg_param: f64,
}

impl FittedModel {
    pub fn predict(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        self.intercept
            + self
                .weights
                .iter()
                .zip(features.iter())
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }

    /// One prediction per row, same order as `rows`.
    pub fn evaluate(&self, rows: &[LabeledVector]) -> Vec<Prediction> {
        rows.iter()
            .map(|row| {
                let predicted = self.predict(&row.features.0);
                Prediction {
                    actual: row.label,
                    predicted,
                    residual: predicted - row.label,
                }
            })
            .collect()
    }

    pub fn summary(&self, train: RegressionMetrics, test: RegressionMetrics) -> ModelSummary {
        ModelSummary {
            features: FEATURE_NAMES
                .iter()
                .zip(self.weights.iter())
                .map(|(name, weight)| FeatureWeight {
                    feature: name.to_string(),
                    weight: *weight,
                })
                .collect(),
            intercept: self.intercept,
            reg_param: self.reg_param,
            train,
            test,
        }
    }
}

/// One row of `prediction_results.csv`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "actual_price")]
    pub actual: f64,
    #[serde(rename = "predicted_price")]
    pub predicted: f64,
    #[serde(rename = "residuals")]
    pub residual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub weight: f64,
}

/// Contents of `model.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub features: Vec<FeatureWeight>,
    pub intercept: f64,
    pub reg_param: f64,
    pub train: RegressionMetrics,
    pub test: RegressionMetrics,
}
