//! Regression metrics over `(actual, predicted)` pairs.

use serde::{Deserialize, Serialize};

use crate::model::Prediction;

/// Root mean squared error. `NaN` for an empty slice.
pub fn rmse(predictions: &[Prediction]) -> f64 {
    mse(predictions).sqrt()
}

pub fn mse(predictions: &[Prediction]) -> f64 {
    if predictions.is_empty() {
        return f64::NAN;
    }
    let ss: f64 = predictions.iter().map(|p| p.residual.powi(2)).sum();
    ss / predictions.len() as f64
}

pub fn mae(predictions: &[Prediction]) -> f64 {
    if predictions.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = predictions.iter().map(|p| p.residual.abs()).sum();
    sum / predictions.len() as f64
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// With no variance in the actual values this is 1.0 for a perfect fit and
/// 0.0 otherwise.
pub fn r_squared(predictions: &[Prediction]) -> f64 {
    if predictions.is_empty() {
        return f64::NAN;
    }
    let mean = predictions.iter().map(|p| p.actual).sum::<f64>() / predictions.len() as f64;
    let ss_res: f64 = predictions.iter().map(|p| p.residual.powi(2)).sum();
    let ss_tot: f64 = predictions.iter().map(|p| (p.actual - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rows: usize,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    pub fn compute(predictions: &[Prediction]) -> Self {
        Self {
            rows: predictions.len(),
            rmse: rmse(predictions),
            mae: mae(predictions),
            r2: r_squared(predictions),
        }
    }
}
