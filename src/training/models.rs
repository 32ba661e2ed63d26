//! Evaluation metrics

use super::config::TaskType;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Metrics for model evaluation on the held-out rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy (classification)
    pub accuracy: Option<f64>,
    /// Mean Squared Error (regression)
    pub mse: Option<f64>,
    /// Root Mean Squared Error (regression)
    pub rmse: Option<f64>,
    /// Mean Absolute Error (regression)
    pub mae: Option<f64>,
    /// R-squared (regression)
    pub r2: Option<f64>,
    /// Training time in seconds
    pub training_time_secs: f64,
    /// Number of features
    pub n_features: usize,
    /// Number of training samples
    pub n_train: usize,
    /// Number of evaluation samples
    pub n_test: usize,
}

impl ModelMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of exact label matches
    pub fn compute_classification(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut metrics = Self::new();
        metrics.n_test = y_true.len();

        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| t == p)
            .count();
        metrics.accuracy = Some(correct as f64 / y_true.len().max(1) as f64);

        metrics
    }

    /// Compute regression metrics
    pub fn compute_regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut metrics = Self::new();
        metrics.n_test = y_true.len();

        let n = y_true.len().max(1) as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        metrics.mse = Some(mse);
        metrics.rmse = Some(mse.sqrt());
        metrics.mae = Some(errors.iter().map(|e| e.abs()).sum::<f64>() / n);

        let y_mean: f64 = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();

        metrics.r2 = if ss_tot > 0.0 {
            Some(1.0 - ss_res / ss_tot)
        } else {
            Some(0.0)
        };

        metrics
    }

    /// Metrics appropriate for `task`
    pub fn compute(task: TaskType, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        match task {
            TaskType::Classification => Self::compute_classification(y_true, y_pred),
            TaskType::Regression => Self::compute_regression(y_true, y_pred),
        }
    }

    /// The reported score: accuracy for classification, RMSE for regression
    pub fn headline(&self) -> Option<(&'static str, f64)> {
        self.accuracy
            .map(|v| ("Accuracy", v))
            .or_else(|| self.rmse.map(|v| ("RMSE", v)))
    }

    /// The reported score as a `Label: value` line
    pub fn headline_line(&self) -> Option<String> {
        self.headline().map(|(label, value)| format!("{}: {}", label, value))
    }

    /// All present values keyed by name
    pub fn to_map(&self) -> Vec<(&'static str, f64)> {
        [
            ("accuracy", self.accuracy),
            ("mse", self.mse),
            ("rmse", self.rmse),
            ("mae", self.mae),
            ("r2", self.r2),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }
}
