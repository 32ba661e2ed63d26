//! Standard scaling

use super::{float_series, numeric_values};
use crate::error::{Result, TabforgeError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameters for a fitted column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: f64,
    /// Population standard deviation, 1.0 for constant columns
    pub scale: f64,
}

/// Standard scaler: `(x - mean) / std` with the population std (ddof = 0)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scaler {
    params: HashMap<String, ScalerParams>,
    is_fitted: bool,
}

impl Scaler {
    /// Create a new scaler
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the scaler to the data
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        for col_name in columns {
            let series = df
                .column(col_name)
                .map_err(|_| TabforgeError::FeatureNotFound(col_name.to_string()))?
                .as_materialized_series();

            let params = Self::compute_params(col_name, series)?;
            self.params.insert(col_name.to_string(), params);
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Transform the data.
    /// Builds all replacement columns first, then applies them in one pass.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(TabforgeError::ModelNotFitted);
        }

        let replacements: Vec<Series> = self
            .params
            .iter()
            .filter_map(|(col_name, params)| {
                df.column(col_name)
                    .ok()
                    .map(|column| Self::scale_series(column.as_materialized_series(), params))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut result = df.clone();
        for scaled in replacements {
            result.with_column(scaled)?;
        }

        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    /// Fitted parameters for a column
    pub fn params(&self, column: &str) -> Option<ScalerParams> {
        self.params.get(column).copied()
    }

    fn compute_params(col_name: &str, series: &Series) -> Result<ScalerParams> {
        let values = numeric_values(series)?
            .into_iter()
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| {
                TabforgeError::PreprocessingError(format!(
                    "column '{}' still has missing values at scaling time",
                    col_name
                ))
            })?;

        if values.is_empty() {
            return Err(TabforgeError::DataError(format!(
                "cannot scale empty column '{}'",
                col_name
            )));
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        // Constant when the variance is within the rounding error of the mean,
        // relative to the data so tiny or offset columns still get scaled
        let is_constant = values.iter().all(|&v| v == values[0])
            || var <= (n * f64::EPSILON * mean.abs()).powi(2);
        let scale = if is_constant {
            tracing::warn!(column = col_name, "zero variance column, leaving it centered only");
            1.0
        } else {
            var.sqrt()
        };

        Ok(ScalerParams { mean, scale })
    }

    fn scale_series(series: &Series, params: &ScalerParams) -> Result<Series> {
        let values = numeric_values(series)?;
        Ok(float_series(
            series.name().clone(),
            values
                .into_iter()
                .map(|opt| opt.map(|v| (v - params.mean) / params.scale)),
        ))
    }
}
