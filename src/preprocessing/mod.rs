//! Data preprocessing module
//!
//! Turns a raw mixed-type table into a fully numeric one:
//! - Missing value imputation (column mean for numeric columns)
//! - Label encoding of categorical columns (sorted distinct values)
//! - Standard scaling (zero mean, unit population variance)
//!
//! The fitted state lives in [`DataPreprocessor`] so the exact same
//! transformation can be replayed on new data.

mod config;
mod encoder;
mod imputer;
mod pipeline;
mod scaler;

pub use config::PreprocessingConfig;
pub use encoder::Encoder;
pub use imputer::{ImputeStrategy, Imputer};
pub use pipeline::{preprocess_data, DataPreprocessor};
pub use scaler::Scaler;

use crate::error::{Result, TabforgeError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Column data type for preprocessing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnType {
    Numeric,
    Categorical,
}

impl ColumnType {
    /// Classify a polars dtype, `None` for dtypes the pipeline cannot handle
    pub fn from_dtype(dtype: &DataType) -> Option<Self> {
        match dtype {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
            | DataType::Boolean => Some(ColumnType::Numeric),
            DataType::String | DataType::Categorical(_, _) => Some(ColumnType::Categorical),
            _ => None,
        }
    }
}

/// Feature statistics computed during fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureStats {
    pub name: String,
    pub dtype: ColumnType,
    pub count: usize,
    pub null_count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub unique_count: Option<usize>,
    pub categories: Option<Vec<String>>,
}

impl FeatureStats {
    /// Create new feature statistics
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
            count: 0,
            null_count: 0,
            mean: None,
            std: None,
            min: None,
            max: None,
            unique_count: None,
            categories: None,
        }
    }

    /// Compute statistics from a numeric series (NaN counts as missing)
    pub fn from_numeric_series(name: &str, series: &Series) -> Result<Self> {
        let mut stats = Self::new(name, ColumnType::Numeric);
        let values = numeric_values(series)?;
        stats.count = values.len();
        stats.null_count = values.iter().filter(|v| v.is_none()).count();

        let present: Vec<f64> = values.into_iter().flatten().collect();
        if !present.is_empty() {
            let n = present.len() as f64;
            let mean = present.iter().sum::<f64>() / n;
            let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            stats.mean = Some(mean);
            stats.std = Some(var.sqrt());
            stats.min = present.iter().copied().reduce(f64::min);
            stats.max = present.iter().copied().reduce(f64::max);
        }

        Ok(stats)
    }

    /// Compute statistics from a categorical series
    pub fn from_categorical_series(name: &str, series: &Series) -> Result<Self> {
        let mut stats = Self::new(name, ColumnType::Categorical);
        stats.count = series.len();
        stats.null_count = series.null_count();

        let mut categories: Vec<String> = string_values(series)?
            .into_iter()
            .flatten()
            .collect();
        categories.sort();
        categories.dedup();
        stats.unique_count = Some(categories.len());
        stats.categories = Some(categories);

        Ok(stats)
    }
}

/// Read a numeric series as `f64`, mapping both null and NaN to `None`.
/// Values that do not parse as numbers are an error, not a silent null.
pub(crate) fn numeric_values(series: &Series) -> Result<Vec<Option<f64>>> {
    let casted = series.strict_cast(&DataType::Float64).map_err(|e| {
        TabforgeError::PreprocessingError(format!(
            "column '{}' cannot be converted to numeric: {}",
            series.name(),
            e
        ))
    })?;
    let ca = casted.f64()?;
    Ok(ca
        .into_iter()
        .map(|opt| opt.filter(|v| !v.is_nan()))
        .collect())
}

/// Read a string or categorical series as owned strings
pub(crate) fn string_values(series: &Series) -> Result<Vec<Option<String>>> {
    let casted = series.cast(&DataType::String)?;
    let ca = casted
        .str()
        .map_err(|e| TabforgeError::PreprocessingError(e.to_string()))?;
    Ok(ca.into_iter().map(|opt| opt.map(str::to_string)).collect())
}

/// Build a named `Float64` series from optional values
pub(crate) fn float_series(name: PlSmallStr, values: impl IntoIterator<Item = Option<f64>>) -> Series {
    let ca: Float64Chunked = values.into_iter().collect();
    ca.with_name(name).into_series()
}
