//! Missing value imputation strategies

use super::{float_series, numeric_values, string_values};
use crate::error::{Result, TabforgeError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Strategy for imputing missing values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImputeStrategy {
    /// Replace with mean (numeric only)
    Mean,
    /// Replace with median (numeric only)
    Median,
    /// Replace with mode / most frequent value
    MostFrequent,
    /// Replace with a constant value
    Constant(f64),
    /// Replace with a constant string (categorical)
    ConstantString(String),
}

/// Imputer for handling missing values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imputer {
    strategy: ImputeStrategy,
    fill_values: HashMap<String, ImputeValue>,
    is_fitted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum ImputeValue {
    Numeric(f64),
    String(String),
}

impl Imputer {
    /// Create a new imputer with the specified strategy
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self {
            strategy,
            fill_values: HashMap::new(),
            is_fitted: false,
        }
    }

    /// Fit the imputer to the data
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        for col_name in columns {
            let series = df
                .column(col_name)
                .map_err(|_| TabforgeError::FeatureNotFound(col_name.to_string()))?
                .as_materialized_series();

            let fill_value = self.compute_fill_value(col_name, series)?;
            self.fill_values.insert(col_name.to_string(), fill_value);
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Transform the data by imputing missing values
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(TabforgeError::ModelNotFitted);
        }

        let mut result = df.clone();
        for (col_name, fill_value) in &self.fill_values {
            if let Ok(column) = df.column(col_name) {
                let filled = Self::fill_series(column.as_materialized_series(), fill_value)?;
                result.with_column(filled)?;
            }
        }

        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    /// Numeric fill value learned for a column, if any
    pub fn numeric_fill_value(&self, column: &str) -> Option<f64> {
        match self.fill_values.get(column) {
            Some(ImputeValue::Numeric(v)) => Some(*v),
            _ => None,
        }
    }

    fn compute_fill_value(&self, col_name: &str, series: &Series) -> Result<ImputeValue> {
        let is_string = matches!(series.dtype(), DataType::String | DataType::Categorical(_, _));

        match &self.strategy {
            ImputeStrategy::Mean | ImputeStrategy::Median if is_string => {
                Err(TabforgeError::PreprocessingError(format!(
                    "{:?} imputation requires a numeric column, '{}' is {}",
                    self.strategy,
                    col_name,
                    series.dtype()
                )))
            }
            ImputeStrategy::Mean => {
                let present = Self::present_numeric(col_name, series)?;
                let mean = present.iter().sum::<f64>() / present.len() as f64;
                Ok(ImputeValue::Numeric(mean))
            }
            ImputeStrategy::Median => {
                let mut present = Self::present_numeric(col_name, series)?;
                present.sort_by(f64::total_cmp);
                let mid = present.len() / 2;
                let median = if present.len() % 2 == 0 {
                    (present[mid - 1] + present[mid]) / 2.0
                } else {
                    present[mid]
                };
                Ok(ImputeValue::Numeric(median))
            }
            ImputeStrategy::MostFrequent if is_string => {
                let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                for val in string_values(series)?.into_iter().flatten() {
                    *counts.entry(val).or_insert(0) += 1;
                }
                // Ties resolve to the lexicographically smallest value
                let mode = counts
                    .into_iter()
                    .fold(None, |best: Option<(String, usize)>, (val, count)| match best {
                        Some((_, best_count)) if best_count >= count => best,
                        _ => Some((val, count)),
                    })
                    .map(|(val, _)| val)
                    .ok_or_else(|| Self::all_missing(col_name))?;
                Ok(ImputeValue::String(mode))
            }
            ImputeStrategy::MostFrequent => {
                let mut present = Self::present_numeric(col_name, series)?;
                present.sort_by(f64::total_cmp);
                let mut best = (present[0], 0usize);
                let mut run = (present[0], 0usize);
                for v in present {
                    if v == run.0 {
                        run.1 += 1;
                    } else {
                        run = (v, 1);
                    }
                    if run.1 > best.1 {
                        best = run;
                    }
                }
                Ok(ImputeValue::Numeric(best.0))
            }
            ImputeStrategy::Constant(val) => Ok(ImputeValue::Numeric(*val)),
            ImputeStrategy::ConstantString(val) => Ok(ImputeValue::String(val.clone())),
        }
    }

    fn present_numeric(col_name: &str, series: &Series) -> Result<Vec<f64>> {
        let present: Vec<f64> = numeric_values(series)?.into_iter().flatten().collect();
        if present.is_empty() {
            return Err(Self::all_missing(col_name));
        }
        Ok(present)
    }

    fn all_missing(col_name: &str) -> TabforgeError {
        TabforgeError::PreprocessingError(format!(
            "column '{}' has no non-missing values to impute from",
            col_name
        ))
    }

    fn fill_series(series: &Series, fill_value: &ImputeValue) -> Result<Series> {
        match fill_value {
            ImputeValue::Numeric(val) => {
                let values = numeric_values(series)?;
                Ok(float_series(
                    series.name().clone(),
                    values.into_iter().map(|opt| Some(opt.unwrap_or(*val))),
                ))
            }
            ImputeValue::String(val) => {
                let filled: StringChunked = string_values(series)?
                    .into_iter()
                    .map(|opt| Some(opt.unwrap_or_else(|| val.clone())))
                    .collect();
                Ok(filled.with_name(series.name().clone()).into_series())
            }
        }
    }
}
