//! Categorical label encoding

use super::{float_series, string_values};
use crate::error::{Result, TabforgeError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Label encoder mapping each distinct category of a column to an integer
/// code. Codes follow the sorted order of the distinct values, so a column
/// with k categories is encoded into `0..k`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Encoder {
    // column name -> sorted categories, the index is the code
    mappings: HashMap<String, Vec<String>>,
    is_fitted: bool,
}

impl Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the encoder to the data
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        for col_name in columns {
            let series = df
                .column(col_name)
                .map_err(|_| TabforgeError::FeatureNotFound(col_name.to_string()))?
                .as_materialized_series();

            let mapping = Self::build_mapping(col_name, series)?;
            self.mappings.insert(col_name.to_string(), mapping);
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Replace every fitted column present in `df` by its `Float64` codes
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(TabforgeError::ModelNotFitted);
        }

        let mut result = df.clone();
        for col_name in self.mappings.keys() {
            if let Ok(column) = df.column(col_name) {
                let encoded = self.encode_series(col_name, column.as_materialized_series())?;
                result.with_column(encoded)?;
            }
        }

        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    /// Sorted categories learned for a column
    pub fn categories(&self, column: &str) -> Option<&[String]> {
        self.mappings.get(column).map(Vec::as_slice)
    }

    /// Code assigned to a category
    pub fn code(&self, column: &str, value: &str) -> Option<usize> {
        self.mappings
            .get(column)
            .and_then(|cats| cats.binary_search_by(|c| c.as_str().cmp(value)).ok())
    }

    /// Category behind a code
    pub fn decode(&self, column: &str, code: usize) -> Option<&str> {
        self.mappings
            .get(column)
            .and_then(|cats| cats.get(code))
            .map(String::as_str)
    }

    /// Names of the fitted columns
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }

    fn build_mapping(col_name: &str, series: &Series) -> Result<Vec<String>> {
        let mut categories = BTreeSet::new();
        for val in string_values(series)? {
            match val {
                Some(v) => {
                    categories.insert(v);
                }
                None => return Err(Self::missing_value(col_name)),
            }
        }
        Ok(categories.into_iter().collect())
    }

    fn encode_series(&self, col_name: &str, series: &Series) -> Result<Series> {
        let codes = string_values(series)?
            .into_iter()
            .map(|val| {
                let val = val.ok_or_else(|| Self::missing_value(col_name))?;
                self.code(col_name, &val)
                    .map(|code| Some(code as f64))
                    .ok_or_else(|| TabforgeError::UnknownCategory {
                        column: col_name.to_string(),
                        value: val,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(float_series(series.name().clone(), codes))
    }

    fn missing_value(col_name: &str) -> TabforgeError {
        TabforgeError::PreprocessingError(format!(
            "categorical column '{}' contains missing values",
            col_name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn city_df() -> DataFrame {
        DataFrame::new(vec![Column::new("city".into(), &["NYC", "LA", "NYC", "SF", "LA"])]).unwrap()
    }

    #[test]
    fn test_codes_follow_sorted_order() {
        let mut encoder = Encoder::new();
        let result = encoder.fit_transform(&city_df(), &["city"]).unwrap();

        let codes: Vec<f64> = result
            .column("city")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        // LA=0, NYC=1, SF=2
        assert_eq!(codes, vec![1.0, 0.0, 1.0, 2.0, 0.0]);
        assert_eq!(encoder.categories("city").unwrap().len(), 3);
    }

    #[test]
    fn test_code_and_decode() {
        let mut encoder = Encoder::new();
        encoder.fit(&city_df(), &["city"]).unwrap();

        assert_eq!(encoder.code("city", "SF"), Some(2));
        assert_eq!(encoder.decode("city", 0), Some("LA"));
        assert_eq!(encoder.code("city", "Boston"), None);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let mut encoder = Encoder::new();
        encoder.fit(&city_df(), &["city"]).unwrap();

        let new = DataFrame::new(vec![Column::new("city".into(), &["LA", "Boston"])]).unwrap();
        let err = encoder.transform(&new).unwrap_err();
        assert!(matches!(err, TabforgeError::UnknownCategory { .. }));
    }

    #[test]
    fn test_missing_value_rejected() {
        let df = DataFrame::new(vec![Column::new("city".into(), &[Some("A"), None])]).unwrap();
        let mut encoder = Encoder::new();
        assert!(matches!(
            encoder.fit(&df, &["city"]),
            Err(TabforgeError::PreprocessingError(_))
        ));
    }

    #[test]
    fn test_encoder_is_serializable() {
        let mut encoder = Encoder::new();
        encoder.fit(&city_df(), &["city"]).unwrap();

        let json = serde_json::to_string(&encoder).unwrap();
        let restored: Encoder = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.code("city", "NYC"), Some(1));
    }
}
