//! Data preprocessing pipeline

use super::{
    config::PreprocessingConfig, encoder::Encoder, float_series, imputer::Imputer,
    numeric_values, scaler::Scaler, ColumnType, FeatureStats,
};
use crate::error::{Result, TabforgeError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Fitted transformer that turns a raw table into a numeric one.
///
/// Steps, in order: mean imputation of numeric columns, label encoding of
/// categorical columns, standard scaling of every numeric column (label
/// codes included unless `scale_encoded` is off). All fitted state is
/// serializable so it can be stored next to a trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPreprocessor {
    config: PreprocessingConfig,
    /// Feature columns in input order
    feature_columns: Vec<String>,
    numeric_columns: Vec<String>,
    categorical_columns: Vec<String>,
    numeric_imputer: Option<Imputer>,
    categorical_imputer: Option<Imputer>,
    encoder: Option<Encoder>,
    scaler: Option<Scaler>,
    /// Label mapping for a categorical target column
    target_encoder: Option<Encoder>,
    feature_stats: HashMap<String, FeatureStats>,
    is_fitted: bool,
    fit_time: Option<f64>,
}

impl DataPreprocessor {
    /// Create a new preprocessor with default configuration
    pub fn new() -> Self {
        Self::with_config(PreprocessingConfig::default())
    }

    /// Create a new preprocessor with custom configuration
    pub fn with_config(config: PreprocessingConfig) -> Self {
        Self {
            config,
            feature_columns: Vec::new(),
            numeric_columns: Vec::new(),
            categorical_columns: Vec::new(),
            numeric_imputer: None,
            categorical_imputer: None,
            encoder: None,
            scaler: None,
            target_encoder: None,
            feature_stats: HashMap::new(),
            is_fitted: false,
            fit_time: None,
        }
    }

    /// Fit the preprocessor to the data
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        let start = Instant::now();

        if df.height() == 0 {
            return Err(TabforgeError::DataError(
                "cannot fit preprocessor on an empty dataset".to_string(),
            ));
        }

        self.reset();
        self.detect_column_types(df)?;
        self.compute_statistics(df)?;

        let mut work = self.cast_numeric(df)?;

        if !self.numeric_columns.is_empty() {
            let mut imputer = Imputer::new(self.config.numeric_impute_strategy.clone());
            let cols: Vec<&str> = self.numeric_columns.iter().map(String::as_str).collect();
            work = imputer.fit_transform(&work, &cols)?;
            self.numeric_imputer = Some(imputer);
        }

        if !self.categorical_columns.is_empty() {
            let cols: Vec<&str> = self.categorical_columns.iter().map(String::as_str).collect();

            if let Some(strategy) = self.config.categorical_impute_strategy.clone() {
                let mut imputer = Imputer::new(strategy);
                work = imputer.fit_transform(&work, &cols)?;
                self.categorical_imputer = Some(imputer);
            }

            let mut encoder = Encoder::new();
            work = encoder.fit_transform(&work, &cols)?;
            self.encoder = Some(encoder);
        }

        let scale_cols: Vec<&str> = self
            .feature_columns
            .iter()
            .filter(|c| self.config.scale_encoded || !self.categorical_columns.contains(c))
            .map(String::as_str)
            .collect();
        if !scale_cols.is_empty() {
            let mut scaler = Scaler::new();
            scaler.fit(&work, &scale_cols)?;
            self.scaler = Some(scaler);
        }

        if let Some(target) = self.config.target_column.clone() {
            self.fit_target(df, &target)?;
        }

        self.is_fitted = true;
        let elapsed = start.elapsed().as_secs_f64();
        self.fit_time = Some(elapsed);
        info!(
            rows = df.height(),
            numeric = self.numeric_columns.len(),
            categorical = self.categorical_columns.len(),
            secs = elapsed,
            "preprocessor fitted"
        );
        Ok(self)
    }

    /// Transform the data.
    ///
    /// Every fitted feature column must be present. The target column is
    /// optional so new data can be transformed for prediction. Columns that
    /// were not seen during fit are dropped.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(TabforgeError::ModelNotFitted);
        }

        for col in &self.feature_columns {
            if df.column(col).is_err() {
                return Err(TabforgeError::FeatureNotFound(col.clone()));
            }
        }

        let target = self.config.target_column.as_deref();
        let mut keep = Vec::with_capacity(df.width());
        for name in df.get_column_names() {
            let name = name.as_str();
            if self.feature_columns.iter().any(|c| c == name) || target == Some(name) {
                keep.push(name.to_string());
            } else {
                warn!(column = name, "dropping column not seen during fit");
            }
        }

        let mut result = self.cast_numeric(&df.select(keep)?)?;

        if let Some(ref imputer) = self.numeric_imputer {
            result = imputer.transform(&result)?;
        }
        if let Some(ref imputer) = self.categorical_imputer {
            result = imputer.transform(&result)?;
        }
        if let Some(ref encoder) = self.encoder {
            result = encoder.transform(&result)?;
        }
        if let Some(ref scaler) = self.scaler {
            result = scaler.transform(&result)?;
        }

        if let Some(target) = target {
            if let Ok(column) = df.column(target) {
                let series = column.as_materialized_series();
                let target_series = match self.target_encoder {
                    Some(ref encoder) => {
                        let single = DataFrame::new(vec![series.clone().into_column()])?;
                        encoder
                            .transform(&single)?
                            .column(target)?
                            .as_materialized_series()
                            .clone()
                    }
                    None => float_series(series.name().clone(), numeric_values(series)?),
                };
                result.with_column(target_series)?;
            }
        }

        debug!(rows = result.height(), cols = result.width(), "preprocessor transformed");
        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<DataFrame> {
        self.fit(df)?;
        self.transform(df)
    }

    /// Save the fitted preprocessor as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a preprocessor saved with [`DataPreprocessor::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let preprocessor: Self = serde_json::from_str(&json)?;
        Ok(preprocessor)
    }

    /// Configuration in use
    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Whether `fit` has completed
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Feature column names in input order
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    /// Get numeric column names
    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric_columns
    }

    /// Get categorical column names
    pub fn categorical_columns(&self) -> &[String] {
        &self.categorical_columns
    }

    /// Target column, if one was configured
    pub fn target_column(&self) -> Option<&str> {
        self.config.target_column.as_deref()
    }

    /// Label encoder of the feature columns
    pub fn encoder(&self) -> Option<&Encoder> {
        self.encoder.as_ref()
    }

    /// Scaler of the numeric columns
    pub fn scaler(&self) -> Option<&Scaler> {
        self.scaler.as_ref()
    }

    /// Label encoder of a categorical target
    pub fn target_encoder(&self) -> Option<&Encoder> {
        self.target_encoder.as_ref()
    }

    /// Get feature statistics
    pub fn feature_stats(&self) -> &HashMap<String, FeatureStats> {
        &self.feature_stats
    }

    /// Seconds spent in the last fit call
    pub fn fit_time(&self) -> Option<f64> {
        self.fit_time
    }

    fn reset(&mut self) {
        *self = Self::with_config(self.config.clone());
    }

    fn detect_column_types(&mut self, df: &DataFrame) -> Result<()> {
        let target = self.config.target_column.as_deref();

        if let Some(target) = target {
            if df.column(target).is_err() {
                return Err(TabforgeError::FeatureNotFound(target.to_string()));
            }
        }

        for col in df.get_columns() {
            let name = col.name().to_string();
            if target == Some(name.as_str()) {
                continue;
            }

            match ColumnType::from_dtype(col.dtype()) {
                Some(ColumnType::Numeric) => self.numeric_columns.push(name.clone()),
                Some(ColumnType::Categorical) => self.categorical_columns.push(name.clone()),
                None => {
                    return Err(TabforgeError::PreprocessingError(format!(
                        "column '{}' has unsupported dtype {}",
                        name,
                        col.dtype()
                    )))
                }
            }
            self.feature_columns.push(name);
        }

        Ok(())
    }

    fn compute_statistics(&mut self, df: &DataFrame) -> Result<()> {
        for col_name in &self.numeric_columns {
            let series = df.column(col_name)?.as_materialized_series();
            let stats = FeatureStats::from_numeric_series(col_name, series)?;
            self.feature_stats.insert(col_name.clone(), stats);
        }

        for col_name in &self.categorical_columns {
            let series = df.column(col_name)?.as_materialized_series();
            let stats = FeatureStats::from_categorical_series(col_name, series)?;
            self.feature_stats.insert(col_name.clone(), stats);
        }

        Ok(())
    }

    /// Cast every numeric feature column present in `df` to `Float64`, NaN as null
    fn cast_numeric(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut result = df.clone();
        for col_name in &self.numeric_columns {
            if let Ok(column) = df.column(col_name) {
                let series = column.as_materialized_series();
                result.with_column(float_series(series.name().clone(), numeric_values(series)?))?;
            }
        }
        Ok(result)
    }

    fn fit_target(&mut self, df: &DataFrame, target: &str) -> Result<()> {
        let column = df.column(target)?;
        match ColumnType::from_dtype(column.dtype()) {
            Some(ColumnType::Categorical) => {
                let mut encoder = Encoder::new();
                encoder.fit(df, &[target])?;
                self.target_encoder = Some(encoder);
            }
            Some(ColumnType::Numeric) => {}
            None => {
                return Err(TabforgeError::PreprocessingError(format!(
                    "target column '{}' has unsupported dtype {}",
                    target,
                    column.dtype()
                )))
            }
        }
        Ok(())
    }
}

impl Default for DataPreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot preprocessing with fresh state: impute, encode, scale.
pub fn preprocess_data(df: &DataFrame) -> Result<DataFrame> {
    DataPreprocessor::new().fit_transform(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_dataframe() -> DataFrame {
        df!(
            "age" => &[25.0, 30.0, 35.0, 40.0, 45.0],
            "income" => &[50000.0, 60000.0, 70000.0, 80000.0, 90000.0],
            "city" => &["NYC", "LA", "NYC", "SF", "LA"]
        )
        .unwrap()
    }

    fn values(df: &DataFrame, col: &str) -> Vec<f64> {
        df.column(col).unwrap().f64().unwrap().into_no_null_iter().collect()
    }

    #[test]
    fn test_preprocessor_creation() {
        let preprocessor = DataPreprocessor::new();
        assert!(!preprocessor.is_fitted());
    }

    #[test]
    fn test_column_detection() {
        let df = create_test_dataframe();
        let mut preprocessor = DataPreprocessor::new();
        preprocessor.fit(&df).unwrap();

        assert_eq!(preprocessor.numeric_columns(), &["age".to_string(), "income".to_string()]);
        assert_eq!(preprocessor.categorical_columns(), &["city".to_string()]);
        assert_eq!(preprocessor.feature_columns().len(), 3);
    }

    #[test]
    fn test_scenario_age_city_label() {
        let df = df!(
            "age" => &[Some(25.0), None, Some(35.0)],
            "city" => &["A", "B", "A"],
            "label" => &[0i64, 1, 0]
        )
        .unwrap();

        let result = preprocess_data(&df).unwrap();
        assert_eq!(result.shape(), (3, 3));

        let age = values(&result, "age");
        let z = 5.0 / (50.0f64 / 3.0).sqrt();
        assert!((age[0] + z).abs() < 1e-9);
        assert!(age[1].abs() < 1e-9);
        assert!((age[2] - z).abs() < 1e-9);

        let city = values(&result, "city");
        let s = 2.0f64.sqrt();
        assert!((city[0] + s / 2.0).abs() < 1e-9);
        assert!((city[1] - s).abs() < 1e-9);
        assert!((city[2] + s / 2.0).abs() < 1e-9);

        // Without a configured target the label is scaled like any feature
        let label = values(&result, "label");
        assert!((label[1] - s).abs() < 1e-9);
    }

    #[test]
    fn test_target_column_left_unscaled() {
        let df = df!(
            "x" => &[1.0, 2.0, 3.0, 4.0],
            "label" => &["yes", "no", "yes", "no"]
        )
        .unwrap();

        let mut preprocessor =
            DataPreprocessor::with_config(PreprocessingConfig::new().with_target("label"));
        let result = preprocessor.fit_transform(&df).unwrap();

        assert_eq!(preprocessor.feature_columns(), &["x".to_string()]);
        assert_eq!(values(&result, "label"), vec![1.0, 0.0, 1.0, 0.0]);
        assert_eq!(
            preprocessor.target_encoder().unwrap().decode("label", 1),
            Some("yes")
        );
    }

    #[test]
    fn test_transform_reuses_fitted_state() {
        let df = create_test_dataframe();
        let mut preprocessor = DataPreprocessor::new();
        preprocessor.fit(&df).unwrap();

        let new = df!(
            "age" => &[35.0],
            "income" => &[70000.0],
            "city" => &["SF"]
        )
        .unwrap();
        let result = preprocessor.transform(&new).unwrap();

        // 35 and 70000 are the training means
        assert!(values(&result, "age")[0].abs() < 1e-9);
        assert!(values(&result, "income")[0].abs() < 1e-9);
        let sf = values(&result, "city")[0];
        assert!(sf > 0.0);
    }

    #[test]
    fn test_unscaled_codes() {
        let df = create_test_dataframe();
        let mut preprocessor =
            DataPreprocessor::with_config(PreprocessingConfig::new().with_scale_encoded(false));
        let result = preprocessor.fit_transform(&df).unwrap();

        assert_eq!(values(&result, "city"), vec![1.0, 0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_missing_feature_column() {
        let df = create_test_dataframe();
        let mut preprocessor = DataPreprocessor::new();
        preprocessor.fit(&df).unwrap();

        let partial = df!("age" => &[30.0]).unwrap();
        assert!(matches!(
            preprocessor.transform(&partial),
            Err(TabforgeError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let df = DataFrame::new(vec![Column::new("a".into(), Vec::<f64>::new())]).unwrap();
        let mut preprocessor = DataPreprocessor::new();
        assert!(matches!(preprocessor.fit(&df), Err(TabforgeError::DataError(_))));
    }

    #[test]
    fn test_feature_statistics() {
        let df = create_test_dataframe();
        let mut preprocessor = DataPreprocessor::new();
        preprocessor.fit(&df).unwrap();

        let stats = preprocessor.feature_stats();

        let age_stats = stats.get("age").unwrap();
        assert_eq!(age_stats.dtype, ColumnType::Numeric);
        assert_eq!(age_stats.mean, Some(35.0));

        let city_stats = stats.get("city").unwrap();
        assert_eq!(city_stats.dtype, ColumnType::Categorical);
        assert_eq!(city_stats.unique_count, Some(3));
    }
}
