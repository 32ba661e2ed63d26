//! Preprocessing configuration

use super::ImputeStrategy;
use serde::{Deserialize, Serialize};

/// Configuration for data preprocessing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Strategy for handling missing numeric values
    pub numeric_impute_strategy: ImputeStrategy,

    /// Strategy for missing categorical values.
    /// `None` rejects nulls in categorical columns.
    pub categorical_impute_strategy: Option<ImputeStrategy>,

    /// Whether label codes are standardized along with the numeric columns
    pub scale_encoded: bool,

    /// Column held out of imputation and scaling.
    /// When unset every column is treated as a feature.
    pub target_column: Option<String>,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            numeric_impute_strategy: ImputeStrategy::Mean,
            categorical_impute_strategy: None,
            scale_encoded: true,
            target_column: None,
        }
    }
}

impl PreprocessingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set numeric impute strategy
    pub fn with_numeric_impute(mut self, strategy: ImputeStrategy) -> Self {
        self.numeric_impute_strategy = strategy;
        self
    }

    /// Builder method to fill missing categorical values instead of failing
    pub fn with_categorical_impute(mut self, strategy: ImputeStrategy) -> Self {
        self.categorical_impute_strategy = Some(strategy);
        self
    }

    /// Builder method to keep label codes unscaled
    pub fn with_scale_encoded(mut self, scale_encoded: bool) -> Self {
        self.scale_encoded = scale_encoded;
        self
    }

    /// Builder method to set the target column
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_column = Some(target.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PreprocessingConfig::default();
        assert_eq!(config.numeric_impute_strategy, ImputeStrategy::Mean);
        assert!(config.categorical_impute_strategy.is_none());
        assert!(config.scale_encoded);
        assert!(config.target_column.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = PreprocessingConfig::new()
            .with_categorical_impute(ImputeStrategy::MostFrequent)
            .with_scale_encoded(false)
            .with_target("label");

        assert_eq!(config.categorical_impute_strategy, Some(ImputeStrategy::MostFrequent));
        assert!(!config.scale_encoded);
        assert_eq!(config.target_column.as_deref(), Some("label"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PreprocessingConfig =
            serde_json::from_str(r#"{"target_column": "price"}"#).unwrap();
        assert_eq!(config.target_column.as_deref(), Some("price"));
        assert!(config.scale_encoded);
    }
}
