//! Training configuration

use super::random_forest::MaxFeatures;
use crate::error::{Result, TabforgeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Type of ML task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Discrete class labels, scored by accuracy
    Classification,
    /// Continuous target, scored by RMSE
    Regression,
}

impl TaskType {
    /// Where the trained model is written when no path is configured
    pub fn default_model_path(&self) -> PathBuf {
        match self {
            TaskType::Classification => PathBuf::from("../models/classification_model.pkl"),
            TaskType::Regression => PathBuf::from("../models/regression_model.pkl"),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Classification => write!(f, "classification"),
            TaskType::Regression => write!(f, "regression"),
        }
    }
}

impl FromStr for TaskType {
    type Err = TabforgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "classification" | "classifier" => Ok(TaskType::Classification),
            "regression" | "regressor" => Ok(TaskType::Regression),
            other => Err(TabforgeError::ConfigError(format!("Invalid task type: {}", other))),
        }
    }
}

/// Configuration for the train/evaluate/persist cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Fraction of rows held out for evaluation
    pub test_size: f64,

    /// Seed of the train/test shuffle. `None` draws a fresh one per call.
    pub split_seed: Option<u64>,

    /// Seed of the forest. `None` derives it from the split seed.
    pub forest_seed: Option<u64>,

    /// Number of trees
    pub n_estimators: usize,

    /// Maximum depth of trees (None = grow until pure)
    pub max_depth: Option<usize>,

    /// Minimum samples required to split a node
    pub min_samples_split: usize,

    /// Minimum samples per leaf
    pub min_samples_leaf: usize,

    /// Candidate features per split (None = sqrt for classification, all for regression)
    pub max_features: Option<MaxFeatures>,

    /// Bootstrap sampling of the training rows per tree
    pub bootstrap: bool,

    /// Output path of the model artifact (None = per-task default)
    pub model_path: Option<PathBuf>,

    /// Print the `Accuracy: <v>` / `RMSE: <v>` line to stdout after saving
    pub print_metric: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            split_seed: None,
            forest_seed: None,
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            model_path: None,
            print_metric: true,
        }
    }
}

impl TrainerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to fix the split seed
    pub fn with_split_seed(mut self, seed: u64) -> Self {
        self.split_seed = Some(seed);
        self
    }

    /// Builder method to fix the forest seed
    pub fn with_forest_seed(mut self, seed: u64) -> Self {
        self.forest_seed = Some(seed);
        self
    }

    /// Builder method to set the held-out fraction
    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    /// Builder method to set number of trees
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    /// Builder method to set max depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Builder method to set the feature sampling strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Builder method to set the model output path
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    /// Builder method to silence the stdout metric line
    pub fn with_print_metric(mut self, print_metric: bool) -> Self {
        self.print_metric = print_metric;
        self
    }

    /// Resolved output path for a task
    pub fn model_path_for(&self, task: TaskType) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| task.default_model_path())
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(invalid("test_size", self.test_size, "must be in (0, 1)"));
        }
        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", self.n_estimators, "must be at least 1"));
        }
        if self.min_samples_split < 2 {
            return Err(invalid("min_samples_split", self.min_samples_split, "must be at least 2"));
        }
        if self.min_samples_leaf == 0 {
            return Err(invalid("min_samples_leaf", self.min_samples_leaf, "must be at least 1"));
        }
        if self.max_depth == Some(0) {
            return Err(invalid("max_depth", 0, "must be at least 1"));
        }
        if let Some(MaxFeatures::Fraction(f)) = self.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(invalid("max_features", f, "fraction must be in (0, 1]"));
            }
        }
        Ok(())
    }
}

fn invalid(name: &str, value: impl ToString, reason: &str) -> TabforgeError {
    TabforgeError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainerConfig::default();
        assert_eq!(config.test_size, 0.2);
        assert_eq!(config.n_estimators, 100);
        assert!(config.split_seed.is_none());
        assert!(config.print_metric);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_model_paths() {
        let config = TrainerConfig::default();
        assert_eq!(
            config.model_path_for(TaskType::Classification),
            PathBuf::from("../models/classification_model.pkl")
        );
        assert_eq!(
            config.model_path_for(TaskType::Regression),
            PathBuf::from("../models/regression_model.pkl")
        );

        let custom = config.with_model_path("out/model.bin");
        assert_eq!(custom.model_path_for(TaskType::Regression), PathBuf::from("out/model.bin"));
    }

    #[test]
    fn test_task_type_parse() {
        assert_eq!("classification".parse::<TaskType>().unwrap(), TaskType::Classification);
        assert_eq!("Regression".parse::<TaskType>().unwrap(), TaskType::Regression);
        assert!("clustering".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_test_size() {
        let config = TrainerConfig::new().with_test_size(1.0);
        assert!(matches!(
            config.validate(),
            Err(TabforgeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_task_type_serde() {
        let json = serde_json::to_string(&TaskType::Regression).unwrap();
        assert_eq!(json, "\"regression\"");
    }
}
