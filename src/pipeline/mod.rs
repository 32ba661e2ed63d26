//! End-to-end pipeline
//!
//! Raw table + target column -> fitted preprocessor -> random forest ->
//! one persisted [`ModelArtifact`] that can predict on raw data.

use crate::error::{Result, TabforgeError};
use crate::export::ModelArtifact;
use crate::preprocessing::{DataPreprocessor, PreprocessingConfig};
use crate::training::{
    column_to_array1, columns_to_array2, fit_and_evaluate, ModelMetrics, TaskType, TrainerConfig,
};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Classification or regression
    pub task: TaskType,
    /// Column holding the labels
    pub target_column: String,
    /// Preprocessing settings; its `target_column` is overridden
    pub preprocessing: PreprocessingConfig,
    /// Split, forest and output settings
    pub trainer: TrainerConfig,
    /// Name recorded in the artifact metadata (defaults to the model name)
    pub artifact_name: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            task: TaskType::Classification,
            target_column: "target".to_string(),
            preprocessing: PreprocessingConfig::default(),
            trainer: TrainerConfig::default(),
            artifact_name: None,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration for `task` predicting `target_column`
    pub fn new(task: TaskType, target_column: impl Into<String>) -> Self {
        Self {
            task,
            target_column: target_column.into(),
            ..Default::default()
        }
    }

    /// Builder method to set preprocessing settings
    pub fn with_preprocessing(mut self, preprocessing: PreprocessingConfig) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    /// Builder method to set trainer settings
    pub fn with_trainer(mut self, trainer: TrainerConfig) -> Self {
        self.trainer = trainer;
        self
    }

    /// Builder method to name the artifact
    pub fn with_artifact_name(mut self, name: impl Into<String>) -> Self {
        self.artifact_name = Some(name.into());
        self
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&json).map_err(|e| {
            TabforgeError::ConfigError(format!("{}: {}", path.as_ref().display(), e))
        })
    }

    /// Save the configuration as JSON
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// What a pipeline run produces
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The persisted artifact, preprocessor included
    pub artifact: ModelArtifact,
    pub metrics: ModelMetrics,
    pub model_path: PathBuf,
}

/// Fit the preprocessor, train and evaluate the model, then save a single
/// artifact carrying both at the configured model path.
pub fn run_pipeline(df: &DataFrame, config: &PipelineConfig) -> Result<PipelineOutcome> {
    let target = config.target_column.as_str();
    if df.column(target).is_err() {
        return Err(TabforgeError::FeatureNotFound(target.to_string()));
    }

    let mut preprocessor =
        DataPreprocessor::with_config(config.preprocessing.clone().with_target(target));
    let transformed = preprocessor.fit_transform(df)?;

    if config.task == TaskType::Regression && preprocessor.target_encoder().is_some() {
        return Err(TabforgeError::ValidationError(format!(
            "regression target '{}' must be numeric",
            target
        )));
    }

    let feature_names = preprocessor.feature_columns().to_vec();
    if feature_names.is_empty() {
        return Err(TabforgeError::DataError(
            "no feature columns besides the target".to_string(),
        ));
    }

    let x = columns_to_array2(&transformed, &feature_names)?;
    let y = column_to_array1(&transformed, target)?;

    let outcome = fit_and_evaluate(config.task, &x, &y, &config.trainer)?;

    let mut metadata = outcome
        .metadata(&config.trainer, feature_names)
        .with_target(target);
    if let Some(ref name) = config.artifact_name {
        metadata.name = name.clone();
    }

    let artifact = ModelArtifact::new(outcome.model, metadata).with_preprocessor(preprocessor);
    let model_path = config.trainer.model_path_for(config.task);
    artifact.save(&model_path)?;
    info!(path = %model_path.display(), task = %config.task, "Pipeline artifact saved");

    Ok(PipelineOutcome {
        artifact,
        metrics: outcome.metrics,
        model_path,
    })
}
