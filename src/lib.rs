//! Tabforge - tabular preprocessing and random forest training
//!
//! This crate turns a raw mixed-type table into a model-ready numeric one
//! and trains, evaluates and persists a random forest on it:
//! - Mean imputation, label encoding, standard scaling
//! - Random forest classification and regression on a random 80/20 split
//! - A single artifact holding the fitted preprocessor and the model
//!
//! # Modules
//!
//! - [`preprocessing`] - Fitted transformer (impute, encode, scale)
//! - [`training`] - Decision trees, random forests, split and metrics
//! - [`export`] - Model artifact serialization
//! - [`pipeline`] - Preprocess, train and persist in one call
//! - [`utils`] - CSV loading and saving
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core ML modules
pub mod preprocessing;
pub mod training;
pub mod export;
pub mod pipeline;

// Services
pub mod cli;
pub mod utils;

pub use error::{Result, TabforgeError};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Result, TabforgeError};

    // Preprocessing
    pub use crate::preprocessing::{
        preprocess_data, DataPreprocessor, Encoder, ImputeStrategy, Imputer, PreprocessingConfig,
        Scaler,
    };

    // Training
    pub use crate::training::{
        fit_and_evaluate, train_classification_model, train_regression_model, train_test_split,
        MaxFeatures, ModelMetrics, RandomForest, TaskType, TrainedModel, TrainerConfig,
        TrainingOutcome,
    };

    // Export
    pub use crate::export::{ModelArtifact, ModelMetadata};

    // Pipeline
    pub use crate::pipeline::{run_pipeline, PipelineConfig, PipelineOutcome};

    // Data loading
    pub use crate::utils::{DataLoader, DataSaver};
}
