//! Model training module
//!
//! Random forest classification and regression on a random train/test
//! partition:
//! - CART decision trees with per-split feature sampling
//! - Bagged forests fit in parallel
//! - Held-out accuracy / RMSE
//! - Persisting the fitted model as a [`crate::export::ModelArtifact`]

mod config;
mod engine;
mod models;
pub mod decision_tree;
pub mod random_forest;
pub mod split;

pub use config::{TaskType, TrainerConfig};
pub use engine::{
    column_to_array1, columns_to_array2, fit_and_evaluate, train_classification_model,
    train_regression_model, TrainedModel, TrainingOutcome,
};
pub use models::ModelMetrics;
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use random_forest::{MaxFeatures, RandomForest};
pub use split::{train_test_split, TrainTestSplit};
