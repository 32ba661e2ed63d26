//! Training engine: split, fit, evaluate, persist

use super::config::{TaskType, TrainerConfig};
use super::models::ModelMetrics;
use super::random_forest::RandomForest;
use super::split::train_test_split;
use crate::error::{Result, TabforgeError};
use crate::export::{ModelArtifact, ModelMetadata};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Enum to hold trained model variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    RandomForestClassifier(RandomForest),
    RandomForestRegressor(RandomForest),
}

impl TrainedModel {
    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.forest().predict(x)
    }

    /// The task this model was trained for
    pub fn task(&self) -> TaskType {
        match self {
            TrainedModel::RandomForestClassifier(_) => TaskType::Classification,
            TrainedModel::RandomForestRegressor(_) => TaskType::Regression,
        }
    }

    /// Underlying forest
    pub fn forest(&self) -> &RandomForest {
        match self {
            TrainedModel::RandomForestClassifier(m) | TrainedModel::RandomForestRegressor(m) => m,
        }
    }

    /// Human readable model name
    pub fn name(&self) -> &'static str {
        match self {
            TrainedModel::RandomForestClassifier(_) => "RandomForestClassifier",
            TrainedModel::RandomForestRegressor(_) => "RandomForestRegressor",
        }
    }

    /// Number of input features
    pub fn n_features(&self) -> usize {
        self.forest().n_features()
    }
}

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    /// Scores on the held-out rows
    pub metrics: ModelMetrics,
    pub split_seed: u64,
    pub forest_seed: u64,
    /// Where the artifact was written, `None` when nothing was persisted
    pub model_path: Option<PathBuf>,
}

impl TrainingOutcome {
    /// Metadata describing this run, for the persisted artifact
    pub fn metadata(&self, config: &TrainerConfig, feature_names: Vec<String>) -> ModelMetadata {
        let forest = self.model.forest();
        let mut metadata = ModelMetadata::new(self.model.name(), self.model.task())
            .with_feature_names(feature_names)
            .with_hyperparameter("n_estimators", forest.n_estimators)
            .with_hyperparameter("max_features", format!("{:?}", forest.max_features))
            .with_hyperparameter("min_samples_split", forest.min_samples_split)
            .with_hyperparameter("min_samples_leaf", forest.min_samples_leaf)
            .with_hyperparameter("bootstrap", forest.bootstrap)
            .with_hyperparameter("test_size", config.test_size)
            .with_hyperparameter("split_seed", self.split_seed)
            .with_hyperparameter("forest_seed", self.forest_seed);
        if let Some(depth) = forest.max_depth {
            metadata = metadata.with_hyperparameter("max_depth", depth);
        }
        for (name, value) in self.metrics.to_map() {
            metadata = metadata.with_metric(name, value);
        }
        metadata
    }
}

fn validate_inputs(task: TaskType, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(TabforgeError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(TabforgeError::DataError("empty feature matrix".to_string()));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(TabforgeError::ValidationError(
            "feature matrix contains NaN or infinite values".to_string(),
        ));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(TabforgeError::ValidationError(
            "target contains NaN or infinite values".to_string(),
        ));
    }

    if task == TaskType::Classification {
        let first = y[0];
        if y.iter().all(|&v| v == first) {
            return Err(TabforgeError::ValidationError(
                "classification needs at least two distinct classes".to_string(),
            ));
        }
    }

    Ok(())
}

fn build_forest(task: TaskType, config: &TrainerConfig, seed: u64) -> RandomForest {
    let mut forest = match task {
        TaskType::Classification => RandomForest::new_classifier(config.n_estimators),
        TaskType::Regression => RandomForest::new_regressor(config.n_estimators),
    };
    if let Some(depth) = config.max_depth {
        forest = forest.with_max_depth(depth);
    }
    if let Some(max_features) = config.max_features {
        forest = forest.with_max_features(max_features);
    }
    forest
        .with_min_samples_split(config.min_samples_split)
        .with_min_samples_leaf(config.min_samples_leaf)
        .with_bootstrap(config.bootstrap)
        .with_random_state(seed)
}

/// Split, fit a random forest on the training rows and score it on the
/// held-out rows. Nothing is written to disk.
pub fn fit_and_evaluate(
    task: TaskType,
    x: &Array2<f64>,
    y: &Array1<f64>,
    config: &TrainerConfig,
) -> Result<TrainingOutcome> {
    let start = Instant::now();

    config.validate()?;
    validate_inputs(task, x, y)?;

    let split = train_test_split(x, y, config.test_size, config.split_seed)?;
    let forest_seed = config.forest_seed.unwrap_or_else(|| {
        let mut rng = ChaCha8Rng::seed_from_u64(split.seed);
        rng.set_stream(1);
        rng.next_u64()
    });

    debug!(
        n_train = split.x_train.nrows(),
        n_test = split.x_test.nrows(),
        split_seed = split.seed,
        forest_seed,
        "Split data"
    );

    let mut forest = build_forest(task, config, forest_seed);
    forest.fit(&split.x_train, &split.y_train)?;

    let model = match task {
        TaskType::Classification => TrainedModel::RandomForestClassifier(forest),
        TaskType::Regression => TrainedModel::RandomForestRegressor(forest),
    };

    let y_pred = model.predict(&split.x_test)?;
    let mut metrics = ModelMetrics::compute(task, &split.y_test, &y_pred);
    metrics.n_train = split.x_train.nrows();
    metrics.n_features = x.ncols();
    metrics.training_time_secs = start.elapsed().as_secs_f64();

    if let Some((label, value)) = metrics.headline() {
        info!(
            model = model.name(),
            metric = label,
            value,
            n_train = metrics.n_train,
            n_test = metrics.n_test,
            "Model evaluated"
        );
    }

    Ok(TrainingOutcome {
        model,
        metrics,
        split_seed: split.seed,
        forest_seed,
        model_path: None,
    })
}

fn train_and_persist(
    task: TaskType,
    x: &Array2<f64>,
    y: &Array1<f64>,
    config: &TrainerConfig,
) -> Result<TrainingOutcome> {
    let mut outcome = fit_and_evaluate(task, x, y, config)?;

    let feature_names = (0..x.ncols()).map(|i| format!("x{}", i)).collect();
    let metadata = outcome.metadata(config, feature_names);
    let path = config.model_path_for(task);

    ModelArtifact::new(outcome.model.clone(), metadata).save(&path)?;
    info!(path = %path.display(), "Model saved");

    if config.print_metric {
        if let Some(line) = outcome.metrics.headline_line() {
            println!("{}", line);
        }
    }

    outcome.model_path = Some(path);
    Ok(outcome)
}

/// Train a random forest classifier, save it to the configured path
/// (`../models/classification_model.pkl` by default) and print
/// `Accuracy: <v>` for the held-out rows.
pub fn train_classification_model(
    x: &Array2<f64>,
    y: &Array1<f64>,
    config: &TrainerConfig,
) -> Result<TrainingOutcome> {
    train_and_persist(TaskType::Classification, x, y, config)
}

/// Train a random forest regressor, save it to the configured path
/// (`../models/regression_model.pkl` by default) and print `RMSE: <v>`
/// for the held-out rows.
pub fn train_regression_model(
    x: &Array2<f64>,
    y: &Array1<f64>,
    config: &TrainerConfig,
) -> Result<TrainingOutcome> {
    train_and_persist(TaskType::Regression, x, y, config)
}

/// Extract named columns from a DataFrame into a row-major `Array2<f64>`.
/// Missing values are an error.
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = col_names.len();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|col_name| column_to_vec(df, col_name))
        .collect::<Result<Vec<Vec<f64>>>>()?;

    Ok(Array2::from_shape_fn((n_rows, n_cols), |(r, c)| col_data[c][r]))
}

/// Extract one column as a target vector
pub fn column_to_array1(df: &DataFrame, col_name: &str) -> Result<Array1<f64>> {
    Ok(Array1::from_vec(column_to_vec(df, col_name)?))
}

fn column_to_vec(df: &DataFrame, col_name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(col_name)
        .map_err(|_| TabforgeError::FeatureNotFound(col_name.to_string()))?;
    let series_f64 = series
        .cast(&DataType::Float64)
        .map_err(|e| TabforgeError::DataError(e.to_string()))?;

    series_f64
        .f64()
        .map_err(|e| TabforgeError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| {
                TabforgeError::DataError(format!("column '{}' has missing values", col_name))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let base = if i % 2 == 0 { 0.0 } else { 10.0 };
            base + (i * 7 + j * 3) as f64 % 5.0 * 0.1
        });
        let y = Array1::from_shape_fn(n, |i| (i % 2) as f64);
        (x, y)
    }

    #[test]
    fn test_fit_and_evaluate_classification() {
        let (x, y) = blobs(40);
        let config = TrainerConfig::new().with_split_seed(1).with_n_estimators(10);

        let outcome = fit_and_evaluate(TaskType::Classification, &x, &y, &config).unwrap();
        assert_eq!(outcome.metrics.accuracy, Some(1.0));
        assert_eq!(outcome.metrics.n_test, 8);
        assert_eq!(outcome.metrics.n_train, 32);
        assert_eq!(outcome.model.task(), TaskType::Classification);
        assert_eq!(outcome.model.predict(&x).unwrap().len(), 40);
        assert!(outcome.model_path.is_none());
    }

    #[test]
    fn test_fit_and_evaluate_regression() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(30, |i| 2.0 * i as f64 + 1.0);
        let config = TrainerConfig::new().with_split_seed(3).with_n_estimators(10);

        let outcome = fit_and_evaluate(TaskType::Regression, &x, &y, &config).unwrap();
        let rmse = outcome.metrics.rmse.unwrap();
        assert!(rmse >= 0.0);
        assert!(rmse < 10.0, "RMSE too high: {}", rmse);
    }

    #[test]
    fn test_seeds_make_runs_reproducible() {
        let (x, y) = blobs(30);
        let config = TrainerConfig::new().with_split_seed(11).with_n_estimators(5);

        let a = fit_and_evaluate(TaskType::Regression, &x, &y, &config).unwrap();
        let b = fit_and_evaluate(TaskType::Regression, &x, &y, &config).unwrap();
        assert_eq!(a.metrics.rmse, b.metrics.rmse);
        assert_eq!(a.forest_seed, b.forest_seed);
    }

    #[test]
    fn test_trainers_report_labeled_metric() {
        let dir = tempfile::tempdir().unwrap();
        let (x, y) = blobs(40);
        let config = TrainerConfig::new()
            .with_split_seed(1)
            .with_n_estimators(5)
            .with_model_path(dir.path().join("model.pkl"));
        assert!(config.print_metric);

        let clf = train_classification_model(&x, &y, &config).unwrap();
        assert_eq!(clf.metrics.headline_line().as_deref(), Some("Accuracy: 1"));

        let reg = train_regression_model(&x, &y, &config).unwrap();
        let line = reg.metrics.headline_line().unwrap();
        assert!(line.starts_with("RMSE: "), "{}", line);
        assert!(line["RMSE: ".len()..].parse::<f64>().unwrap() >= 0.0);
    }

    #[test]
    fn test_single_class_rejected() {
        let x = Array2::zeros((10, 2));
        let y = Array1::ones(10);
        let result = fit_and_evaluate(TaskType::Classification, &x, &y, &TrainerConfig::new());
        assert!(matches!(result, Err(TabforgeError::ValidationError(_))));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let x = Array2::zeros((10, 2));
        let y = Array1::zeros(9);
        let result = fit_and_evaluate(TaskType::Regression, &x, &y, &TrainerConfig::new());
        assert!(matches!(result, Err(TabforgeError::ShapeError { .. })));
    }

    #[test]
    fn test_nan_rejected() {
        let mut x = Array2::zeros((10, 1));
        x[[3, 0]] = f64::NAN;
        let y = Array1::from_shape_fn(10, |i| i as f64);
        let result = fit_and_evaluate(TaskType::Regression, &x, &y, &TrainerConfig::new());
        assert!(matches!(result, Err(TabforgeError::ValidationError(_))));
    }

    #[test]
    fn test_columns_to_array2() {
        let df = df!(
            "a" => &[1.0, 2.0, 3.0],
            "b" => &[4i64, 5, 6]
        )
        .unwrap();

        let x = columns_to_array2(&df, &["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(x.shape(), &[3, 2]);
        assert_eq!(x[[2, 1]], 6.0);

        assert!(matches!(
            columns_to_array2(&df, &["missing".to_string()]),
            Err(TabforgeError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_columns_with_nulls_rejected() {
        let df = df!("a" => &[Some(1.0), None]).unwrap();
        assert!(column_to_array1(&df, "a").is_err());
    }
}
