//! Model artifact serialization
//!
//! On-disk layout: the four magic bytes `TBFG` followed by a bincode
//! encoded [`Envelope`] holding the format version, the metadata and the
//! bincode payload (preprocessor + model) with its checksum.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Result, TabforgeError};
use crate::preprocessing::DataPreprocessor;
use crate::training::{columns_to_array2, TaskType, TrainedModel};
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;

/// Magic bytes of artifact files
pub const ARTIFACT_MAGIC: [u8; 4] = *b"TBFG";
/// Current format version
pub const FORMAT_VERSION: u32 = 1;

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,
    /// Version of the crate that wrote the artifact
    pub version: String,
    /// Training timestamp (RFC 3339)
    pub trained_at: String,
    /// Task the model solves
    pub task: TaskType,
    /// Feature names, in model input order
    pub feature_names: Vec<String>,
    /// Target name
    pub target_name: Option<String>,
    /// Hyperparameters
    pub hyperparameters: HashMap<String, String>,
    /// Held-out metrics
    pub metrics: HashMap<String, f64>,
}

impl ModelMetadata {
    /// Create new metadata stamped with the current time
    pub fn new(name: impl Into<String>, task: TaskType) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Utc::now().to_rfc3339(),
            task,
            feature_names: Vec::new(),
            target_name: None,
            hyperparameters: HashMap::new(),
            metrics: HashMap::new(),
        }
    }

    /// Set feature names
    pub fn with_feature_names(mut self, features: Vec<String>) -> Self {
        self.feature_names = features;
        self
    }

    /// Set target name
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_name = Some(target.into());
        self
    }

    /// Add hyperparameter
    pub fn with_hyperparameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.hyperparameters.insert(key.into(), value.to_string());
        self
    }

    /// Add metric
    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    metadata: ModelMetadata,
    payload: Vec<u8>,
    checksum: u64,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    preprocessor: Option<DataPreprocessor>,
    model: TrainedModel,
}

/// FNV-1a hash of the payload
fn compute_checksum(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    data.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ *byte as u64).wrapping_mul(FNV_PRIME)
    })
}

/// A fitted model bundled with the transformer that produced its inputs
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub metadata: ModelMetadata,
    pub preprocessor: Option<DataPreprocessor>,
    pub model: TrainedModel,
}

impl ModelArtifact {
    /// Bundle a model without a preprocessor
    pub fn new(model: TrainedModel, metadata: ModelMetadata) -> Self {
        Self {
            metadata,
            preprocessor: None,
            model,
        }
    }

    /// Attach the fitted preprocessor
    pub fn with_preprocessor(mut self, preprocessor: DataPreprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Write the artifact. The parent directory must already exist.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let payload = bincode::serialize(&Payload {
            preprocessor: self.preprocessor.clone(),
            model: self.model.clone(),
        })?;

        let envelope = Envelope {
            format_version: FORMAT_VERSION,
            metadata: self.metadata.clone(),
            checksum: compute_checksum(&payload),
            payload,
        };

        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&ARTIFACT_MAGIC)?;
        bincode::serialize_into(&mut writer, &envelope)?;
        writer.flush()?;

        Ok(())
    }

    /// Read an artifact written by [`ModelArtifact::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let envelope = Self::read_envelope(path.as_ref())?;

        if compute_checksum(&envelope.payload) != envelope.checksum {
            return Err(TabforgeError::SerializationError(
                "Checksum verification failed - file may be corrupted".to_string(),
            ));
        }

        let payload: Payload = bincode::deserialize(&envelope.payload)?;

        Ok(Self {
            metadata: envelope.metadata,
            preprocessor: payload.preprocessor,
            model: payload.model,
        })
    }

    /// Read only the metadata of an artifact
    pub fn read_metadata(path: impl AsRef<Path>) -> Result<ModelMetadata> {
        Ok(Self::read_envelope(path.as_ref())?.metadata)
    }

    fn read_envelope(path: &Path) -> Result<Envelope> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|_| {
            TabforgeError::SerializationError(format!("{} is not a model artifact", path.display()))
        })?;
        if magic != ARTIFACT_MAGIC {
            return Err(TabforgeError::SerializationError(format!(
                "{} is not a model artifact (bad magic bytes)",
                path.display()
            )));
        }

        let envelope: Envelope = bincode::deserialize_from(reader)?;
        if envelope.format_version > FORMAT_VERSION {
            return Err(TabforgeError::SerializationError(format!(
                "artifact format version {} is newer than supported version {}",
                envelope.format_version, FORMAT_VERSION
            )));
        }

        Ok(envelope)
    }

    /// Predict on raw data. The stored preprocessor, if any, is applied
    /// first; the target column may be present and is ignored.
    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let x = match self.preprocessor {
            Some(ref preprocessor) => {
                let transformed = preprocessor.transform(df)?;
                columns_to_array2(&transformed, &self.metadata.feature_names)?
            }
            None => columns_to_array2(df, &self.metadata.feature_names)?,
        };
        self.predict_array(&x)
    }

    /// Predict on an already numeric feature matrix
    pub fn predict_array(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.model.predict(x)
    }

    /// Predictions rendered as strings; encoded class labels are mapped
    /// back to their original category.
    pub fn predict_labels(&self, df: &DataFrame) -> Result<Vec<String>> {
        let predictions = self.predict(df)?;

        let decoder = self.preprocessor.as_ref().and_then(|p| {
            let target = p.target_column()?;
            Some((p.target_encoder()?, target))
        });

        match (self.model.task(), decoder) {
            (TaskType::Classification, Some((encoder, target))) => predictions
                .iter()
                .map(|&code| {
                    encoder
                        .decode(target, code as usize)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            TabforgeError::ValidationError(format!(
                                "predicted code {} has no category in '{}'",
                                code, target
                            ))
                        })
                })
                .collect(),
            _ => Ok(predictions.iter().map(|v| v.to_string()).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::RandomForest;
    use ndarray::array;
    use tempfile::tempdir;

    fn fitted_regressor() -> TrainedModel {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut rf = RandomForest::new_regressor(5).with_random_state(3);
        rf.fit(&x, &y).unwrap();
        TrainedModel::RandomForestRegressor(rf)
    }

    #[test]
    fn test_checksum_stable() {
        assert_eq!(compute_checksum(b""), 14695981039346656037);
        assert_ne!(compute_checksum(b"a"), compute_checksum(b"b"));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.pkl");

        let model = fitted_regressor();
        let metadata = ModelMetadata::new(model.name(), TaskType::Regression)
            .with_feature_names(vec!["x0".to_string()])
            .with_metric("rmse", 0.5);
        let artifact = ModelArtifact::new(model, metadata);
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        let x = array![[1.5], [3.5]];
        assert_eq!(
            artifact.predict_array(&x).unwrap(),
            loaded.predict_array(&x).unwrap()
        );
        assert_eq!(loaded.metadata.metrics["rmse"], 0.5);
        assert_eq!(loaded.metadata.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.pkl");
        std::fs::write(&path, b"JUNK and more bytes").unwrap();

        assert!(matches!(
            ModelArtifact::load(&path),
            Err(TabforgeError::SerializationError(_))
        ));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("model.pkl");

        let model = fitted_regressor();
        let artifact = ModelArtifact::new(model, ModelMetadata::new("m", TaskType::Regression));
        assert!(matches!(artifact.save(&path), Err(TabforgeError::IoError(_))));
    }

    #[test]
    fn test_corrupted_payload_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.pkl");

        let artifact = ModelArtifact::new(
            fitted_regressor(),
            ModelMetadata::new("m", TaskType::Regression),
        );
        artifact.save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 9;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(ModelArtifact::load(&path).is_err());
    }
}
