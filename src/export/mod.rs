//! Model export and serialization module
//!
//! A trained model is persisted as a single [`ModelArtifact`]: metadata,
//! the fitted [`crate::preprocessing::DataPreprocessor`] (when the model was
//! trained through the pipeline) and the model itself, bincode encoded.

mod serializer;

pub use serializer::{ModelArtifact, ModelMetadata, ARTIFACT_MAGIC, FORMAT_VERSION};
