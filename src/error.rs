//! Error types for the tabforge pipeline

use thiserror::Error;

/// Result type alias for tabforge operations
pub type Result<T> = std::result::Result<T, TabforgeError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum TabforgeError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Preprocessing error: {0}")]
    PreprocessingError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Unknown category '{value}' in column '{column}'")]
    UnknownCategory { column: String, value: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<polars::error::PolarsError> for TabforgeError {
    fn from(err: polars::error::PolarsError) -> Self {
        TabforgeError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for TabforgeError {
    fn from(err: serde_json::Error) -> Self {
        TabforgeError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for TabforgeError {
    fn from(err: bincode::Error) -> Self {
        TabforgeError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TabforgeError {
    fn from(err: ndarray::ShapeError) -> Self {
        TabforgeError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TabforgeError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_unknown_category_display() {
        let err = TabforgeError::UnknownCategory {
            column: "city".to_string(),
            value: "Paris".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown category 'Paris' in column 'city'");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TabforgeError = io_err.into();
        assert!(matches!(err, TabforgeError::IoError(_)));
    }
}
