use std::path::PathBuf;
use thiserror::Error;

pub use crate::embedding::EmbeddingError;
pub use crate::index::IndexError;
pub use crate::learning::LearningError;

/// Main error type for Feedsense
#[derive(Error, Debug)]
pub enum FeedsenseError {
    /// Malformed article, interaction or request rejected at a boundary
    #[error("Validation error: {0}")]
    Validation(String),

    /// Normalization or chunking failed for a single item
    #[error("Processing error: {0}")]
    Processing(String),

    /// Embedding backend failure (after retries were exhausted)
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Corrupt or missing persisted index, dimension mismatch
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Malformed interaction event
    #[error(transparent)]
    Learning(#[from] LearningError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Feedsense operations
pub type Result<T> = std::result::Result<T, FeedsenseError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn load_index() -> Result<()> {
        Err(IndexError::DimensionMismatch {
            expected: 384,
            actual: 3,
        })?;
        Ok(())
    }

    #[test]
    fn test_module_errors_keep_their_variant() {
        let err = load_index().unwrap_err();
        assert!(matches!(
            err,
            FeedsenseError::Index(IndexError::DimensionMismatch {
                expected: 384,
                actual: 3
            })
        ));
        assert_eq!(err.to_string(), "Invalid dimension: expected 384, got 3");
    }
}
