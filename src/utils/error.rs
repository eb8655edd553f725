//! Error Handling Module
//!
//! Defines the error type shared by the dataset adapter, the network driver
//! and the evaluators. Uses thiserror for ergonomic error definitions.
//!
//! None of these errors are recovered from inside the library: a malformed
//! array on disk, a shape mismatch or a failed checkpoint write aborts the run.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for plume segmentation operations
#[derive(Error, Debug)]
pub enum PlumeError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A numeric array file could not be read or decoded
    #[error("Failed to read array at '{0}': {1}")]
    Npy(PathBuf, String),

    /// The sample index could not be read
    #[error("Failed to read index '{0}': {1}")]
    Csv(PathBuf, String),

    /// Tensor or array dimensions do not line up
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint save/load failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Convenience Result type for plume segmentation operations
pub type Result<T> = std::result::Result<T, PlumeError>;

impl From<serde_json::Error> for PlumeError {
    fn from(err: serde_json::Error) -> Self {
        PlumeError::Serialization(err.to_string())
    }
}
