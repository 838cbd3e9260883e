//! Error types for the model service

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for model service operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Reasons a caller-supplied feature matrix is rejected before scoring
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("feature matrix has no rows")]
    Empty,

    #[error("row {row} has {actual} features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("row {row}, column {column} is not a finite number")]
    NonFinite { row: usize, column: usize },
}

/// Main error type for the model lifecycle
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Dataset invalid: {0}")]
    DatasetInvalid(String),

    #[error("Model store IO error at {}: {reason}", path.display())]
    StoreIo { path: PathBuf, reason: String },

    #[error("Training failed: {0}")]
    TrainingFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[source] Box<ModelError>),
}

impl ModelError {
    pub(crate) fn store_io(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ModelError::StoreIo {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap an initialization failure, keeping the underlying cause.
    pub(crate) fn unavailable(cause: ModelError) -> Self {
        match cause {
            already @ ModelError::ModelUnavailable(_) => already,
            other => ModelError::ModelUnavailable(Box::new(other)),
        }
    }

    /// Whether the error was caused by caller-supplied data rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ModelError::InvalidInput(_) | ModelError::DatasetInvalid(_) | ModelError::TrainingFailed(_)
        )
    }
}
