//! Error types for model construction and inference.

use district_layers::LayerError;
use thiserror::Error;

/// Error type for model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A layer rejected its input or configuration.
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// Input width does not match the model.
    #[error("Input width mismatch: expected {expected} features, got {actual}")]
    InputWidth {
        /// Width the model was built for
        expected: usize,
        /// Width that was provided
        actual: usize,
    },

    /// Training inputs are unusable.
    #[error("Invalid training data: {message}")]
    InvalidTrainingData {
        /// What was wrong
        message: String,
    },

    /// A model configuration is invalid.
    #[error("Invalid model configuration: {message}")]
    InvalidConfig {
        /// What was wrong
        message: String,
    },
}

/// Result type alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
