//! Error types for the district-layers crate.
//!
//! This module defines error types for neural network layer operations,
//! including shape mismatches, missing forward caches, and invalid
//! configurations.

use thiserror::Error;

/// Error type for layer operations.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Shape mismatch between expected and actual tensor shapes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape
        expected: Vec<usize>,
        /// The actual shape that was provided
        actual: Vec<usize>,
    },

    /// Invalid input dimension for the layer.
    #[error("Invalid input dimension: expected {expected}, got {actual}")]
    InvalidInputDimension {
        /// The expected input dimension
        expected: usize,
        /// The actual input dimension
        actual: usize,
    },

    /// Error during forward pass computation.
    #[error("Forward pass error: {message}")]
    ForwardError {
        /// Description of the forward pass error
        message: String,
    },

    /// Layer has not been run forward in training mode.
    #[error("Layer not initialized: forward_train must be called before backward")]
    NotInitialized,

    /// Configuration error for the layer.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// Embedding lookup error.
    #[error("Embedding lookup error: index {index} out of range for {num_embeddings} embeddings")]
    EmbeddingOutOfRange {
        /// The requested row
        index: usize,
        /// Number of rows in the table
        num_embeddings: usize,
    },
}

/// Result type alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;
