//! Error types for training and evaluation.

use district_features::FeatureError;
use district_models::ModelError;
use district_optimizer::OptimizerError;
use thiserror::Error;

/// Errors raised while fitting or evaluating a model.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// The model rejected its input or failed during backpropagation.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// A batch could not be assembled.
    #[error("Dataset error: {0}")]
    Feature(#[from] FeatureError),

    /// An optimizer could not be built.
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// There was nothing to train or evaluate on.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// Predictions and targets disagree in shape.
    #[error("Shape mismatch: predictions {predictions:?}, targets {targets:?}")]
    ShapeMismatch {
        /// Shape of the model output
        predictions: Vec<usize>,
        /// Shape of the target tensor
        targets: Vec<usize>,
    },

    /// The loss became NaN or infinite.
    #[error("Non-finite loss {value} at epoch {epoch}")]
    NonFiniteLoss {
        /// Offending value
        value: f64,
        /// 1-based epoch in which it appeared
        epoch: usize,
    },

    /// A trainer setting is out of range.
    #[error("Invalid trainer config: {message}")]
    InvalidConfig {
        /// What is wrong
        message: String,
    },
}

/// Result type for training operations.
pub type TrainingResult<T> = std::result::Result<T, TrainingError>;
