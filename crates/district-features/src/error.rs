//! Error types for feature processing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the scaler and the dataset adapters.
///
/// Extraction itself never fails: malformed values count as zero.
#[derive(Error, Debug)]
pub enum FeatureError {
    /// `transform` or `inverse_transform` called before `fit`.
    #[error("Scaler not fitted yet")]
    NotFitted,

    /// Input width does not match the fitted or expected width.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected number of columns
        expected: usize,
        /// Actual number of columns
        actual: usize,
    },

    /// Two collections that must pair up have different lengths.
    #[error("Length mismatch: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        /// Which collection was wrong
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// A sequence sample has no timesteps.
    #[error("Sequence {index} is empty")]
    EmptySequence {
        /// Position of the sample
        index: usize,
    },

    /// Fitting on an empty matrix.
    #[error("Cannot fit scaler on an empty matrix")]
    EmptyInput,

    /// A batch referenced a sample that does not exist.
    #[error("Sample index {index} out of range for dataset of {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Dataset length
        len: usize,
    },

    /// I/O error while persisting scaler state.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Scaler state could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for feature operations.
pub type FeatureResult<T> = std::result::Result<T, FeatureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(FeatureError::NotFitted.to_string(), "Scaler not fitted yet");
        let err = FeatureError::DimensionMismatch {
            expected: 59,
            actual: 42,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 59, got 42");
    }
}
