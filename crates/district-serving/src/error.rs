//! Error types for the district-serving crate.
//!
//! None of these escape the manager's `train_*` or `predict_*` entry points;
//! they are logged and mapped to outcomes or `None` there.

use district_checkpoint::CheckpointError;
use district_features::FeatureError;
use district_models::ModelError;
use district_training::TrainingError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors raised by the upstream record source.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The source could not deliver a quarter's records.
    #[error("Records for quarter {quarter} unavailable: {message}")]
    Unavailable {
        /// Quarter code that was requested
        quarter: String,
        /// What went wrong
        message: String,
    },

    /// A record file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A record file is not a JSON array of objects.
    #[error("Malformed records in {path}: {source}")]
    Parse {
        /// File that failed
        path: PathBuf,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur while training, loading or serving models.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Too few samples to train a family.
    #[error("Not enough data to train {model}: {samples} samples, {required} required")]
    DataInsufficient {
        /// Family name
        model: &'static str,
        /// Samples available
        samples: usize,
        /// Minimum needed
        required: usize,
    },

    /// The scoring family needs a label source and none is configured.
    #[error("No location scorer configured for {model}")]
    ScorerUnavailable {
        /// Family name
        model: &'static str,
    },

    /// A persisted artifact could not be read back.
    #[error("Failed to load {model} from {path}: {source}")]
    ArtifactLoad {
        /// Family name
        model: &'static str,
        /// Version directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: Box<ManagerError>,
    },

    /// Fitting or evaluation failed.
    #[error("Training failed: {0}")]
    Training(#[from] TrainingError),

    /// Artifact storage failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Feature extraction, scaling or batching failed.
    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    /// A model rejected its input.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Upstream records could not be collected.
    #[error("Upstream data error: {0}")]
    Upstream(#[from] DataSourceError),

    /// A registry entry holds a model of another family.
    #[error("Expected a {expected} model, found {found}")]
    FamilyMismatch {
        /// Family the caller asked for
        expected: &'static str,
        /// Family that was stored
        found: &'static str,
    },

    /// A family name that is not one of the managed models.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// A blocking training task panicked or was cancelled.
    #[error("Training task failed: {0}")]
    TaskJoin(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong
        message: String,
    },

    /// A configuration or artifact file could not be read or removed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for [`crate::ManagerConfig`].
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[source] serde_json::Error),
}

impl ManagerError {
    /// Create an invalid configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// True for failures that mean "not enough to train on" rather than a
    /// broken run.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::DataInsufficient { .. } | Self::ScorerUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_classification() {
        let insufficient = ManagerError::DataInsufficient {
            model: "survival_mlp",
            samples: 3,
            required: 10,
        };
        assert!(insufficient.is_skip());
        assert!(insufficient.to_string().contains("3 samples, 10 required"));
        assert!(ManagerError::ScorerUnavailable { model: "scoring_ensemble" }.is_skip());
        assert!(!ManagerError::config("bad").is_skip());
    }

    #[test]
    fn test_artifact_load_keeps_source() {
        let err = ManagerError::ArtifactLoad {
            model: "sales_lstm",
            path: PathBuf::from("/models/sales_lstm/v3"),
            source: Box::new(ManagerError::UnknownModel("x".into())),
        };
        let text = err.to_string();
        assert!(text.contains("sales_lstm"));
        assert!(text.contains("/models/sales_lstm/v3"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
