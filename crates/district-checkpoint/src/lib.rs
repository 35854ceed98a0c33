//! Versioned artifact storage for district models.
//!
//! This crate provides functionality for:
//!
//! - **Versioning**: Monotonic per-model versions with committed metadata
//! - **Retention**: Automatic removal of the oldest versions
//! - **Artifacts**: JSON persistence of weights, scalers and metrics
//!
//! # Core Components
//!
//! - [`VersionManager`]: Hands out, commits, prunes and looks up versions
//! - [`VersionConfig`]: Base directory and retention bound
//! - [`VersionMetadata`]: Content of a model's `metadata.json`
//! - [`JsonArtifact`]: JSON read/write with path-aware errors
//!
//! # Examples
//!
//! ```no_run
//! use district_checkpoint::{JsonArtifact, VersionConfig, VersionManager};
//! use serde_json::Map;
//!
//! fn main() -> district_checkpoint::Result<()> {
//!     let manager = VersionManager::new(VersionConfig::new("/tmp/models").with_max_versions_keep(5))?;
//!
//!     // Write artifacts into a fresh version directory
//!     let (dir, version) = manager.next_version_dir("sales_lstm")?;
//!     JsonArtifact::new().save(&dir.join("model.pt"), &vec![0.1f32; 4])?;
//!
//!     // Make it the latest version
//!     manager.commit_version("sales_lstm", version, Map::new())?;
//!     let latest = manager.latest_version_dir("sales_lstm")?;
//!     assert_eq!(latest, Some(dir));
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod version;

pub use artifact::JsonArtifact;
pub use version::{ModelVersionSummary, VersionConfig, VersionManager, VersionMetadata};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during artifact and version operations.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// I/O error during artifact operations.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Artifact file not found.
    #[error("Artifact not found: {0}")]
    NotFound(PathBuf),

    /// Error during serialization.
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Error during deserialization.
    #[error("Deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Invalid version manager configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;
