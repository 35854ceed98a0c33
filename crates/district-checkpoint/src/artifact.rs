//! JSON artifact files.
//!
//! Model weights, scaler state, metrics and version metadata are all
//! persisted as JSON through [`JsonArtifact`].

use crate::{CheckpointError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Reads and writes serde values as JSON files.
///
/// # Examples
///
/// ```no_run
/// use district_checkpoint::JsonArtifact;
/// use std::path::Path;
///
/// fn main() -> district_checkpoint::Result<()> {
///     let artifact = JsonArtifact::pretty();
///     artifact.save(Path::new("/tmp/models/weights.json"), &vec![0.5f32, 1.5])?;
///     let weights: Vec<f32> = artifact.restore(Path::new("/tmp/models/weights.json"))?;
///     assert_eq!(weights.len(), 2);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArtifact {
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
}

impl JsonArtifact {
    /// Compact output.
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Indented output.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Serializes `value` to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or I/O fails.
    pub fn save<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CheckpointError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(CheckpointError::Serialization)?;

        std::fs::write(path, json).map_err(|e| CheckpointError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(
            path = %path.display(),
            size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            "Artifact written"
        );
        Ok(())
    }

    /// Deserializes the value stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::NotFound`] when the file is missing and
    /// [`CheckpointError::Deserialization`] when its content does not parse.
    pub fn restore<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        if !path.exists() {
            return Err(CheckpointError::NotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path).map_err(|e| CheckpointError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let value = serde_json::from_str(&json).map_err(CheckpointError::Deserialization)?;
        tracing::debug!(path = %path.display(), "Artifact read");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn test_save_creates_parents_and_restores() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("value.json");
        let value = BTreeMap::from([("mean".to_string(), vec![1.0, 2.0])]);
        JsonArtifact::new().save(&path, &value).unwrap();
        let restored: BTreeMap<String, Vec<f64>> = JsonArtifact::new().restore(&path).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = JsonArtifact::new()
            .restore::<Vec<f32>>(&dir.path().join("missing.json"))
            .expect_err("restoring a missing artifact should fail");
        assert!(
            matches!(&err, CheckpointError::NotFound(path) if path.ends_with("missing.json")),
            "expected NotFound, got: {err:?}"
        );
    }

    #[test]
    fn test_corrupt_file_is_deserialization_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonArtifact::new().restore::<Vec<f32>>(&path),
            Err(CheckpointError::Deserialization(_))
        ));
    }
}
