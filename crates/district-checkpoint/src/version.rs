//! Per-model version tracking.
//!
//! Each model owns a directory under the base directory:
//!
//! ```text
//! <base_dir>/<model>/metadata.json     {"latest_version": N, "versions": [...]}
//! <base_dir>/<model>/v<N>/...          artifacts of version N
//! <base_dir>/<model>/v<N>/metrics.json metrics recorded at commit
//! ```
//!
//! A version becomes visible only when [`VersionManager::commit_version`]
//! updates the metadata. Directories handed out by
//! [`VersionManager::next_version_dir`] that were never committed are
//! invisible; the next attempt empties and reuses them.

use crate::artifact::JsonArtifact;
use crate::{CheckpointError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const METADATA_FILE: &str = "metadata.json";
const METRICS_FILE: &str = "metrics.json";

/// Configuration for the version manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Directory holding one subdirectory per model.
    pub base_dir: PathBuf,

    /// Maximum number of versions kept per model.
    /// Older versions are deleted on commit.
    pub max_versions_keep: usize,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("models"),
            max_versions_keep: 5,
        }
    }
}

impl VersionConfig {
    /// Create a new version configuration.
    ///
    /// # Arguments
    ///
    /// * `base_dir` - Directory where model versions will be stored
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of versions to keep.
    pub fn with_max_versions_keep(mut self, max_versions_keep: usize) -> Self {
        self.max_versions_keep = max_versions_keep;
        self
    }
}

/// Content of a model's `metadata.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// Last committed version, 0 when none.
    pub latest_version: u32,
    /// Retained versions in ascending order.
    pub versions: Vec<u32>,
}

/// Latest version and metrics of one model, as listed by
/// [`VersionManager::get_all_metrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersionSummary {
    /// Latest committed version.
    pub version: u32,
    /// Metrics recorded with it.
    pub metrics: Map<String, Value>,
}

/// Hands out, commits, prunes and looks up model versions.
///
/// All state lives on disk; the manager itself is immutable and can be
/// shared between threads.
///
/// # Examples
///
/// ```no_run
/// use district_checkpoint::{VersionConfig, VersionManager};
/// use serde_json::Map;
///
/// fn main() -> district_checkpoint::Result<()> {
///     let manager = VersionManager::new(VersionConfig::new("/tmp/models").with_max_versions_keep(3))?;
///
///     let (dir, version) = manager.next_version_dir("survival_mlp")?;
///     std::fs::write(dir.join("model.pt"), b"{}").ok();
///     manager.commit_version("survival_mlp", version, Map::new())?;
///
///     assert_eq!(manager.latest_version("survival_mlp")?, version);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct VersionManager {
    config: VersionConfig,
    artifact: JsonArtifact,
}

impl VersionManager {
    /// Create a version manager, creating the base directory.
    ///
    /// # Errors
    ///
    /// Fails when `max_versions_keep` is 0 or the base directory cannot be
    /// created.
    pub fn new(config: VersionConfig) -> Result<Self> {
        if config.max_versions_keep == 0 {
            return Err(CheckpointError::InvalidConfig(
                "max_versions_keep must be at least 1".into(),
            ));
        }
        std::fs::create_dir_all(&config.base_dir).map_err(|e| CheckpointError::Io {
            path: config.base_dir.clone(),
            source: e,
        })?;
        Ok(Self {
            config,
            artifact: JsonArtifact::pretty(),
        })
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// Get the configuration.
    pub fn config(&self) -> &VersionConfig {
        &self.config
    }

    fn model_dir(&self, model_name: &str) -> PathBuf {
        self.config.base_dir.join(model_name)
    }

    /// Directory of `version` for `model_name`, whether or not it exists.
    pub fn version_dir(&self, model_name: &str, version: u32) -> PathBuf {
        self.model_dir(model_name).join(format!("v{version}"))
    }

    fn metadata_path(&self, model_name: &str) -> PathBuf {
        self.model_dir(model_name).join(METADATA_FILE)
    }

    /// Reads a model's metadata; a model never committed has the default.
    pub fn load_metadata(&self, model_name: &str) -> Result<VersionMetadata> {
        let path = self.metadata_path(model_name);
        if !path.exists() {
            return Ok(VersionMetadata::default());
        }
        self.artifact.restore(&path)
    }

    fn save_metadata(&self, model_name: &str, metadata: &VersionMetadata) -> Result<()> {
        self.artifact.save(&self.metadata_path(model_name), metadata)
    }

    /// Creates an empty directory for the version after the latest one.
    ///
    /// The metadata is left untouched, so calling this twice without a
    /// commit returns the same version. Files left there by an abandoned
    /// attempt are removed.
    pub fn next_version_dir(&self, model_name: &str) -> Result<(PathBuf, u32)> {
        let version = self.load_metadata(model_name)?.latest_version + 1;
        let dir = self.version_dir(model_name, version);
        let io_err = |e| CheckpointError::Io {
            path: dir.clone(),
            source: e,
        };
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(io_err)?;
            tracing::warn!(model = model_name, version, path = %dir.display(), "Cleared uncommitted version directory");
        }
        std::fs::create_dir_all(&dir).map_err(io_err)?;
        tracing::debug!(model = model_name, version, path = %dir.display(), "Prepared version directory");
        Ok((dir, version))
    }

    /// Makes `version` the latest one.
    ///
    /// Stamps `trained_at` into `metrics`, writes `metrics.json` into the
    /// version directory, updates the metadata and prunes versions beyond
    /// `max_versions_keep`. The steps are not atomic: a crash between them
    /// can leave metrics without metadata.
    pub fn commit_version(&self, model_name: &str, version: u32, mut metrics: Map<String, Value>) -> Result<()> {
        let mut metadata = self.load_metadata(model_name)?;
        metadata.latest_version = version;
        if !metadata.versions.contains(&version) {
            metadata.versions.push(version);
        }

        let trained_at = chrono::Local::now()
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        metrics.insert("trained_at".into(), Value::String(trained_at));
        let metrics_path = self.version_dir(model_name, version).join(METRICS_FILE);
        self.artifact.save(&metrics_path, &metrics)?;

        self.save_metadata(model_name, &metadata)?;
        self.cleanup_old_versions(model_name)?;

        tracing::info!(model = model_name, version, "Model version committed");
        Ok(())
    }

    /// Removes the oldest versions beyond `max_versions_keep`.
    pub fn cleanup_old_versions(&self, model_name: &str) -> Result<()> {
        let mut metadata = self.load_metadata(model_name)?;
        let mut versions = metadata.versions.clone();
        versions.sort_unstable();
        while versions.len() > self.config.max_versions_keep {
            let old = versions.remove(0);
            let old_dir = self.version_dir(model_name, old);
            if old_dir.exists() {
                std::fs::remove_dir_all(&old_dir).map_err(|e| CheckpointError::Io {
                    path: old_dir.clone(),
                    source: e,
                })?;
                tracing::info!(model = model_name, version = old, path = %old_dir.display(), "Removed old model version");
            }
        }
        metadata.versions = versions;
        self.save_metadata(model_name, &metadata)
    }

    /// Latest committed version, 0 when none.
    pub fn latest_version(&self, model_name: &str) -> Result<u32> {
        Ok(self.load_metadata(model_name)?.latest_version)
    }

    /// Directory of the latest committed version.
    pub fn latest_version_dir(&self, model_name: &str) -> Result<Option<PathBuf>> {
        let latest = self.latest_version(model_name)?;
        if latest == 0 {
            return Ok(None);
        }
        Ok(Some(self.version_dir(model_name, latest)))
    }

    /// Retained versions in ascending order.
    pub fn list_versions(&self, model_name: &str) -> Result<Vec<u32>> {
        let mut versions = self.load_metadata(model_name)?.versions;
        versions.sort_unstable();
        Ok(versions)
    }

    /// Metrics of `version`, or of the latest version when `None`.
    ///
    /// Returns an empty record when the version has no metrics file.
    pub fn get_metrics(&self, model_name: &str, version: Option<u32>) -> Result<Map<String, Value>> {
        let version = match version {
            Some(v) => v,
            None => self.latest_version(model_name)?,
        };
        let path = self.version_dir(model_name, version).join(METRICS_FILE);
        if !path.exists() {
            return Ok(Map::new());
        }
        self.artifact.restore(&path)
    }

    /// Latest version and metrics of every model with metadata on disk.
    pub fn get_all_metrics(&self) -> Result<BTreeMap<String, ModelVersionSummary>> {
        let mut result = BTreeMap::new();
        let entries = match std::fs::read_dir(&self.config.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(result),
            Err(e) => {
                return Err(CheckpointError::Io {
                    path: self.config.base_dir.clone(),
                    source: e,
                })
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() || !path.join(METADATA_FILE).exists() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let version = self.latest_version(name)?;
            let metrics = self.get_metrics(name, Some(version))?;
            result.insert(name.to_string(), ModelVersionSummary { version, metrics });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager(dir: &Path, keep: usize) -> VersionManager {
        VersionManager::new(VersionConfig::new(dir).with_max_versions_keep(keep)).unwrap()
    }

    #[test]
    fn test_zero_retention_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            VersionManager::new(VersionConfig::new(dir.path()).with_max_versions_keep(0)),
            Err(CheckpointError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fresh_model_has_no_versions() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        assert_eq!(manager.latest_version("x").unwrap(), 0);
        assert_eq!(manager.latest_version_dir("x").unwrap(), None);
        assert!(manager.get_metrics("x", None).unwrap().is_empty());
        assert!(manager.list_versions("x").unwrap().is_empty());
    }

    #[test]
    fn test_commit_stamps_trained_at() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let (_, v) = manager.next_version_dir("m").unwrap();
        let mut metrics = Map::new();
        metrics.insert("mae".into(), 1.25.into());
        manager.commit_version("m", v, metrics).unwrap();

        let stored = manager.get_metrics("m", Some(v)).unwrap();
        assert_eq!(stored["mae"], 1.25);
        let trained_at = stored["trained_at"].as_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(trained_at, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
    }

    #[test]
    fn test_recommit_does_not_duplicate_version() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let (_, v) = manager.next_version_dir("m").unwrap();
        manager.commit_version("m", v, Map::new()).unwrap();
        manager.commit_version("m", v, Map::new()).unwrap();
        assert_eq!(manager.list_versions("m").unwrap(), vec![1]);
    }
}
