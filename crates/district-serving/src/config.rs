//! Model manager configuration.
//!
//! Every field has a default, so a JSON file only needs the values it
//! overrides:
//!
//! ```json
//! { "model_dir": "/var/lib/district/models", "forecaster": { "epochs": 50 } }
//! ```

use crate::error::{ManagerError, ManagerResult};
use district_checkpoint::VersionConfig;
use district_features::quarter::{default_quarters, parse_quarter};
use district_models::{BoostingConfig, EnsembleWeights};
use district_training::TrainerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optimization budget of one model family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FamilyHyperparams {
    /// Epoch budget
    pub epochs: usize,
    /// Training mini-batch size
    pub batch_size: usize,
    /// Adam learning rate
    pub learning_rate: f32,
}

impl FamilyHyperparams {
    /// Creates a set of hyperparameters.
    pub fn new(epochs: usize, batch_size: usize, learning_rate: f32) -> Self {
        Self {
            epochs,
            batch_size,
            learning_rate,
        }
    }
}

/// Configuration for the [`crate::ModelManager`].
///
/// # Example
///
/// ```
/// use district_serving::ManagerConfig;
///
/// let config = ManagerConfig::default()
///     .with_model_dir("/tmp/models")
///     .with_mc_passes(20);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.forecaster.epochs, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Root directory of versioned artifacts
    pub model_dir: PathBuf,

    /// Versions retained per model
    pub max_versions_keep: usize,

    /// Quarter codes used for training and forecasting, oldest first
    pub quarters: Vec<String>,

    /// Minimum quarters of history for a forecast
    pub min_quarters: usize,

    /// Stochastic passes for forecast intervals
    pub mc_passes: usize,

    /// Blend weights of the scoring ensemble
    pub ensemble_weights: EnsembleWeights,

    /// Seed for weight initialization and sampling
    pub seed: u64,

    /// Sales forecaster budget
    pub forecaster: FamilyHyperparams,

    /// Survival classifier budget
    pub classifier: FamilyHyperparams,

    /// Scoring network budget
    pub scoring: FamilyHyperparams,

    /// Category recommender budget
    pub recommender: FamilyHyperparams,

    /// Shared trainer settings; per-family budgets override its epochs,
    /// batch size and learning rate
    pub trainer: TrainerConfig,

    /// Tree half of the scoring ensemble
    pub boosting: BoostingConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            max_versions_keep: 5,
            quarters: default_quarters(),
            min_quarters: 4,
            mc_passes: 10,
            ensemble_weights: EnsembleWeights::default(),
            seed: 42,
            forecaster: FamilyHyperparams::new(100, 32, 1e-3),
            classifier: FamilyHyperparams::new(100, 64, 1e-3),
            scoring: FamilyHyperparams::new(100, 128, 1e-3),
            recommender: FamilyHyperparams::new(50, 256, 1e-3),
            trainer: TrainerConfig::default(),
            boosting: BoostingConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Set the artifact directory.
    pub fn with_model_dir(mut self, model_dir: impl Into<PathBuf>) -> Self {
        self.model_dir = model_dir.into();
        self
    }

    /// Set the retention bound.
    pub fn with_max_versions_keep(mut self, keep: usize) -> Self {
        self.max_versions_keep = keep;
        self
    }

    /// Set the quarter window.
    pub fn with_quarters(mut self, quarters: Vec<String>) -> Self {
        self.quarters = quarters;
        self
    }

    /// Set the number of stochastic forecast passes.
    pub fn with_mc_passes(mut self, passes: usize) -> Self {
        self.mc_passes = passes;
        self
    }

    /// Set the ensemble blend weights.
    pub fn with_ensemble_weights(mut self, weights: EnsembleWeights) -> Self {
        self.ensemble_weights = weights;
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the same epoch budget for every family.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        for family in [
            &mut self.forecaster,
            &mut self.classifier,
            &mut self.scoring,
            &mut self.recommender,
        ] {
            family.epochs = epochs;
        }
        self
    }

    /// Set the shared trainer settings.
    pub fn with_trainer(mut self, trainer: TrainerConfig) -> Self {
        self.trainer = trainer;
        self
    }

    /// Set the boosting settings.
    pub fn with_boosting(mut self, boosting: BoostingConfig) -> Self {
        self.boosting = boosting;
        self
    }

    /// Reads a JSON configuration file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> ManagerResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ManagerError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(ManagerError::ConfigParse)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded manager configuration");
        Ok(config)
    }

    /// The version manager settings derived from this configuration.
    pub fn version_config(&self) -> VersionConfig {
        VersionConfig::new(&self.model_dir).with_max_versions_keep(self.max_versions_keep)
    }

    /// Trainer settings for one family.
    pub fn trainer_for(&self, family: &FamilyHyperparams) -> TrainerConfig {
        self.trainer
            .clone()
            .with_epochs(family.epochs)
            .with_batch_size(family.batch_size)
            .with_learning_rate(family.learning_rate)
            .with_seed(self.seed)
    }

    /// The most recent quarter of the window.
    pub fn latest_quarter(&self) -> Option<&str> {
        self.quarters.last().map(String::as_str)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ManagerResult<()> {
        if self.max_versions_keep == 0 {
            return Err(ManagerError::config("max_versions_keep must be at least 1"));
        }
        if self.quarters.is_empty() {
            return Err(ManagerError::config("quarters must not be empty"));
        }
        if let Some(bad) = self.quarters.iter().find(|q| parse_quarter(q).is_none()) {
            return Err(ManagerError::config(format!("invalid quarter code {bad:?}")));
        }
        if self.min_quarters == 0 {
            return Err(ManagerError::config("min_quarters must be at least 1"));
        }
        if self.mc_passes < 2 {
            return Err(ManagerError::config("mc_passes must be at least 2"));
        }
        let w = self.ensemble_weights;
        if !(w.tree >= 0.0 && w.mlp >= 0.0) {
            return Err(ManagerError::config("ensemble weights must be non-negative"));
        }
        for (name, family) in [
            ("forecaster", &self.forecaster),
            ("classifier", &self.classifier),
            ("scoring", &self.scoring),
            ("recommender", &self.recommender),
        ] {
            self.trainer_for(family)
                .validate()
                .map_err(|e| ManagerError::config(format!("{name}: {e}")))?;
        }
        self.boosting.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_versions_keep, 5);
        assert_eq!(config.quarters.len(), 8);
        assert_eq!(config.latest_quarter(), Some("20253"));
        assert_eq!(config.recommender, FamilyHyperparams::new(50, 256, 1e-3));
        assert_eq!(config.mc_passes, 10);
    }

    #[test]
    fn test_trainer_for_overrides_budget_only() {
        let config = ManagerConfig::default().with_seed(7);
        let trainer = config.trainer_for(&config.scoring);
        assert_eq!(trainer.epochs, 100);
        assert_eq!(trainer.batch_size, 128);
        assert_eq!(trainer.patience, 10);
        assert_eq!(trainer.seed, 7);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ManagerConfig::default();
        config.max_versions_keep = 0;
        assert!(matches!(config.validate(), Err(ManagerError::InvalidConfig { .. })));

        let config = ManagerConfig::default().with_quarters(vec!["2025Q3".into()]);
        assert!(config.validate().is_err());

        let config = ManagerConfig::default().with_epochs(0);
        assert!(config.validate().is_err());

        let config = ManagerConfig::default().with_mc_passes(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"model_dir": "/srv/models", "forecaster": {"epochs": 5, "batch_size": 8, "learning_rate": 0.01}}"#,
        )
        .unwrap();
        let config = ManagerConfig::from_file(&path).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.forecaster.epochs, 5);
        assert_eq!(config.classifier.epochs, 100);
        assert_eq!(config.version_config().max_versions_keep, 5);
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ManagerConfig::from_file(dir.path().join("missing.json")),
            Err(ManagerError::Io { .. })
        ));
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            ManagerConfig::from_file(&path),
            Err(ManagerError::ConfigParse(_))
        ));
    }
}
