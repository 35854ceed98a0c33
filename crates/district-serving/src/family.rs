//! The four managed model families and their on-disk form.
//!
//! Artifact file names inside a version directory:
//!
//! | family              | files                                   |
//! |---------------------|-----------------------------------------|
//! | `sales_lstm`        | `model.pt`, `scaler.pkl`                |
//! | `survival_mlp`      | `model.pt`, `scaler.pkl`                |
//! | `scoring_ensemble`  | `mlp_model.pt`, `xgb_model.pkl`, `scaler.pkl` |
//! | `recommendation`    | `model.pt`, `scaler.pkl`                |
//!
//! Every file holds JSON.

use crate::error::{ManagerError, ManagerResult};
use district_checkpoint::JsonArtifact;
use district_features::FeatureScaler;
use district_models::{
    CategoryRecommender, EnsembleWeights, GradientBoostedTrees, SalesForecaster, ScoringEnsemble,
    ScoringMlp, SurvivalClassifier,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const MODEL_FILE: &str = "model.pt";
const MLP_FILE: &str = "mlp_model.pt";
const TREE_FILE: &str = "xgb_model.pkl";
const SCALER_FILE: &str = "scaler.pkl";

/// Name of a managed model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Quarterly sales forecaster
    SalesLstm,
    /// Survival classifier
    SurvivalMlp,
    /// Location score ensemble
    ScoringEnsemble,
    /// Category recommender
    Recommendation,
}

impl ModelKind {
    /// Every family, in training order.
    pub const ALL: [ModelKind; 4] = [
        ModelKind::SurvivalMlp,
        ModelKind::SalesLstm,
        ModelKind::ScoringEnsemble,
        ModelKind::Recommendation,
    ];

    /// Directory and registry name.
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::SalesLstm => "sales_lstm",
            ModelKind::SurvivalMlp => "survival_mlp",
            ModelKind::ScoringEnsemble => "scoring_ensemble",
            ModelKind::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ManagerError::UnknownModel(s.to_string()))
    }
}

/// A trained model of any family.
#[derive(Debug, Clone)]
pub enum ModelFamily {
    /// Sales forecaster
    Forecaster(SalesForecaster),
    /// Survival classifier
    Classifier(SurvivalClassifier),
    /// Scoring ensemble
    Ensemble(ScoringEnsemble),
    /// Category recommender
    Recommender(CategoryRecommender),
}

impl ModelFamily {
    /// The family this model belongs to.
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelFamily::Forecaster(_) => ModelKind::SalesLstm,
            ModelFamily::Classifier(_) => ModelKind::SurvivalMlp,
            ModelFamily::Ensemble(_) => ModelKind::ScoringEnsemble,
            ModelFamily::Recommender(_) => ModelKind::Recommendation,
        }
    }

    fn mismatch(&self, expected: ModelKind) -> ManagerError {
        ManagerError::FamilyMismatch {
            expected: expected.name(),
            found: self.kind().name(),
        }
    }

    /// The forecaster, or a mismatch error.
    pub fn as_forecaster(&self) -> ManagerResult<&SalesForecaster> {
        match self {
            ModelFamily::Forecaster(m) => Ok(m),
            other => Err(other.mismatch(ModelKind::SalesLstm)),
        }
    }

    /// The survival classifier, or a mismatch error.
    pub fn as_classifier(&self) -> ManagerResult<&SurvivalClassifier> {
        match self {
            ModelFamily::Classifier(m) => Ok(m),
            other => Err(other.mismatch(ModelKind::SurvivalMlp)),
        }
    }

    /// The scoring ensemble, or a mismatch error.
    pub fn as_ensemble(&self) -> ManagerResult<&ScoringEnsemble> {
        match self {
            ModelFamily::Ensemble(m) => Ok(m),
            other => Err(other.mismatch(ModelKind::ScoringEnsemble)),
        }
    }

    /// The recommender, or a mismatch error.
    pub fn as_recommender(&self) -> ManagerResult<&CategoryRecommender> {
        match self {
            ModelFamily::Recommender(m) => Ok(m),
            other => Err(other.mismatch(ModelKind::Recommendation)),
        }
    }

    /// Writes the model files into `dir`.
    ///
    /// The ensemble writes only the sub-models it has and removes a tree
    /// file it does not own.
    pub fn save(&self, dir: &Path) -> ManagerResult<()> {
        let artifact = JsonArtifact::new();
        match self {
            ModelFamily::Forecaster(m) => artifact.save(&dir.join(MODEL_FILE), m)?,
            ModelFamily::Classifier(m) => artifact.save(&dir.join(MODEL_FILE), m)?,
            ModelFamily::Recommender(m) => artifact.save(&dir.join(MODEL_FILE), m)?,
            ModelFamily::Ensemble(e) => {
                if let Some(mlp) = e.mlp_model() {
                    artifact.save(&dir.join(MLP_FILE), mlp)?;
                }
                let tree_path = dir.join(TREE_FILE);
                match e.tree_model() {
                    Some(tree) => artifact.save(&tree_path, tree)?,
                    None if tree_path.exists() => {
                        std::fs::remove_file(&tree_path).map_err(|source| ManagerError::Io {
                            path: tree_path.clone(),
                            source,
                        })?;
                    }
                    None => {}
                }
            }
        }
        tracing::debug!(model = %self.kind(), path = %dir.display(), "Model files written");
        Ok(())
    }

    /// Reads a model of `kind` from `dir`.
    ///
    /// The ensemble requires its network file; the tree file is optional
    /// and without it all weight goes to the network.
    pub fn load(kind: ModelKind, dir: &Path, weights: EnsembleWeights) -> ManagerResult<Self> {
        let artifact = JsonArtifact::new();
        let model = match kind {
            ModelKind::SalesLstm => ModelFamily::Forecaster(artifact.restore(&dir.join(MODEL_FILE))?),
            ModelKind::SurvivalMlp => ModelFamily::Classifier(artifact.restore(&dir.join(MODEL_FILE))?),
            ModelKind::Recommendation => {
                ModelFamily::Recommender(artifact.restore(&dir.join(MODEL_FILE))?)
            }
            ModelKind::ScoringEnsemble => {
                let mlp: ScoringMlp = artifact.restore(&dir.join(MLP_FILE))?;
                let tree_path = dir.join(TREE_FILE);
                let tree: Option<GradientBoostedTrees> = if tree_path.exists() {
                    Some(artifact.restore(&tree_path)?)
                } else {
                    None
                };
                ModelFamily::Ensemble(ScoringEnsemble::new(tree, Some(mlp), weights))
            }
        };
        Ok(model)
    }
}

/// Writes `scaler` next to the model files.
pub(crate) fn save_scaler(scaler: &FeatureScaler, dir: &Path) -> ManagerResult<()> {
    scaler.save(&dir.join(SCALER_FILE))?;
    Ok(())
}

/// Reads the scaler stored next to the model files.
pub(crate) fn load_scaler(dir: &Path) -> ManagerResult<FeatureScaler> {
    Ok(FeatureScaler::load(&dir.join(SCALER_FILE))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use district_layers::Tensor;
    use district_models::{BoostingConfig, ScoringMlpConfig, SurvivalConfig, Trainable};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    fn scoring_mlp() -> ScoringMlp {
        let config = ScoringMlpConfig {
            input_dim: 2,
            ..ScoringMlpConfig::default()
        };
        ScoringMlp::new(config, &mut StdRng::seed_from_u64(3)).unwrap()
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.name().parse::<ModelKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.name());
        }
        assert!(matches!(
            "lstm".parse::<ModelKind>(),
            Err(ManagerError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_training_order() {
        assert_eq!(ModelKind::ALL[0], ModelKind::SurvivalMlp);
        assert_eq!(ModelKind::ALL[3], ModelKind::Recommendation);
    }

    #[test]
    fn test_classifier_save_and_load() {
        let dir = tempdir().unwrap();
        let model = SurvivalClassifier::new(SurvivalConfig::default(), &mut StdRng::seed_from_u64(1)).unwrap();
        let x = Tensor::ones(&[2, SurvivalConfig::default().input_dim]);
        let expected = model.predict(&x).unwrap();

        ModelFamily::Classifier(model).save(dir.path()).unwrap();
        assert!(dir.path().join("model.pt").exists());

        let loaded = ModelFamily::load(ModelKind::SurvivalMlp, dir.path(), EnsembleWeights::default()).unwrap();
        let restored = loaded.as_classifier().unwrap();
        assert_eq!(restored.predict(&x).unwrap().data(), expected.data());
        assert!(matches!(
            loaded.as_forecaster(),
            Err(ManagerError::FamilyMismatch { expected: "sales_lstm", found: "survival_mlp" })
        ));
    }

    #[test]
    fn test_ensemble_without_tree_file() {
        let dir = tempdir().unwrap();
        let ensemble = ScoringEnsemble::new(None, Some(scoring_mlp()), EnsembleWeights::default());
        ModelFamily::Ensemble(ensemble).save(dir.path()).unwrap();
        assert!(dir.path().join("mlp_model.pt").exists());
        assert!(!dir.path().join("xgb_model.pkl").exists());

        let loaded = ModelFamily::load(ModelKind::ScoringEnsemble, dir.path(), EnsembleWeights::default()).unwrap();
        let ModelFamily::Ensemble(restored) = loaded else {
            panic!("wrong family restored");
        };
        assert!(restored.tree_model().is_none());
        assert_eq!(restored.weights(), EnsembleWeights::mlp_only());
    }

    #[test]
    fn test_ensemble_with_tree_keeps_weights() {
        let dir = tempdir().unwrap();
        let x = Tensor::from_data(&[4, 2], vec![0.0, 1.0, 1.0, 0.0, 2.0, 2.0, 3.0, 1.0]);
        let tree = GradientBoostedTrees::fit(&x, &[10.0, 20.0, 30.0, 40.0], BoostingConfig::default()).unwrap();
        let weights = EnsembleWeights { tree: 0.7, mlp: 0.3 };
        let ensemble = ScoringEnsemble::new(Some(tree), Some(scoring_mlp()), weights);
        let expected = ensemble.predict(&x).unwrap();
        ModelFamily::Ensemble(ensemble).save(dir.path()).unwrap();

        let ModelFamily::Ensemble(restored) =
            ModelFamily::load(ModelKind::ScoringEnsemble, dir.path(), weights).unwrap()
        else {
            panic!("wrong family restored");
        };
        assert_eq!(restored.weights(), weights);
        assert_eq!(restored.predict(&x).unwrap(), expected);
    }

    #[test]
    fn test_network_only_save_replaces_earlier_tree() {
        let dir = tempdir().unwrap();
        let x = Tensor::from_data(&[4, 2], vec![0.0, 1.0, 1.0, 0.0, 2.0, 2.0, 3.0, 1.0]);
        let tree = GradientBoostedTrees::fit(&x, &[10.0, 20.0, 30.0, 40.0], BoostingConfig::default()).unwrap();
        let with_tree = ScoringEnsemble::new(Some(tree), Some(scoring_mlp()), EnsembleWeights::default());
        ModelFamily::Ensemble(with_tree).save(dir.path()).unwrap();
        assert!(dir.path().join("xgb_model.pkl").exists());

        let network_only = ScoringEnsemble::new(None, Some(scoring_mlp()), EnsembleWeights::default());
        ModelFamily::Ensemble(network_only).save(dir.path()).unwrap();
        assert!(!dir.path().join("xgb_model.pkl").exists());

        let ModelFamily::Ensemble(restored) =
            ModelFamily::load(ModelKind::ScoringEnsemble, dir.path(), EnsembleWeights::default()).unwrap()
        else {
            panic!("wrong family restored");
        };
        assert!(restored.tree_model().is_none());
        assert_eq!(restored.weights(), EnsembleWeights::mlp_only());
    }

    #[test]
    fn test_missing_model_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(ModelFamily::load(ModelKind::SalesLstm, dir.path(), EnsembleWeights::default()).is_err());
        assert!(load_scaler(dir.path()).is_err());
    }
}
