//! Location score ensemble.
//!
//! Two regressors vote on a 0 to 100 score: gradient-boosted trees trained
//! directly on the score, and a sigmoid network trained on the score divided
//! by 100. Each sub-score is clipped to `[0, 100]` before blending and the
//! blend is clipped again.

use crate::boosting::GradientBoostedTrees;
use crate::error::{ModelError, ModelResult};
use crate::trainable::{check_width, Trainable};
use district_features::NUM_STATIC_FEATURES;
use district_layers::{ActivationType, Layer, Mlp, MlpConfig, Tensor};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Upper bound of a location score.
pub const MAX_SCORE: f64 = 100.0;

/// Shape of a [`ScoringMlp`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringMlpConfig {
    /// Static feature width
    pub input_dim: usize,
    /// Hidden layer widths
    pub hidden_dims: Vec<usize>,
    /// Dropout after each hidden layer
    pub dropout: f32,
}

impl Default for ScoringMlpConfig {
    fn default() -> Self {
        Self {
            input_dim: NUM_STATIC_FEATURES,
            hidden_dims: vec![64, 32],
            dropout: 0.2,
        }
    }
}

/// Network half of the ensemble; emits a probability per row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringMlp {
    config: ScoringMlpConfig,
    net: Mlp,
}

impl ScoringMlp {
    /// Builds a freshly initialized network.
    pub fn new<R: Rng + ?Sized>(config: ScoringMlpConfig, rng: &mut R) -> ModelResult<Self> {
        let mut mlp = MlpConfig::new(config.input_dim).with_dropout(config.dropout);
        for &dim in &config.hidden_dims {
            mlp = mlp.add_layer(dim, ActivationType::ReLU);
        }
        let net = mlp.add_layer(1, ActivationType::Sigmoid).build(rng)?;
        Ok(Self { config, net })
    }

    /// The configuration this model was built with.
    pub fn config(&self) -> &ScoringMlpConfig {
        &self.config
    }
}

impl Trainable for ScoringMlp {
    type Input = Tensor;

    fn predict(&self, input: &Tensor) -> ModelResult<Tensor> {
        check_width(input, self.config.input_dim)?;
        Ok(self.net.forward(input)?)
    }

    fn predict_stochastic(&self, input: &Tensor, rng: &mut dyn RngCore) -> ModelResult<Tensor> {
        check_width(input, self.config.input_dim)?;
        Ok(self.net.forward_stochastic(input, rng)?)
    }

    fn forward_train(&mut self, input: &Tensor, rng: &mut dyn RngCore) -> ModelResult<Tensor> {
        check_width(input, self.config.input_dim)?;
        Ok(self.net.forward_train(input, rng)?)
    }

    fn backward(&mut self, grad_output: &Tensor) -> ModelResult<()> {
        self.net.backward(grad_output)?;
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.net.parameters_mut()
    }

    fn gradients(&self) -> Vec<Tensor> {
        self.net.gradients()
    }

    fn name(&self) -> &str {
        "ScoringMlp"
    }
}

/// Blend weights of the two sub-models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    /// Weight of the tree model
    pub tree: f64,
    /// Weight of the network
    pub mlp: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self { tree: 0.6, mlp: 0.4 }
    }
}

impl EnsembleWeights {
    /// All weight on the network, used when no tree model exists.
    pub fn mlp_only() -> Self {
        Self { tree: 0.0, mlp: 1.0 }
    }
}

/// Blends two optional sub-scores on the 0 to 100 scale.
///
/// Each present score is clipped to `[0, 100]`, weighted, summed, clipped
/// again and truncated. Absent scores contribute nothing.
///
/// # Example
///
/// ```
/// use district_models::{blend_scores, EnsembleWeights};
///
/// let half = EnsembleWeights { tree: 0.5, mlp: 0.5 };
/// assert_eq!(blend_scores(Some(150.0), Some(-20.0), half), 50);
///
/// let double = EnsembleWeights { tree: 1.0, mlp: 1.0 };
/// assert_eq!(blend_scores(Some(100.0), Some(100.0), double), 100);
/// ```
pub fn blend_scores(tree: Option<f64>, mlp: Option<f64>, weights: EnsembleWeights) -> i32 {
    let mut score = 0.0;
    if let Some(t) = tree {
        score += weights.tree * t.clamp(0.0, MAX_SCORE);
    }
    if let Some(m) = mlp {
        score += weights.mlp * m.clamp(0.0, MAX_SCORE);
    }
    score.clamp(0.0, MAX_SCORE) as i32
}

/// Weighted ensemble of a tree model and a network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringEnsemble {
    tree_model: Option<GradientBoostedTrees>,
    mlp_model: Option<ScoringMlp>,
    weights: EnsembleWeights,
}

impl ScoringEnsemble {
    /// Assembles an ensemble. Without a tree model the weights become
    /// [`EnsembleWeights::mlp_only`].
    pub fn new(
        tree_model: Option<GradientBoostedTrees>,
        mlp_model: Option<ScoringMlp>,
        weights: EnsembleWeights,
    ) -> Self {
        let weights = if tree_model.is_some() {
            weights
        } else {
            EnsembleWeights::mlp_only()
        };
        Self {
            tree_model,
            mlp_model,
            weights,
        }
    }

    /// The tree sub-model, if trained.
    pub fn tree_model(&self) -> Option<&GradientBoostedTrees> {
        self.tree_model.as_ref()
    }

    /// The network sub-model, if trained.
    pub fn mlp_model(&self) -> Option<&ScoringMlp> {
        self.mlp_model.as_ref()
    }

    /// Effective blend weights.
    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    /// True when at least one sub-model is present.
    pub fn has_models(&self) -> bool {
        self.tree_model.is_some() || self.mlp_model.is_some()
    }

    /// Scores every row of `x` on the 0 to 100 scale.
    pub fn predict(&self, x: &Tensor) -> ModelResult<Vec<i32>> {
        if x.ndim() != 2 {
            return Err(ModelError::InputWidth {
                expected: NUM_STATIC_FEATURES,
                actual: x.shape().last().copied().unwrap_or(0),
            });
        }
        let rows = x.rows();
        let tree: Option<Vec<f32>> = self.tree_model.as_ref().map(|m| m.predict(x)).transpose()?;
        let mlp: Option<Tensor> = self.mlp_model.as_ref().map(|m| m.predict(x)).transpose()?;

        Ok((0..rows)
            .map(|i| {
                let t = tree.as_ref().map(|v| v[i] as f64);
                let m = mlp.as_ref().map(|p| p.data()[i] as f64 * MAX_SCORE);
                blend_scores(t, m, self.weights)
            })
            .collect())
    }
}
