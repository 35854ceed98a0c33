//! 1, 3 and 5-year survival classifier.

use crate::error::ModelResult;
use crate::trainable::{check_width, Trainable};
use district_features::NUM_STATIC_FEATURES;
use district_layers::{ActivationType, Layer, Mlp, MlpConfig, Tensor};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Number of survival horizons predicted.
pub const SURVIVAL_HORIZONS: usize = 3;

/// Shape of a [`SurvivalClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalConfig {
    /// Static feature width
    pub input_dim: usize,
    /// Hidden layer widths
    pub hidden_dims: Vec<usize>,
    /// Dropout after each hidden layer
    pub dropout: f32,
}

impl Default for SurvivalConfig {
    fn default() -> Self {
        Self {
            input_dim: NUM_STATIC_FEATURES,
            hidden_dims: vec![128, 64, 32],
            dropout: 0.3,
        }
    }
}

impl SurvivalConfig {
    fn to_mlp_config(&self) -> MlpConfig {
        let mut config = MlpConfig::new(self.input_dim)
            .with_batch_norm(true)
            .with_dropout(self.dropout);
        for &dim in &self.hidden_dims {
            config = config.add_layer(dim, ActivationType::ReLU);
        }
        config.add_layer(SURVIVAL_HORIZONS, ActivationType::Sigmoid)
    }
}

/// Feed-forward network emitting one survival probability per horizon.
///
/// Hidden layers are `Dense -> BatchNorm -> ReLU -> Dropout`, the output is
/// `Dense -> Sigmoid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurvivalClassifier {
    config: SurvivalConfig,
    net: Mlp,
}

impl SurvivalClassifier {
    /// Builds a freshly initialized classifier.
    pub fn new<R: Rng + ?Sized>(config: SurvivalConfig, rng: &mut R) -> ModelResult<Self> {
        let net = config.to_mlp_config().build(rng)?;
        Ok(Self { config, net })
    }

    /// The configuration this model was built with.
    pub fn config(&self) -> &SurvivalConfig {
        &self.config
    }
}

impl Trainable for SurvivalClassifier {
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
        "SurvivalClassifier"
    }
}
