//! Multi-layer perceptron (MLP) implementation.
//!
//! This module provides the [`Mlp`] struct, a stack of dense layers with
//! optional batch normalization, activations and dropout between them.
//! Every hidden layer expands to `Dense -> [BatchNorm] -> activation ->
//! [Dropout]`; the output layer is `Dense -> activation`.

use crate::activation::{ReLU, Sigmoid};
use crate::dense::Dense;
use crate::dropout::Dropout;
use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;
use crate::normalization::BatchNorm;
use crate::tensor::Tensor;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Activation function types supported by MLP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActivationType {
    /// Rectified Linear Unit
    #[default]
    ReLU,
    /// Sigmoid function
    Sigmoid,
    /// No activation (identity)
    None,
}

/// One dense layer of an [`MlpConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Output dimension of the dense layer
    pub output_dim: usize,
    /// Activation applied after it
    pub activation: ActivationType,
    /// Dropout override for this layer; `None` uses the config-wide rate
    pub dropout: Option<f32>,
}

/// Configuration for building an MLP.
///
/// # Example
///
/// ```
/// use district_layers::mlp::{ActivationType, MlpConfig};
///
/// let config = MlpConfig::new(59)
///     .add_layer(128, ActivationType::ReLU)
///     .add_layer(64, ActivationType::ReLU)
///     .add_layer(3, ActivationType::Sigmoid)
///     .with_batch_norm(true)
///     .with_dropout(0.3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Input dimension
    pub input_dim: usize,
    /// Layer configurations
    pub layers: Vec<LayerSpec>,
    /// Dropout rate after hidden layers (0.0 to disable)
    pub dropout_rate: f32,
    /// Whether hidden layers are batch normalized
    pub batch_norm: bool,
}

impl MlpConfig {
    /// Creates a new MLP configuration with the specified input dimension.
    pub fn new(input_dim: usize) -> Self {
        Self {
            input_dim,
            layers: Vec::new(),
            dropout_rate: 0.0,
            batch_norm: false,
        }
    }

    /// Adds a layer to the MLP configuration.
    ///
    /// # Arguments
    ///
    /// * `output_dim` - The output dimension of this layer
    /// * `activation` - The activation function to use after this layer
    pub fn add_layer(mut self, output_dim: usize, activation: ActivationType) -> Self {
        self.layers.push(LayerSpec {
            output_dim,
            activation,
            dropout: None,
        });
        self
    }

    /// Adds a hidden layer with its own dropout rate.
    pub fn add_layer_with_dropout(
        mut self,
        output_dim: usize,
        activation: ActivationType,
        rate: f32,
    ) -> Self {
        self.layers.push(LayerSpec {
            output_dim,
            activation,
            dropout: Some(rate),
        });
        self
    }

    /// Sets the dropout rate.
    pub fn with_dropout(mut self, rate: f32) -> Self {
        self.dropout_rate = rate;
        self
    }

    /// Enables batch normalization on hidden layers.
    pub fn with_batch_norm(mut self, enabled: bool) -> Self {
        self.batch_norm = enabled;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LayerResult<()> {
        if self.input_dim == 0 {
            return Err(LayerError::ConfigError {
                message: "Input dimension must be positive".to_string(),
            });
        }
        if self.layers.is_empty() {
            return Err(LayerError::ConfigError {
                message: "MLP must have at least one layer".to_string(),
            });
        }
        for (i, spec) in self.layers.iter().enumerate() {
            if spec.output_dim == 0 {
                return Err(LayerError::ConfigError {
                    message: format!("Layer {} has zero output dimension", i),
                });
            }
            let rate = spec.dropout.unwrap_or(self.dropout_rate);
            if !(0.0..1.0).contains(&rate) {
                return Err(LayerError::ConfigError {
                    message: format!("Layer {} dropout rate must be in [0, 1)", i),
                });
            }
        }
        Ok(())
    }

    /// Builds the MLP from this configuration.
    pub fn build<R: Rng + ?Sized>(self, rng: &mut R) -> LayerResult<Mlp> {
        Mlp::from_config(self, rng)
    }
}

/// A single stage of an [`Mlp`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Block {
    /// Fully connected layer
    Dense(Dense),
    /// Batch normalization
    BatchNorm(BatchNorm),
    /// ReLU activation
    ReLU(ReLU),
    /// Sigmoid activation
    Sigmoid(Sigmoid),
    /// Dropout
    Dropout(Dropout),
}

impl Block {
    fn as_layer(&self) -> &dyn Layer {
        match self {
            Block::Dense(l) => l,
            Block::BatchNorm(l) => l,
            Block::ReLU(l) => l,
            Block::Sigmoid(l) => l,
            Block::Dropout(l) => l,
        }
    }

    fn as_layer_mut(&mut self) -> &mut dyn Layer {
        match self {
            Block::Dense(l) => l,
            Block::BatchNorm(l) => l,
            Block::ReLU(l) => l,
            Block::Sigmoid(l) => l,
            Block::Dropout(l) => l,
        }
    }
}

/// A multi-layer perceptron (MLP) neural network.
///
/// # Example
///
/// ```
/// use district_layers::layer::Layer;
/// use district_layers::mlp::{ActivationType, MlpConfig};
/// use district_layers::tensor::Tensor;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let mlp = MlpConfig::new(59)
///     .add_layer(64, ActivationType::ReLU)
///     .add_layer(1, ActivationType::Sigmoid)
///     .build(&mut StdRng::seed_from_u64(0))
///     .unwrap();
///
/// let output = mlp.forward(&Tensor::zeros(&[8, 59])).unwrap();
/// assert_eq!(output.shape(), &[8, 1]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    blocks: Vec<Block>,
    config: MlpConfig,
}

impl Mlp {
    /// Creates an MLP from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn from_config<R: Rng + ?Sized>(config: MlpConfig, rng: &mut R) -> LayerResult<Self> {
        config.validate()?;

        let mut blocks = Vec::new();
        let mut prev_dim = config.input_dim;
        let last = config.layers.len() - 1;
        for (i, spec) in config.layers.iter().enumerate() {
            blocks.push(Block::Dense(Dense::new(prev_dim, spec.output_dim, rng)));
            let hidden = i < last;
            if hidden && config.batch_norm {
                blocks.push(Block::BatchNorm(BatchNorm::new(spec.output_dim)));
            }
            match spec.activation {
                ActivationType::ReLU => blocks.push(Block::ReLU(ReLU::new())),
                ActivationType::Sigmoid => blocks.push(Block::Sigmoid(Sigmoid::new())),
                ActivationType::None => {}
            }
            let rate = spec.dropout.unwrap_or(config.dropout_rate);
            if hidden && rate > 0.0 {
                blocks.push(Block::Dropout(Dropout::new(rate)?));
            }
            prev_dim = spec.output_dim;
        }

        Ok(Self { blocks, config })
    }

    /// Returns the stages in execution order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns the configuration used to build this MLP.
    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    /// Returns the input dimension.
    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    /// Returns the output dimension.
    pub fn output_dim(&self) -> usize {
        self.config.layers.last().map(|s| s.output_dim).unwrap_or(0)
    }
}

impl Layer for Mlp {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        let mut x = input.clone();
        for block in &self.blocks {
            x = block.as_layer().forward(&x)?;
        }
        Ok(x)
    }

    fn forward_stochastic(&self, input: &Tensor, rng: &mut dyn RngCore) -> LayerResult<Tensor> {
        let mut x = input.clone();
        for block in &self.blocks {
            x = block.as_layer().forward_stochastic(&x, rng)?;
        }
        Ok(x)
    }

    fn forward_train(&mut self, input: &Tensor, rng: &mut dyn RngCore) -> LayerResult<Tensor> {
        let mut x = input.clone();
        for block in &mut self.blocks {
            x = block.as_layer_mut().forward_train(&x, rng)?;
        }
        Ok(x)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let mut g = grad.clone();
        for block in self.blocks.iter_mut().rev() {
            g = block.as_layer_mut().backward(&g)?;
        }
        Ok(g)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.blocks
            .iter()
            .flat_map(|b| b.as_layer().parameters())
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.blocks
            .iter_mut()
            .flat_map(|b| b.as_layer_mut().parameters_mut())
            .collect()
    }

    fn gradients(&self) -> Vec<Tensor> {
        self.blocks
            .iter()
            .flat_map(|b| b.as_layer().gradients())
            .collect()
    }

    fn name(&self) -> &str {
        "Mlp"
    }
}
