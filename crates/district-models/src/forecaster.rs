//! Multi-step quarterly sales forecaster.
//!
//! A stacked GRU encodes the padded quarter sequence; a small head maps the
//! hidden state at each sample's last real quarter to the next
//! [`OUTPUT_STEPS`] quarters.

use crate::error::ModelResult;
use crate::trainable::{check_width, Trainable};
use district_features::{PaddedSequences, NUM_TIMESERIES_FEATURES, OUTPUT_STEPS};
use district_layers::{ActivationType, GruStack, Layer, Mlp, MlpConfig, Tensor};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Shape of a [`SalesForecaster`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecasterConfig {
    /// Width of one quarter row
    pub input_dim: usize,
    /// GRU hidden width
    pub hidden_dim: usize,
    /// Number of stacked GRU layers
    pub num_layers: usize,
    /// Dropout between GRU layers
    pub dropout: f32,
    /// Width of the head's hidden layer
    pub head_dim: usize,
    /// Dropout inside the head
    pub head_dropout: f32,
    /// Number of predicted quarters
    pub output_steps: usize,
}

impl Default for ForecasterConfig {
    fn default() -> Self {
        Self {
            input_dim: NUM_TIMESERIES_FEATURES,
            hidden_dim: 64,
            num_layers: 2,
            dropout: 0.2,
            head_dim: 32,
            head_dropout: 0.1,
            output_steps: OUTPUT_STEPS,
        }
    }
}

/// GRU encoder with a dense forecasting head.
///
/// # Example
///
/// ```
/// use district_features::{collate_padded, NUM_TIMESERIES_FEATURES};
/// use district_models::{ForecasterConfig, SalesForecaster, Trainable};
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let model = SalesForecaster::new(ForecasterConfig::default(), &mut StdRng::seed_from_u64(42)).unwrap();
/// let seq = vec![vec![0.0; NUM_TIMESERIES_FEATURES]; 7];
/// let batch = collate_padded(&[seq.as_slice()], &[&[0.0; 4]]).unwrap();
/// let out = model.predict(&batch.inputs).unwrap();
/// assert_eq!(out.shape(), &[1, 4]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesForecaster {
    config: ForecasterConfig,
    encoder: GruStack,
    head: Mlp,
}

impl SalesForecaster {
    /// Builds a freshly initialized forecaster.
    pub fn new<R: Rng + ?Sized>(config: ForecasterConfig, rng: &mut R) -> ModelResult<Self> {
        let encoder = GruStack::new(
            config.input_dim,
            config.hidden_dim,
            config.num_layers,
            config.dropout,
            rng,
        )?;
        let head = MlpConfig::new(config.hidden_dim)
            .add_layer_with_dropout(config.head_dim, ActivationType::ReLU, config.head_dropout)
            .add_layer(config.output_steps, ActivationType::None)
            .build(rng)?;
        Ok(Self {
            config,
            encoder,
            head,
        })
    }

    /// The configuration this model was built with.
    pub fn config(&self) -> &ForecasterConfig {
        &self.config
    }
}

impl Trainable for SalesForecaster {
    type Input = PaddedSequences;

    fn predict(&self, input: &PaddedSequences) -> ModelResult<Tensor> {
        check_width(&input.inputs, self.config.input_dim)?;
        let hidden = self.encoder.forward_sequence(&input.inputs, &input.lengths)?;
        Ok(self.head.forward(&hidden)?)
    }

    fn predict_stochastic(&self, input: &PaddedSequences, rng: &mut dyn RngCore) -> ModelResult<Tensor> {
        check_width(&input.inputs, self.config.input_dim)?;
        let hidden = self
            .encoder
            .forward_sequence_stochastic(&input.inputs, &input.lengths, rng)?;
        Ok(self.head.forward_stochastic(&hidden, rng)?)
    }

    fn forward_train(&mut self, input: &PaddedSequences, rng: &mut dyn RngCore) -> ModelResult<Tensor> {
        check_width(&input.inputs, self.config.input_dim)?;
        let hidden = self
            .encoder
            .forward_sequence_train(&input.inputs, &input.lengths, rng)?;
        Ok(self.head.forward_train(&hidden, rng)?)
    }

    fn backward(&mut self, grad_output: &Tensor) -> ModelResult<()> {
        let d_hidden = self.head.backward(grad_output)?;
        self.encoder.backward_sequence(&d_hidden)?;
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.encoder.parameters_mut();
        params.extend(self.head.parameters_mut());
        params
    }

    fn gradients(&self) -> Vec<Tensor> {
        let mut grads = self.encoder.gradients();
        grads.extend(self.head.gradients());
        grads
    }

    fn name(&self) -> &str {
        "SalesForecaster"
    }
}
