//! Activation function layers.
//!
//! This module provides the element-wise activations used by the model heads:
//! ReLU for hidden blocks and Sigmoid for bounded outputs.

use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;
use crate::tensor::Tensor;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Rectified Linear Unit (ReLU) activation function.
///
/// Computes `f(x) = max(0, x)` element-wise.
///
/// # Example
///
/// ```
/// use district_layers::activation::ReLU;
/// use district_layers::layer::Layer;
/// use district_layers::tensor::Tensor;
///
/// let relu = ReLU::new();
/// let input = Tensor::from_data(&[2, 2], vec![-1.0, 0.0, 1.0, 2.0]);
/// let output = relu.forward(&input).unwrap();
/// assert_eq!(output.data(), &[0.0, 0.0, 1.0, 2.0]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReLU {
    /// Cached input for backward pass
    #[serde(skip)]
    cached_input: Option<Tensor>,
}

impl ReLU {
    /// Creates a new ReLU activation layer.
    pub fn new() -> Self {
        Self { cached_input: None }
    }
}

impl Layer for ReLU {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        Ok(input.map(|x| x.max(0.0)))
    }

    fn forward_train(&mut self, input: &Tensor, _rng: &mut dyn RngCore) -> LayerResult<Tensor> {
        self.cached_input = Some(input.clone());
        self.forward(input)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;

        let mask = input.map(|x| if x > 0.0 { 1.0 } else { 0.0 });
        Ok(grad.mul(&mask))
    }

    fn name(&self) -> &str {
        "ReLU"
    }
}

/// Sigmoid activation function.
///
/// Computes `f(x) = 1 / (1 + exp(-x))` element-wise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sigmoid {
    /// Cached output for backward pass
    #[serde(skip)]
    cached_output: Option<Tensor>,
}

impl Sigmoid {
    /// Creates a new Sigmoid activation layer.
    pub fn new() -> Self {
        Self {
            cached_output: None,
        }
    }
}

impl Layer for Sigmoid {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        Ok(input.sigmoid())
    }

    fn forward_train(&mut self, input: &Tensor, _rng: &mut dyn RngCore) -> LayerResult<Tensor> {
        let output = input.sigmoid();
        self.cached_output = Some(output.clone());
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let output = self
            .cached_output
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;

        // sigmoid'(x) = s * (1 - s)
        let local = output.map(|s| s * (1.0 - s));
        Ok(grad.mul(&local))
    }

    fn name(&self) -> &str {
        "Sigmoid"
    }
}
