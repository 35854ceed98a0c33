//! Layer trait definition for neural network layers.
//!
//! This module defines the core [`Layer`] trait that all feed-forward layers
//! implement. Inference has two explicit entry points instead of a mutable
//! train/eval flag: [`Layer::forward`] is deterministic and
//! [`Layer::forward_stochastic`] samples regularization noise (dropout)
//! from a caller-supplied generator. Training uses [`Layer::forward_train`],
//! which also caches what [`Layer::backward`] needs.

use crate::error::LayerResult;
use crate::tensor::Tensor;
use rand::RngCore;

/// A neural network layer that supports forward and backward propagation.
///
/// # Example
///
/// ```
/// use district_layers::dense::Dense;
/// use district_layers::layer::Layer;
/// use district_layers::tensor::Tensor;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let layer = Dense::new(16, 4, &mut rng);
/// let input = Tensor::zeros(&[8, 16]);
/// let output = layer.forward(&input).unwrap();
/// assert_eq!(output.shape(), &[8, 4]);
/// ```
pub trait Layer: Send + Sync {
    /// Deterministic inference pass. Never mutates the layer.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`](crate::error::LayerError) if the input shape
    /// is incompatible with the layer
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor>;

    /// Inference pass with stochastic regularization enabled.
    ///
    /// Layers without stochastic behavior fall back to [`Layer::forward`].
    fn forward_stochastic(&self, input: &Tensor, _rng: &mut dyn RngCore) -> LayerResult<Tensor> {
        self.forward(input)
    }

    /// Training pass: behaves like [`Layer::forward_stochastic`] and caches
    /// the activations needed by [`Layer::backward`].
    fn forward_train(&mut self, input: &Tensor, rng: &mut dyn RngCore) -> LayerResult<Tensor>;

    /// Takes the gradient of the loss with respect to the layer's output,
    /// stores parameter gradients, and returns the gradient with respect to
    /// the layer's input.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotInitialized`](crate::error::LayerError::NotInitialized)
    /// if no training forward pass preceded this call
    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor>;

    /// Returns references to the layer's learnable parameters.
    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Returns mutable references to the layer's learnable parameters.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    /// Returns the gradients from the last backward pass, aligned with
    /// [`Layer::parameters`]. Parameters without a gradient yet get zeros.
    fn gradients(&self) -> Vec<Tensor> {
        Vec::new()
    }

    /// Returns the name of the layer for debugging and logging purposes.
    fn name(&self) -> &str {
        "Layer"
    }
}

/// Returns `grad` if present, otherwise zeros shaped like `param`.
pub(crate) fn grad_or_zeros(grad: &Option<Tensor>, param: &Tensor) -> Tensor {
    grad.clone().unwrap_or_else(|| Tensor::zeros(param.shape()))
}
