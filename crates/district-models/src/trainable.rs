//! The capability shared by every gradient-trained model.

use crate::error::{ModelError, ModelResult};
use district_layers::Tensor;
use rand::RngCore;

/// A model the generic trainer can fit.
///
/// Inference has two entry points: [`Trainable::predict`] is deterministic
/// (dropout off, batch norm on running statistics) and
/// [`Trainable::predict_stochastic`] keeps dropout active for Monte-Carlo
/// estimates. Neither mutates the model, so a shared reference can serve
/// predictions while nothing else holds it mutably.
///
/// Snapshots are plain clones; persisted state is the serde form.
pub trait Trainable: Clone + Send + Sync + 'static {
    /// Batch input type.
    type Input: Send + Sync;

    /// Deterministic forward pass.
    fn predict(&self, input: &Self::Input) -> ModelResult<Tensor>;

    /// Forward pass with dropout sampled from `rng`.
    fn predict_stochastic(&self, input: &Self::Input, rng: &mut dyn RngCore) -> ModelResult<Tensor>;

    /// Training forward pass caching activations for [`Trainable::backward`].
    fn forward_train(&mut self, input: &Self::Input, rng: &mut dyn RngCore) -> ModelResult<Tensor>;

    /// Backpropagates the loss gradient with respect to the output and
    /// stores parameter gradients.
    fn backward(&mut self, grad_output: &Tensor) -> ModelResult<()>;

    /// Learnable tensors in a fixed order.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    /// Gradients aligned with [`Trainable::parameters_mut`].
    fn gradients(&self) -> Vec<Tensor>;

    /// Short model name for logs.
    fn name(&self) -> &str;

    /// Total number of learnable scalars.
    fn num_parameters(&mut self) -> usize {
        self.parameters_mut().iter().map(|p| p.numel()).sum()
    }
}

/// Fails unless the last dimension of `input` is `expected`.
pub(crate) fn check_width(input: &Tensor, expected: usize) -> ModelResult<()> {
    let actual = input.shape().last().copied().unwrap_or(0);
    if actual != expected {
        return Err(ModelError::InputWidth { expected, actual });
    }
    Ok(())
}
