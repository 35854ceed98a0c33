//! Dense (fully connected) layer implementation.
//!
//! This module provides the [`Dense`] layer, which performs a linear
//! transformation `y = xW + b` where W is the weight matrix and b is the bias
//! vector.

use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::{grad_or_zeros, Layer};
use crate::tensor::Tensor;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// A dense (fully connected) neural network layer.
///
/// Performs the transformation `y = xW + b` where:
/// - `x` is the input tensor of shape `[batch_size, in_features]`
/// - `W` is the weight matrix of shape `[in_features, out_features]`
/// - `b` is the bias vector of shape `[out_features]`
/// - `y` is the output tensor of shape `[batch_size, out_features]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// Weight matrix of shape [in_features, out_features]
    weights: Tensor,
    /// Bias vector of shape [out_features]
    bias: Tensor,
    /// Gradient of weights
    #[serde(skip)]
    weights_grad: Option<Tensor>,
    /// Gradient of bias
    #[serde(skip)]
    bias_grad: Option<Tensor>,
    /// Cached input for backward pass
    #[serde(skip)]
    cached_input: Option<Tensor>,
    /// Input feature dimension
    in_features: usize,
    /// Output feature dimension
    out_features: usize,
}

impl Dense {
    /// Creates a new dense layer with the specified input and output dimensions.
    ///
    /// Weights and biases are drawn from `U(-1/sqrt(in), 1/sqrt(in))`.
    ///
    /// # Arguments
    ///
    /// * `in_features` - Number of input features
    /// * `out_features` - Number of output features
    /// * `rng` - Generator used for initialization
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        Self::new_with_initializer(
            in_features,
            out_features,
            Initializer::FanInUniform,
            Initializer::FanInUniform,
            rng,
        )
    }

    /// Creates a new dense layer with custom initializers.
    pub fn new_with_initializer<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        weight_init: Initializer,
        bias_init: Initializer,
        rng: &mut R,
    ) -> Self {
        let weights = weight_init.initialize(&[in_features, out_features], rng);
        // The bias fan-in is the layer's input width, not the bias length.
        let bias = match bias_init {
            Initializer::FanInUniform => {
                let limit = 1.0 / (in_features.max(1) as f32).sqrt();
                Tensor::rand_uniform(&[out_features], -limit, limit, rng)
            }
            other => other.initialize(&[out_features], rng),
        };
        Self {
            weights,
            bias,
            weights_grad: None,
            bias_grad: None,
            cached_input: None,
            in_features,
            out_features,
        }
    }

    /// Creates a dense layer with custom weights and bias.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes are incompatible
    pub fn from_weights(weights: Tensor, bias: Tensor) -> LayerResult<Self> {
        if weights.ndim() != 2 {
            return Err(LayerError::ConfigError {
                message: format!("Weights must be 2D, got {}D", weights.ndim()),
            });
        }
        if bias.ndim() != 1 || weights.shape()[1] != bias.shape()[0] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![weights.shape()[1]],
                actual: bias.shape().to_vec(),
            });
        }
        let in_features = weights.shape()[0];
        let out_features = weights.shape()[1];
        Ok(Self {
            weights,
            bias,
            weights_grad: None,
            bias_grad: None,
            cached_input: None,
            in_features,
            out_features,
        })
    }

    /// Returns the input feature dimension.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Returns the output feature dimension.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Returns a reference to the weights tensor.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Returns a reference to the bias tensor.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Returns the weight gradients if available.
    pub fn weights_grad(&self) -> Option<&Tensor> {
        self.weights_grad.as_ref()
    }

    /// Returns the bias gradients if available.
    pub fn bias_grad(&self) -> Option<&Tensor> {
        self.bias_grad.as_ref()
    }

    fn check_input(&self, input: &Tensor) -> LayerResult<()> {
        if input.ndim() != 2 {
            return Err(LayerError::ForwardError {
                message: format!("Dense expects 2D input, got {}D", input.ndim()),
            });
        }
        if input.cols() != self.in_features {
            return Err(LayerError::InvalidInputDimension {
                expected: self.in_features,
                actual: input.cols(),
            });
        }
        Ok(())
    }
}

impl Layer for Dense {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        self.check_input(input)?;
        Ok(input.matmul(&self.weights).add(&self.bias))
    }

    fn forward_train(&mut self, input: &Tensor, _rng: &mut dyn RngCore) -> LayerResult<Tensor> {
        let output = self.forward(input)?;
        self.cached_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;

        if grad.ndim() != 2 || grad.cols() != self.out_features || grad.rows() != input.rows() {
            return Err(LayerError::ShapeMismatch {
                expected: vec![input.rows(), self.out_features],
                actual: grad.shape().to_vec(),
            });
        }

        // dW = x^T * grad, db = sum(grad, axis=0), dx = grad * W^T
        self.weights_grad = Some(input.transpose().matmul(grad));
        self.bias_grad = Some(grad.sum_rows());
        Ok(grad.matmul(&self.weights.transpose()))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weights, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weights, &mut self.bias]
    }

    fn gradients(&self) -> Vec<Tensor> {
        vec![
            grad_or_zeros(&self.weights_grad, &self.weights),
            grad_or_zeros(&self.bias_grad, &self.bias),
        ]
    }

    fn name(&self) -> &str {
        "Dense"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_dense_forward_shape() {
        let layer = Dense::new(10, 5, &mut rng());
        let input = Tensor::ones(&[3, 10]);
        let output = layer.forward(&input).unwrap();
        assert_eq!(output.shape(), &[3, 5]);
    }

    #[test]
    fn test_dense_rejects_wrong_width() {
        let layer = Dense::new(10, 5, &mut rng());
        let input = Tensor::ones(&[3, 9]);
        assert!(matches!(
            layer.forward(&input),
            Err(LayerError::InvalidInputDimension {
                expected: 10,
                actual: 9
            })
        ));
    }

    #[test]
    fn test_dense_from_weights_forward() {
        let weights = Tensor::from_data(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let bias = Tensor::from_data(&[2], vec![0.5, -0.5]);
        let layer = Dense::from_weights(weights, bias).unwrap();
        let input = Tensor::from_data(&[1, 2], vec![1.0, 1.0]);
        let output = layer.forward(&input).unwrap();
        assert_eq!(output.data(), &[4.5, 5.5]);
    }

    #[test]
    fn test_dense_backward_matches_finite_difference() {
        let mut r = rng();
        let mut layer = Dense::new(3, 2, &mut r);
        let input = Tensor::from_data(&[2, 3], vec![0.1, -0.2, 0.3, 0.5, 0.4, -0.1]);

        // Loss = sum(output), so the upstream gradient is all ones.
        layer.forward_train(&input, &mut r).unwrap();
        layer.backward(&Tensor::ones(&[2, 2])).unwrap();
        let analytic = layer.weights_grad().unwrap().data()[0];

        let eps = 1e-3;
        let mut plus = layer.clone();
        plus.weights.data_mut()[0] += eps;
        let mut minus = layer.clone();
        minus.weights.data_mut()[0] -= eps;
        let numeric =
            (plus.forward(&input).unwrap().sum() - minus.forward(&input).unwrap().sum()) / (2.0 * eps);
        assert!((analytic - numeric).abs() < 1e-2);
        assert_eq!(layer.bias_grad().unwrap().data(), &[2.0, 2.0]);
    }

    #[test]
    fn test_backward_without_forward_fails() {
        let mut layer = Dense::new(3, 2, &mut rng());
        assert!(layer.backward(&Tensor::ones(&[1, 2])).is_err());
        assert_eq!(layer.gradients().len(), 2);
    }
}
