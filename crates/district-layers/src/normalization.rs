//! Batch normalization over the feature axis of 2D inputs.

use crate::error::{LayerError, LayerResult};
use crate::layer::{grad_or_zeros, Layer};
use crate::tensor::Tensor;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Batch normalization layer.
///
/// Training passes normalize with batch statistics and update the running
/// estimates as `running = (1 - momentum) * running + momentum * batch`.
/// Inference passes use the running estimates only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    /// Scale parameter
    gamma: Tensor,
    /// Shift parameter
    beta: Tensor,
    /// Running mean used at inference
    running_mean: Tensor,
    /// Running (unbiased) variance used at inference
    running_var: Tensor,
    /// Weight of the current batch in the running update
    momentum: f32,
    /// Numerical stability constant
    eps: f32,
    /// Number of features
    num_features: usize,
    #[serde(skip)]
    gamma_grad: Option<Tensor>,
    #[serde(skip)]
    beta_grad: Option<Tensor>,
    #[serde(skip)]
    cached_input: Option<Tensor>,
    #[serde(skip)]
    cached_mean: Option<Tensor>,
    #[serde(skip)]
    cached_var: Option<Tensor>,
}

impl BatchNorm {
    /// Creates a batch normalization layer with momentum 0.1 and eps 1e-5.
    pub fn new(num_features: usize) -> Self {
        Self::with_params(num_features, 0.1, 1e-5)
    }

    /// Creates a batch normalization layer with explicit momentum and eps.
    pub fn with_params(num_features: usize, momentum: f32, eps: f32) -> Self {
        Self {
            gamma: Tensor::ones(&[num_features]),
            beta: Tensor::zeros(&[num_features]),
            running_mean: Tensor::zeros(&[num_features]),
            running_var: Tensor::ones(&[num_features]),
            momentum,
            eps,
            num_features,
            gamma_grad: None,
            beta_grad: None,
            cached_input: None,
            cached_mean: None,
            cached_var: None,
        }
    }

    /// Returns references to running mean/var.
    pub fn running_stats(&self) -> (&Tensor, &Tensor) {
        (&self.running_mean, &self.running_var)
    }

    fn check_input(&self, input: &Tensor) -> LayerResult<()> {
        if input.ndim() != 2 {
            return Err(LayerError::ForwardError {
                message: format!("BatchNorm expects 2D input, got {}D", input.ndim()),
            });
        }
        if input.cols() != self.num_features {
            return Err(LayerError::InvalidInputDimension {
                expected: self.num_features,
                actual: input.cols(),
            });
        }
        Ok(())
    }

    fn normalize(&self, input: &Tensor, mean: &Tensor, var: &Tensor) -> Tensor {
        let dim = self.num_features;
        let mut output = vec![0.0; input.numel()];
        for (idx, out) in output.iter_mut().enumerate() {
            let j = idx % dim;
            let x_norm = (input.data()[idx] - mean.data()[j]) / (var.data()[j] + self.eps).sqrt();
            *out = self.gamma.data()[j] * x_norm + self.beta.data()[j];
        }
        Tensor::from_data(input.shape(), output)
    }
}

impl Layer for BatchNorm {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        self.check_input(input)?;
        Ok(self.normalize(input, &self.running_mean, &self.running_var))
    }

    fn forward_train(&mut self, input: &Tensor, _rng: &mut dyn RngCore) -> LayerResult<Tensor> {
        self.check_input(input)?;
        let batch_size = input.rows();
        if batch_size == 0 {
            return Ok(input.clone());
        }

        let mean = input.mean_rows();
        let var = input.var_rows();

        let m = self.momentum;
        let unbiased = if batch_size > 1 {
            batch_size as f32 / (batch_size - 1) as f32
        } else {
            1.0
        };
        for j in 0..self.num_features {
            let rm = &mut self.running_mean.data_mut()[j];
            *rm = (1.0 - m) * *rm + m * mean.data()[j];
            let rv = &mut self.running_var.data_mut()[j];
            *rv = (1.0 - m) * *rv + m * var.data()[j] * unbiased;
        }

        let output = self.normalize(input, &mean, &var);
        self.cached_input = Some(input.clone());
        self.cached_mean = Some(mean);
        self.cached_var = Some(var);
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        let mean = self
            .cached_mean
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        let var = self.cached_var.as_ref().ok_or(LayerError::NotInitialized)?;

        if grad.shape() != input.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: input.shape().to_vec(),
                actual: grad.shape().to_vec(),
            });
        }

        let batch_size = input.rows();
        let dim = self.num_features;
        let n = batch_size as f32;

        let inv_std: Vec<f32> = var
            .data()
            .iter()
            .map(|&v| 1.0 / (v.max(0.0) + self.eps).sqrt())
            .collect();

        let mut d_beta = vec![0.0f32; dim];
        let mut d_gamma = vec![0.0f32; dim];
        let mut dx_hat = vec![0.0f32; input.numel()];
        for i in 0..batch_size {
            for j in 0..dim {
                let idx = i * dim + j;
                let x_hat = (input.data()[idx] - mean.data()[j]) * inv_std[j];
                d_beta[j] += grad.data()[idx];
                d_gamma[j] += grad.data()[idx] * x_hat;
                dx_hat[idx] = grad.data()[idx] * self.gamma.data()[j];
            }
        }
        self.beta_grad = Some(Tensor::from_data(&[dim], d_beta));
        self.gamma_grad = Some(Tensor::from_data(&[dim], d_gamma));

        // dvar and dmu per channel.
        let mut dvar = vec![0.0f32; dim];
        let mut dmu = vec![0.0f32; dim];
        for j in 0..dim {
            let mut sum_dxhat_xmu = 0.0f32;
            let mut sum_xmu = 0.0f32;
            let mut sum_dxhat = 0.0f32;
            for i in 0..batch_size {
                let idx = i * dim + j;
                let xmu = input.data()[idx] - mean.data()[j];
                sum_dxhat_xmu += dx_hat[idx] * xmu;
                sum_xmu += xmu;
                sum_dxhat += dx_hat[idx];
            }
            let inv_std3 = inv_std[j] * inv_std[j] * inv_std[j];
            dvar[j] = -0.5 * sum_dxhat_xmu * inv_std3;
            dmu[j] = -inv_std[j] * sum_dxhat + dvar[j] * (-2.0 * sum_xmu / n);
        }

        let mut dx = vec![0.0f32; input.numel()];
        for i in 0..batch_size {
            for j in 0..dim {
                let idx = i * dim + j;
                let xmu = input.data()[idx] - mean.data()[j];
                dx[idx] = dx_hat[idx] * inv_std[j] + dvar[j] * 2.0 * xmu / n + dmu[j] / n;
            }
        }

        Ok(Tensor::from_data(input.shape(), dx))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.gamma, &self.beta]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.gamma, &mut self.beta]
    }

    fn gradients(&self) -> Vec<Tensor> {
        vec![
            grad_or_zeros(&self.gamma_grad, &self.gamma),
            grad_or_zeros(&self.beta_grad, &self.beta),
        ]
    }

    fn name(&self) -> &str {
        "BatchNorm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_training_pass_normalizes_batch() {
        let mut bn = BatchNorm::new(2);
        let mut rng = StdRng::seed_from_u64(0);
        let input = Tensor::from_data(&[4, 2], vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0, 4.0, 40.0]);
        let out = bn.forward_train(&input, &mut rng).unwrap();
        let mean = out.mean_rows();
        assert!(mean.data().iter().all(|m| m.abs() < 1e-5));
        let var = out.var_rows();
        assert!(var.data().iter().all(|v| (v - 1.0).abs() < 1e-3));
    }

    #[test]
    fn test_running_stats_update() {
        let mut bn = BatchNorm::new(1);
        let mut rng = StdRng::seed_from_u64(0);
        let input = Tensor::from_data(&[2, 1], vec![2.0, 4.0]);
        bn.forward_train(&input, &mut rng).unwrap();
        let (rm, rv) = bn.running_stats();
        assert!((rm.data()[0] - 0.3).abs() < 1e-6);
        // unbiased batch var is 2.0
        assert!((rv.data()[0] - (0.9 + 0.2)).abs() < 1e-6);
    }

    #[test]
    fn test_inference_uses_running_stats() {
        let bn = BatchNorm::new(2);
        let input = Tensor::from_data(&[1, 2], vec![0.5, -0.5]);
        let out = bn.forward(&input).unwrap();
        assert!((out.data()[0] - 0.5).abs() < 1e-3);
        assert!((out.data()[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_backward_gradient_sums_to_zero() {
        let mut bn = BatchNorm::new(1);
        let mut rng = StdRng::seed_from_u64(0);
        let input = Tensor::from_data(&[3, 1], vec![1.0, 2.0, 6.0]);
        bn.forward_train(&input, &mut rng).unwrap();
        let grad = Tensor::from_data(&[3, 1], vec![0.3, -0.1, 0.7]);
        let dx = bn.backward(&grad).unwrap();
        assert!(dx.sum().abs() < 1e-4);
        assert!((bn.gradients()[1].data()[0] - 0.9).abs() < 1e-6);
    }
}
