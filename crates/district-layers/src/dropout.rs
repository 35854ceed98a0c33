//! Inverted dropout.
//!
//! [`Dropout::forward`] is the identity. Masks are only sampled by
//! [`Dropout::forward_stochastic`] and [`Dropout::forward_train`], with kept
//! units scaled by `1 / (1 - rate)` so expectations match inference.

use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;
use crate::tensor::Tensor;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Dropout layer with a fixed drop probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dropout {
    /// Probability of zeroing each unit
    rate: f32,
    /// Scaled keep mask from the last training pass
    #[serde(skip)]
    cached_mask: Option<Tensor>,
}

impl Dropout {
    /// Creates a dropout layer.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ConfigError`] if `rate` is outside `[0, 1)`.
    pub fn new(rate: f32) -> LayerResult<Self> {
        if !(0.0..1.0).contains(&rate) {
            return Err(LayerError::ConfigError {
                message: format!("dropout rate must be in [0, 1), got {}", rate),
            });
        }
        Ok(Self {
            rate,
            cached_mask: None,
        })
    }

    /// Returns the drop probability.
    pub fn rate(&self) -> f32 {
        self.rate
    }

    fn sample_mask(&self, shape: &[usize], rng: &mut dyn RngCore) -> Tensor {
        let keep = 1.0 - self.rate;
        let numel: usize = shape.iter().product();
        let data = (0..numel)
            .map(|_| {
                if rng.gen::<f32>() < keep {
                    1.0 / keep
                } else {
                    0.0
                }
            })
            .collect();
        Tensor::from_data(shape, data)
    }
}

impl Layer for Dropout {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        Ok(input.clone())
    }

    fn forward_stochastic(&self, input: &Tensor, rng: &mut dyn RngCore) -> LayerResult<Tensor> {
        if self.rate == 0.0 {
            return Ok(input.clone());
        }
        let mask = self.sample_mask(input.shape(), rng);
        Ok(input.mul(&mask))
    }

    fn forward_train(&mut self, input: &Tensor, rng: &mut dyn RngCore) -> LayerResult<Tensor> {
        let mask = if self.rate == 0.0 {
            Tensor::ones(input.shape())
        } else {
            self.sample_mask(input.shape(), rng)
        };
        let output = input.mul(&mask);
        self.cached_mask = Some(mask);
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let mask = self
            .cached_mask
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        Ok(grad.mul(mask))
    }

    fn name(&self) -> &str {
        "Dropout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_forward_is_identity() {
        let dropout = Dropout::new(0.5).unwrap();
        let input = Tensor::ones(&[4, 8]);
        assert_eq!(dropout.forward(&input).unwrap(), input);
    }

    #[test]
    fn test_stochastic_pass_zeroes_and_scales() {
        let dropout = Dropout::new(0.5).unwrap();
        let input = Tensor::ones(&[10, 10]);
        let mut rng = StdRng::seed_from_u64(9);
        let out = dropout.forward_stochastic(&input, &mut rng).unwrap();
        assert!(out.data().iter().all(|&x| x == 0.0 || (x - 2.0).abs() < 1e-6));
        assert!(out.data().iter().any(|&x| x == 0.0));
        assert!(out.data().iter().any(|&x| x > 0.0));
    }

    #[test]
    fn test_backward_reuses_mask() {
        let mut dropout = Dropout::new(0.3).unwrap();
        let input = Tensor::ones(&[3, 5]);
        let mut rng = StdRng::seed_from_u64(1);
        let out = dropout.forward_train(&input, &mut rng).unwrap();
        let grad = dropout.backward(&Tensor::ones(&[3, 5])).unwrap();
        assert_eq!(out, grad);
    }

    #[test]
    fn test_rejects_invalid_rate() {
        assert!(Dropout::new(1.0).is_err());
        assert!(Dropout::new(-0.1).is_err());
    }
}
