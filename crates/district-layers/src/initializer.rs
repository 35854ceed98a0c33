//! Weight initialization schemes.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// How a parameter tensor is filled at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Initializer {
    /// `U(-1/sqrt(fan_in), 1/sqrt(fan_in))`, the usual default for linear
    /// and recurrent weights.
    #[default]
    FanInUniform,
    /// Glorot/Xavier uniform initialization.
    GlorotUniform,
    /// He/Kaiming uniform initialization.
    HeUniform,
    /// Normal distribution with zero mean.
    Normal {
        /// Standard deviation
        std: f32,
    },
    /// All zeros.
    Zeros,
    /// Constant value.
    Constant(f32),
}

impl Initializer {
    /// Creates a tensor of `shape` filled according to this scheme.
    pub fn initialize<R: Rng + ?Sized>(&self, shape: &[usize], rng: &mut R) -> Tensor {
        match self {
            Initializer::Zeros => Tensor::zeros(shape),
            Initializer::Constant(value) => Tensor::full(shape, *value),
            Initializer::FanInUniform => {
                let (fan_in, _) = fan_in_out(shape);
                let limit = 1.0 / (fan_in as f32).sqrt();
                Tensor::rand_uniform(shape, -limit, limit, rng)
            }
            Initializer::GlorotUniform => {
                let (fan_in, fan_out) = fan_in_out(shape);
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                Tensor::rand_uniform(shape, -limit, limit, rng)
            }
            Initializer::HeUniform => {
                let (fan_in, _) = fan_in_out(shape);
                let limit = (6.0 / fan_in as f32).sqrt();
                Tensor::rand_uniform(shape, -limit, limit, rng)
            }
            Initializer::Normal { std } => Tensor::randn(shape, 0.0, *std, rng),
        }
    }
}

fn fan_in_out(shape: &[usize]) -> (usize, usize) {
    match shape.len() {
        0 => (1, 1),
        1 => (shape[0].max(1), shape[0].max(1)),
        _ => (shape[0].max(1), shape[1].max(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fan_in_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        let t = Initializer::FanInUniform.initialize(&[16, 4], &mut rng);
        let limit = 0.25;
        assert!(t.data().iter().all(|&x| x.abs() <= limit));
        assert!(t.data().iter().any(|&x| x != 0.0));
    }

    #[test]
    fn test_constant_and_zeros() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(Initializer::Zeros.initialize(&[3], &mut rng).sum(), 0.0);
        assert_eq!(
            Initializer::Constant(0.5).initialize(&[4], &mut rng).sum(),
            2.0
        );
    }

    #[test]
    fn test_glorot_limit() {
        let mut rng = StdRng::seed_from_u64(5);
        let t = Initializer::GlorotUniform.initialize(&[3, 3], &mut rng);
        let limit = 1.0f32;
        assert!(t.data().iter().all(|&x| x.abs() <= limit));
    }
}
