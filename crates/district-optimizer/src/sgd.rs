//! Stochastic Gradient Descent (SGD) optimizer.
//!
//! # Example
//!
//! ```
//! use district_optimizer::{Optimizer, Sgd, OptimizerConfig};
//!
//! let config = OptimizerConfig::Sgd { learning_rate: 0.01 };
//! let mut sgd = Sgd::new(config).unwrap();
//! let mut weights = vec![1.0, 2.0, 3.0];
//! sgd.apply_gradients(&mut weights, &[0.1, 0.2, 0.3]);
//! ```

use crate::{Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// Stochastic Gradient Descent optimizer.
///
/// Updates parameters using `param = param - learning_rate * gradient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sgd {
    /// Learning rate for gradient updates.
    learning_rate: f32,
    /// Configuration used to create this optimizer.
    config: OptimizerConfig,
}

impl Sgd {
    /// Creates a new SGD optimizer with the given learning rate.
    pub fn with_learning_rate(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            config: OptimizerConfig::Sgd { learning_rate },
        }
    }
}

impl Optimizer for Sgd {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Sgd { learning_rate } => Ok(Self {
                learning_rate,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Sgd".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        for (p, g) in params.iter_mut().zip(gradients.iter()) {
            *p -= self.learning_rate * g;
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
        self.config.set_learning_rate(lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_basic_update() {
        let mut sgd = Sgd::with_learning_rate(0.1);
        let mut params = vec![1.0, 2.0, 3.0];
        sgd.apply_gradients(&mut params, &[1.0, 1.0, 1.0]);
        assert!((params[0] - 0.9).abs() < 1e-6);
        assert!((params[1] - 1.9).abs() < 1e-6);
        assert!((params[2] - 2.9).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_config_mismatch() {
        assert!(Sgd::new(OptimizerConfig::adam(0.01)).is_err());
    }
}
