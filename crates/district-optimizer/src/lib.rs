//! Parameter optimizers for district models.
//!
//! Each optimizer implements the [`Optimizer`] trait and updates one flat
//! parameter buffer in place. Trainers keep one optimizer per parameter
//! tensor so per-element state (Adam moments) lines up with the buffer.
//!
//! # Available Optimizers
//!
//! - [`Sgd`] - Stochastic Gradient Descent
//! - [`Adam`] - Adaptive Moment Estimation
//!
//! # Example
//!
//! ```
//! use district_optimizer::{Optimizer, Sgd, OptimizerConfig};
//!
//! let config = OptimizerConfig::Sgd { learning_rate: 0.01 };
//! let mut optimizer = Sgd::new(config).unwrap();
//!
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//!
//! optimizer.apply_gradients(&mut weights, &gradients);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adam;
mod clip;
mod sgd;

pub use adam::Adam;
pub use clip::clip_grad_norm;
pub use sgd::Sgd;

/// Errors that can occur when working with optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration type does not match the optimizer type.
    #[error("Config mismatch: expected {expected}, got {got}")]
    ConfigMismatch {
        /// Optimizer that was being built
        expected: String,
        /// Variant that was supplied
        got: String,
    },

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Configuration for different optimizer types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptimizerConfig {
    /// Stochastic Gradient Descent configuration.
    Sgd {
        /// Learning rate for gradient updates.
        learning_rate: f32,
    },

    /// Adam configuration.
    Adam {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Exponential decay rate for first moment estimates.
        beta1: f32,
        /// Exponential decay rate for second moment estimates.
        beta2: f32,
        /// Small constant for numerical stability.
        epsilon: f32,
    },
}

impl OptimizerConfig {
    /// Adam with the usual defaults (`beta1 = 0.9`, `beta2 = 0.999`,
    /// `epsilon = 1e-8`).
    pub fn adam(learning_rate: f32) -> Self {
        OptimizerConfig::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "Sgd",
            OptimizerConfig::Adam { .. } => "Adam",
        }
    }

    /// Returns the learning rate for the optimizer.
    pub fn learning_rate(&self) -> f32 {
        match self {
            OptimizerConfig::Sgd { learning_rate } => *learning_rate,
            OptimizerConfig::Adam { learning_rate, .. } => *learning_rate,
        }
    }

    /// Replaces the learning rate, keeping every other setting.
    pub fn set_learning_rate(&mut self, lr: f32) {
        match self {
            OptimizerConfig::Sgd { learning_rate } => *learning_rate = lr,
            OptimizerConfig::Adam { learning_rate, .. } => *learning_rate = lr,
        }
    }

    /// Checks that every hyperparameter is in range.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::InvalidParameter`] naming the first bad value.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                lr
            )));
        }
        if let OptimizerConfig::Adam { beta1, beta2, .. } = self {
            for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
                if !(0.0..1.0).contains(beta) {
                    return Err(OptimizerError::InvalidParameter(format!(
                        "{} must be in [0, 1), got {}",
                        name, beta
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Trait for parameter optimizers.
///
/// Optimizers are responsible for updating a parameter buffer based on
/// computed gradients.
pub trait Optimizer: Sized {
    /// Creates a new optimizer from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] if the configuration type
    /// does not match the optimizer type.
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError>;

    /// Applies gradients to update the parameter buffer.
    ///
    /// # Arguments
    ///
    /// * `params` - The parameters to update (modified in place).
    /// * `gradients` - The gradient vector to apply.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;

    /// Returns the current learning rate.
    fn learning_rate(&self) -> f32 {
        self.config().learning_rate()
    }

    /// Changes the learning rate used by later updates.
    fn set_learning_rate(&mut self, lr: f32);
}

/// Creates an optimizer from the given configuration.
///
/// # Example
///
/// ```
/// use district_optimizer::{create_optimizer, OptimizerConfig};
///
/// let optimizer = create_optimizer(OptimizerConfig::adam(0.001)).unwrap();
/// assert_eq!(optimizer.config().name(), "Adam");
/// ```
///
/// # Errors
///
/// Returns an error if the configuration fails [`OptimizerConfig::validate`].
pub fn create_optimizer(config: OptimizerConfig) -> Result<Box<dyn OptimizerDyn>, OptimizerError> {
    config.validate()?;
    Ok(match &config {
        OptimizerConfig::Sgd { .. } => Box::new(Sgd::new(config)?),
        OptimizerConfig::Adam { .. } => Box::new(Adam::new(config)?),
    })
}

/// Dynamic dispatch version of the Optimizer trait.
pub trait OptimizerDyn: Send {
    /// Applies gradients to update the parameter buffer.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;

    /// Returns the current learning rate.
    fn learning_rate(&self) -> f32;

    /// Changes the learning rate used by later updates.
    fn set_learning_rate(&mut self, lr: f32);
}

impl<T: Optimizer + Send> OptimizerDyn for T {
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        Optimizer::apply_gradients(self, params, gradients)
    }

    fn config(&self) -> &OptimizerConfig {
        Optimizer::config(self)
    }

    fn learning_rate(&self) -> f32 {
        Optimizer::learning_rate(self)
    }

    fn set_learning_rate(&mut self, lr: f32) {
        Optimizer::set_learning_rate(self, lr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_config_name() {
        let sgd = OptimizerConfig::Sgd { learning_rate: 0.01 };
        assert_eq!(sgd.name(), "Sgd");
        assert_eq!(OptimizerConfig::adam(0.001).name(), "Adam");
    }

    #[test]
    fn test_set_learning_rate_keeps_betas() {
        let mut config = OptimizerConfig::adam(0.001);
        config.set_learning_rate(0.0005);
        assert_eq!(
            config,
            OptimizerConfig::Adam {
                learning_rate: 0.0005,
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-8,
            }
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(OptimizerConfig::Sgd { learning_rate: 0.0 }.validate().is_err());
        assert!(OptimizerConfig::Adam {
            learning_rate: 0.1,
            beta1: 1.0,
            beta2: 0.999,
            epsilon: 1e-8,
        }
        .validate()
        .is_err());
        assert!(create_optimizer(OptimizerConfig::Sgd {
            learning_rate: f32::NAN
        })
        .is_err());
    }

    #[test]
    fn test_create_optimizer_dyn_learning_rate() {
        let mut optimizer = create_optimizer(OptimizerConfig::Sgd { learning_rate: 0.5 }).unwrap();
        let mut params = vec![1.0, 2.0];
        optimizer.apply_gradients(&mut params, &[1.0, 1.0]);
        assert_eq!(params, vec![0.5, 1.5]);

        optimizer.set_learning_rate(0.25);
        assert!((optimizer.learning_rate() - 0.25).abs() < 1e-9);
        optimizer.apply_gradients(&mut params, &[1.0, 1.0]);
        assert_eq!(params, vec![0.25, 1.25]);
    }

    #[test]
    fn test_optimizer_config_serialization() {
        let config = OptimizerConfig::adam(0.001);
        let serialized = serde_json::to_string(&config).unwrap();
        let deserialized: OptimizerConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }
}
