//! Learning-rate reduction on a validation plateau.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Scales the learning rate down when the monitored loss stops improving.
///
/// A value counts as better when it is below `best * (1 - threshold)`.
/// After `patience` consecutive non-improving steps the rate is multiplied
/// by `factor` and the counter restarts.
///
/// # Example
///
/// ```
/// use district_training::ReduceLrOnPlateau;
///
/// let mut sched = ReduceLrOnPlateau::new(0.5, 2);
/// assert_eq!(sched.step(1.0, 0.1), None);
/// assert_eq!(sched.step(1.0, 0.1), None);
/// assert_eq!(sched.step(1.0, 0.1), Some(0.05));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceLrOnPlateau {
    factor: f32,
    patience: usize,
    threshold: f64,
    min_lr: f32,
    best: Option<f64>,
    bad_epochs: usize,
}

impl ReduceLrOnPlateau {
    /// Creates a scheduler with a relative threshold of `1e-4`.
    pub fn new(factor: f32, patience: usize) -> Self {
        Self {
            factor,
            patience,
            threshold: 1e-4,
            min_lr: 0.0,
            best: None,
            bad_epochs: 0,
        }
    }

    /// Sets the relative improvement threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the floor the rate never drops below.
    pub fn with_min_lr(mut self, min_lr: f32) -> Self {
        self.min_lr = min_lr;
        self
    }

    /// Number of consecutive non-improving steps so far.
    pub fn bad_epochs(&self) -> usize {
        self.bad_epochs
    }

    /// Records `value` and returns the new rate when a reduction is due.
    pub fn step(&mut self, value: f64, current_lr: f32) -> Option<f32> {
        let improved = match self.best {
            None => true,
            Some(best) => value < best * (1.0 - self.threshold),
        };
        if improved {
            self.best = Some(value);
            self.bad_epochs = 0;
            return None;
        }

        self.bad_epochs += 1;
        if self.bad_epochs <= self.patience {
            return None;
        }
        self.bad_epochs = 0;
        let new_lr = (current_lr * self.factor).max(self.min_lr);
        if current_lr - new_lr > 1e-8 {
            info!(from = current_lr, to = new_lr, "Reducing learning rate");
            Some(new_lr)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_improvement_resets_counter() {
        let mut sched = ReduceLrOnPlateau::new(0.5, 1);
        sched.step(1.0, 0.1);
        sched.step(1.0, 0.1);
        assert_eq!(sched.bad_epochs(), 1);
        assert_eq!(sched.step(0.5, 0.1), None);
        assert_eq!(sched.bad_epochs(), 0);
    }

    #[test]
    fn test_tiny_improvement_is_not_enough() {
        let mut sched = ReduceLrOnPlateau::new(0.5, 0);
        sched.step(1.0, 0.1);
        // within the relative threshold
        assert_eq!(sched.step(0.99999, 0.1), Some(0.05));
    }

    #[test]
    fn test_min_lr_floor() {
        let mut sched = ReduceLrOnPlateau::new(0.5, 0).with_min_lr(0.08);
        sched.step(1.0, 0.1);
        assert_eq!(sched.step(1.0, 0.1), Some(0.08));
        assert_eq!(sched.step(1.0, 0.08), None);
    }
}
