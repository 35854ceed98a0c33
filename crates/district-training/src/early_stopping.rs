//! Patience-based early stopping on the validation loss.

use tracing::{debug, info};

/// Tracks the best validation loss and decides when to stop.
///
/// An epoch improves only when its loss is strictly below
/// `best - min_delta`. Training stops once `patience` epochs in a row fail
/// to improve.
///
/// # Example
///
/// ```
/// use district_training::EarlyStopping;
///
/// let mut stopper = EarlyStopping::new(2);
/// assert!(stopper.update(1, 0.5));
/// assert!(!stopper.update(2, 0.5));
/// assert!(!stopper.should_stop());
/// assert!(!stopper.update(3, 0.6));
/// assert!(stopper.should_stop());
/// assert_eq!(stopper.best_epoch(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    /// Epochs without improvement tolerated before stopping.
    patience: usize,
    /// Minimum decrease that counts as an improvement.
    min_delta: f64,
    /// Best loss seen so far.
    best_value: Option<f64>,
    /// 1-based epoch of the best loss.
    best_epoch: usize,
    /// Epochs since the last improvement.
    epochs_without_improvement: usize,
}

impl EarlyStopping {
    /// Creates a stopper with no minimum delta.
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            min_delta: 0.0,
            best_value: None,
            best_epoch: 0,
            epochs_without_improvement: 0,
        }
    }

    /// Sets the minimum decrease that counts as an improvement.
    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    fn is_improvement(&self, current: f64) -> bool {
        match self.best_value {
            None => true,
            Some(best) => current < best - self.min_delta,
        }
    }

    /// Records the loss of `epoch` and returns whether it is a new best.
    pub fn update(&mut self, epoch: usize, value: f64) -> bool {
        if self.is_improvement(value) {
            debug!(epoch, from = ?self.best_value, to = value, "Validation loss improved");
            self.best_value = Some(value);
            self.best_epoch = epoch;
            self.epochs_without_improvement = 0;
            true
        } else {
            self.epochs_without_improvement += 1;
            debug!(
                epoch,
                stale = self.epochs_without_improvement,
                patience = self.patience,
                "No improvement"
            );
            if self.should_stop() {
                info!(epoch, best_epoch = self.best_epoch, "Stopping early");
            }
            false
        }
    }

    /// True once patience is exhausted.
    pub fn should_stop(&self) -> bool {
        self.epochs_without_improvement >= self.patience
    }

    /// Best loss so far, if any epoch was recorded.
    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    /// 1-based epoch of the best loss, 0 before any update.
    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    /// Epochs since the last improvement.
    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs_without_improvement
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_loss_is_not_improvement() {
        let mut stopper = EarlyStopping::new(5);
        stopper.update(1, 1.0);
        assert!(!stopper.update(2, 1.0));
        assert_eq!(stopper.epochs_without_improvement(), 1);
    }

    #[test]
    fn test_min_delta() {
        let mut stopper = EarlyStopping::new(5).with_min_delta(0.1);
        stopper.update(1, 1.0);
        assert!(!stopper.update(2, 0.95));
        assert!(stopper.update(3, 0.85));
        assert_eq!(stopper.best_epoch(), 3);
        assert_eq!(stopper.best_value(), Some(0.85));
    }

    #[test]
    fn test_stops_after_patience() {
        let mut stopper = EarlyStopping::new(3);
        stopper.update(1, 0.1);
        for epoch in 2..=3 {
            stopper.update(epoch, 0.2);
            assert!(!stopper.should_stop());
        }
        stopper.update(4, 0.2);
        assert!(stopper.should_stop());
    }
}
