//! Generic supervised training loop.
//!
//! One [`Trainer`] fits any [`Trainable`] model on any [`Dataset`] whose
//! input type matches. A run goes through these steps:
//!
//! 1. Split the samples into training and validation sets with a seeded
//!    shuffle.
//! 2. For each epoch, shuffle the training indices and step an Adam
//!    optimizer per parameter tensor on every mini-batch, after clipping
//!    the global gradient norm.
//! 3. Score the validation set deterministically, step the plateau
//!    scheduler and the early stopper.
//! 4. Restore the weights of the best validation epoch.

use crate::early_stopping::EarlyStopping;
use crate::error::{TrainingError, TrainingResult};
use crate::history::{round_to, TrainingHistory};
use crate::loss::Loss;
use crate::schedule::ReduceLrOnPlateau;
use district_features::Dataset;
use district_models::Trainable;
use district_optimizer::{clip_grad_norm, create_optimizer, OptimizerConfig, OptimizerDyn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Settings of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Initial Adam learning rate
    pub learning_rate: f32,
    /// Epoch budget
    pub epochs: usize,
    /// Training mini-batch size
    pub batch_size: usize,
    /// Epochs without improvement before stopping
    pub patience: usize,
    /// Smallest validation-loss decrease that resets the patience counter
    pub min_delta: f64,
    /// Fraction of samples held out for validation
    pub val_split: f64,
    /// Global gradient-norm ceiling
    pub clip_norm: f32,
    /// Learning-rate multiplier on plateau
    pub plateau_factor: f32,
    /// Stale epochs before the learning rate drops
    pub plateau_patience: usize,
    /// Relative improvement the plateau schedule requires
    pub plateau_threshold: f64,
    /// Floor of the scheduled learning rate
    pub min_lr: f32,
    /// Seed for the split, shuffling and dropout
    pub seed: u64,
    /// Log a progress line every this many epochs
    pub log_every: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            epochs: 100,
            batch_size: 32,
            patience: 10,
            min_delta: 0.0,
            val_split: 0.2,
            clip_norm: 1.0,
            plateau_factor: 0.5,
            plateau_patience: 5,
            plateau_threshold: 1e-4,
            min_lr: 0.0,
            seed: 42,
            log_every: 20,
        }
    }
}

impl TrainerConfig {
    /// Sets the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the epoch budget.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the mini-batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the early-stopping patience.
    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    /// Sets the smallest decrease that counts as an improvement.
    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Sets the plateau schedule's relative threshold and rate floor.
    pub fn with_plateau_limits(mut self, threshold: f64, min_lr: f32) -> Self {
        self.plateau_threshold = threshold;
        self.min_lr = min_lr;
        self
    }

    /// Sets the validation fraction.
    pub fn with_val_split(mut self, val_split: f64) -> Self {
        self.val_split = val_split;
        self
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks every setting is in range.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> TrainingResult<()> {
        let invalid = |message: String| Err(TrainingError::InvalidConfig { message });
        if self.epochs == 0 {
            return invalid("epochs must be positive".into());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive".into());
        }
        if self.val_split.is_nan() || self.val_split <= 0.0 || self.val_split >= 1.0 {
            return invalid(format!("val_split must be in (0, 1), got {}", self.val_split));
        }
        if self.clip_norm.is_nan() || self.clip_norm <= 0.0 {
            return invalid(format!("clip_norm must be positive, got {}", self.clip_norm));
        }
        if self.plateau_factor.is_nan() || self.plateau_factor <= 0.0 || self.plateau_factor >= 1.0 {
            return invalid(format!(
                "plateau_factor must be in (0, 1), got {}",
                self.plateau_factor
            ));
        }
        if self.min_delta.is_nan() || self.min_delta < 0.0 {
            return invalid(format!("min_delta must be non-negative, got {}", self.min_delta));
        }
        if self.plateau_threshold.is_nan() || !(0.0..1.0).contains(&self.plateau_threshold) {
            return invalid(format!(
                "plateau_threshold must be in [0, 1), got {}",
                self.plateau_threshold
            ));
        }
        if self.min_lr.is_nan() || self.min_lr < 0.0 || self.min_lr > self.learning_rate {
            return invalid(format!(
                "min_lr must be in [0, learning_rate], got {}",
                self.min_lr
            ));
        }
        OptimizerConfig::adam(self.learning_rate).validate()?;
        Ok(())
    }
}

/// Splits `0..n` into training and validation indices.
///
/// The validation set holds `max(1, floor(n * val_split))` samples drawn by
/// a shuffle seeded with `seed`. When that leaves no training samples the
/// validation indices double as the training set.
///
/// # Example
///
/// ```
/// use district_training::split_indices;
///
/// let (train, val) = split_indices(10, 0.2, 42);
/// assert_eq!((train.len(), val.len()), (8, 2));
/// assert_eq!(split_indices(10, 0.2, 42), (train, val));
///
/// let (train, val) = split_indices(1, 0.2, 42);
/// assert_eq!((train, val), (vec![0], vec![0]));
/// ```
pub fn split_indices(n: usize, val_split: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let val_size = ((n as f64 * val_split).floor() as usize).max(1).min(n);
    let train = indices.split_off(val_size);
    if train.is_empty() {
        return (indices.clone(), indices);
    }
    (train, indices)
}

/// Drives the epoch loop for one model family.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    /// Creates a trainer after validating `config`.
    pub fn new(config: TrainerConfig) -> TrainingResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The run settings.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Fits `model` on `dataset` and leaves it holding the best weights.
    ///
    /// # Errors
    ///
    /// Fails on an empty dataset, on a model or batch error, or when the
    /// loss becomes non-finite. The model may hold partially trained
    /// weights after an error.
    pub fn train<M, D>(&self, model: &mut M, dataset: &D, loss: Loss) -> TrainingResult<TrainingHistory>
    where
        M: Trainable,
        D: Dataset<Input = M::Input>,
    {
        let n = dataset.len();
        if n == 0 {
            return Err(TrainingError::EmptyDataset);
        }
        let start = Instant::now();
        let cfg = &self.config;
        let (mut train_idx, val_idx) = split_indices(n, cfg.val_split, cfg.seed);

        let mut lr = cfg.learning_rate;
        let mut optimizers = model
            .parameters_mut()
            .iter()
            .map(|_| create_optimizer(OptimizerConfig::adam(lr)))
            .collect::<Result<Vec<Box<dyn OptimizerDyn>>, _>>()?;
        let mut scheduler = ReduceLrOnPlateau::new(cfg.plateau_factor, cfg.plateau_patience)
            .with_threshold(cfg.plateau_threshold)
            .with_min_lr(cfg.min_lr);
        let mut stopper = EarlyStopping::new(cfg.patience).with_min_delta(cfg.min_delta);
        let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(1));
        let mut best_model: Option<M> = None;
        let mut history = TrainingHistory::default();

        info!(
            model = model.name(),
            samples = n,
            train = train_idx.len(),
            val = val_idx.len(),
            loss = loss.name(),
            "Starting training"
        );

        for epoch in 1..=cfg.epochs {
            train_idx.shuffle(&mut rng);
            let mut train_total = 0.0;
            let mut train_batches = 0usize;
            for chunk in train_idx.chunks(cfg.batch_size) {
                let batch = dataset.batch(chunk)?;
                let predictions = model.forward_train(&batch.inputs, &mut rng)?;
                let (value, grad) = loss.compute(&predictions, &batch.targets)?;
                model.backward(&grad)?;

                let mut grads = model.gradients();
                {
                    let mut slices: Vec<&mut [f32]> = grads.iter_mut().map(|g| g.data_mut()).collect();
                    clip_grad_norm(&mut slices, cfg.clip_norm);
                }
                for ((optimizer, param), grad) in
                    optimizers.iter_mut().zip(model.parameters_mut()).zip(&grads)
                {
                    optimizer.apply_gradients(param.data_mut(), grad.data());
                }

                train_total += value;
                train_batches += 1;
            }
            let train_loss = train_total / train_batches.max(1) as f64;
            let val_loss = self.validation_loss(model, dataset, &val_idx, loss)?;
            if !train_loss.is_finite() || !val_loss.is_finite() {
                return Err(TrainingError::NonFiniteLoss {
                    value: if train_loss.is_finite() { val_loss } else { train_loss },
                    epoch,
                });
            }
            history.train_losses.push(train_loss);
            history.val_losses.push(val_loss);

            if let Some(new_lr) = scheduler.step(val_loss, lr) {
                lr = new_lr;
                for optimizer in optimizers.iter_mut() {
                    optimizer.set_learning_rate(lr);
                }
            }

            if stopper.update(epoch, val_loss) {
                best_model = Some(model.clone());
            }

            if cfg.log_every > 0 && epoch % cfg.log_every == 0 {
                info!(
                    model = model.name(),
                    epoch,
                    epochs = cfg.epochs,
                    train_loss,
                    val_loss,
                    lr,
                    "Training progress"
                );
            } else {
                debug!(epoch, train_loss, val_loss, "Epoch finished");
            }

            if stopper.should_stop() {
                history.stopped_early = true;
                break;
            }
        }

        if let Some(best) = best_model {
            *model = best;
        }
        history.best_epoch = stopper.best_epoch();
        history.best_val_loss = stopper.best_value().unwrap_or(f64::INFINITY);
        history.time_sec = round_to(start.elapsed().as_secs_f64(), 1);

        info!(
            model = model.name(),
            epochs_run = history.epochs_run(),
            best_epoch = history.best_epoch,
            best_val_loss = history.best_val_loss,
            time_sec = history.time_sec,
            "Training finished"
        );
        Ok(history)
    }

    fn validation_loss<M, D>(&self, model: &M, dataset: &D, indices: &[usize], loss: Loss) -> TrainingResult<f64>
    where
        M: Trainable,
        D: Dataset<Input = M::Input>,
    {
        let mut total = 0.0;
        let mut batches = 0usize;
        for chunk in indices.chunks(self.config.batch_size) {
            let batch = dataset.batch(chunk)?;
            let predictions = model.predict(&batch.inputs)?;
            total += loss.value(&predictions, &batch.targets)?;
            batches += 1;
        }
        Ok(total / batches.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use district_features::StaticDataset;
    use district_layers::Tensor;
    use district_models::{SurvivalClassifier, SurvivalConfig};

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let (train, val) = split_indices(25, 0.2, 7);
        assert_eq!(val.len(), 5);
        assert_eq!(train.len(), 20);
        let mut all: Vec<usize> = train.iter().chain(&val).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..25).collect::<Vec<_>>());
        assert_eq!(split_indices(25, 0.2, 7), (train, val));
        assert_ne!(split_indices(25, 0.2, 8).1, split_indices(25, 0.2, 7).1);
    }

    #[test]
    fn test_split_small_datasets() {
        let (train, val) = split_indices(3, 0.2, 1);
        assert_eq!((train.len(), val.len()), (2, 1));
        let (train, val) = split_indices(2, 0.2, 1);
        assert_eq!((train.len(), val.len()), (1, 1));
    }

    #[test]
    fn test_config_validation() {
        assert!(TrainerConfig::default().validate().is_ok());
        assert!(TrainerConfig::default().with_epochs(0).validate().is_err());
        assert!(TrainerConfig::default().with_batch_size(0).validate().is_err());
        assert!(TrainerConfig::default().with_val_split(1.0).validate().is_err());
        assert!(TrainerConfig::default().with_learning_rate(0.0).validate().is_err());
        assert!(TrainerConfig::default().with_min_delta(-0.1).validate().is_err());
        assert!(TrainerConfig::default().with_plateau_limits(1.0, 0.0).validate().is_err());
        assert!(TrainerConfig::default().with_plateau_limits(1e-3, 1.0).validate().is_err());
        assert!(TrainerConfig::default().with_plateau_limits(1e-3, 1e-5).validate().is_ok());
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let trainer = Trainer::new(TrainerConfig::default()).unwrap();
        let config = SurvivalConfig {
            input_dim: 3,
            ..SurvivalConfig::default()
        };
        let mut model = SurvivalClassifier::new(config, &mut StdRng::seed_from_u64(0)).unwrap();
        let dataset = StaticDataset::new(Tensor::zeros(&[0, 3]), Tensor::zeros(&[0, 3])).unwrap();
        assert!(matches!(
            trainer.train(&mut model, &dataset, Loss::Bce),
            Err(TrainingError::EmptyDataset)
        ));
    }
}
