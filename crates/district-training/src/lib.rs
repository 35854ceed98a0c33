//! Training and evaluation for district models.
//!
//! [`Trainer`] runs the shared supervised loop for every gradient-trained
//! family:
//!
//! - seeded train/validation split
//! - mini-batch Adam with global gradient-norm clipping
//! - [`ReduceLrOnPlateau`] learning-rate schedule
//! - [`EarlyStopping`] with restore of the best epoch's weights
//!
//! The [`evaluator`] functions turn a trained model into the flat metrics
//! stored with each version.
//!
//! # Example
//!
//! ```no_run
//! use district_features::StaticDataset;
//! use district_layers::Tensor;
//! use district_models::{SurvivalClassifier, SurvivalConfig};
//! use district_training::{evaluate_survival, Loss, Trainer, TrainerConfig};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let features = Tensor::zeros(&[20, 59]);
//! let labels = Tensor::full(&[20, 3], 0.8);
//! let dataset = StaticDataset::new(features, labels).unwrap();
//!
//! let mut model = SurvivalClassifier::new(SurvivalConfig::default(), &mut StdRng::seed_from_u64(0)).unwrap();
//! let trainer = Trainer::new(TrainerConfig::default().with_epochs(5)).unwrap();
//! let history = trainer.train(&mut model, &dataset, Loss::Bce).unwrap();
//! let metrics = evaluate_survival(&model, &dataset).unwrap();
//! println!("best epoch {} -> {:?}", history.best_epoch, metrics);
//! ```

#![warn(missing_docs)]

pub mod early_stopping;
pub mod error;
pub mod evaluator;
pub mod history;
pub mod loss;
pub mod schedule;
pub mod trainer;

pub use early_stopping::EarlyStopping;
pub use error::{TrainingError, TrainingResult};
pub use evaluator::{
    evaluate_recommendation, evaluate_regression, evaluate_scoring, evaluate_survival, summary_to_record,
    MetricsSummary,
};
pub use history::{round_to, MetricsRecord, TrainingHistory};
pub use loss::Loss;
pub use schedule::ReduceLrOnPlateau;
pub use trainer::{split_indices, Trainer, TrainerConfig};
