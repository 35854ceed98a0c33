//! Model definitions for district analytics.
//!
//! Four model families share the [`Trainable`] capability where they are
//! gradient trained:
//!
//! - [`SalesForecaster`]: GRU encoder over quarterly rows, predicts the next
//!   four quarters of sales
//! - [`SurvivalClassifier`]: 1, 3 and 5-year survival probabilities
//! - [`ScoringEnsemble`]: [`GradientBoostedTrees`] blended with a
//!   [`ScoringMlp`] into a 0 to 100 location score
//! - [`CategoryRecommender`]: category embedding plus network, scores a
//!   location against every business category
//!
//! Every model is `Clone` and serde-serializable; a clone is a complete
//! snapshot.

#![warn(missing_docs)]

pub mod boosting;
pub mod error;
pub mod forecaster;
pub mod recommender;
pub mod scoring;
pub mod survival;
pub mod trainable;

pub use boosting::{BoostingConfig, GradientBoostedTrees, RegressionTree};
pub use error::{ModelError, ModelResult};
pub use forecaster::{ForecasterConfig, SalesForecaster};
pub use recommender::{CategoryRecommender, RecommenderConfig};
pub use scoring::{blend_scores, EnsembleWeights, ScoringEnsemble, ScoringMlp, ScoringMlpConfig};
pub use survival::{SurvivalClassifier, SurvivalConfig, SURVIVAL_HORIZONS};
pub use trainable::Trainable;
