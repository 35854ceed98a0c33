//! Model lifecycle management for district analytics.
//!
//! The [`ModelManager`] trains, versions, loads and serves four model
//! families behind one API. Records come from a [`DataSource`]; score labels
//! come from a [`LocationScorer`]. Artifacts live under
//! `<model_dir>/<family>/v<N>/`.
//!
//! # Example
//!
//! ```no_run
//! use district_serving::{DataSource, ManagerConfig, ModelKind, ModelManager, TrainOutcome};
//!
//! async fn refresh(source: &dyn DataSource) {
//!     let manager = ModelManager::new(ManagerConfig::default()).unwrap();
//!     manager.load_all();
//!     if manager.needs_training() {
//!         match manager.train_all(source).await {
//!             TrainOutcome::Completed { trained, .. } => println!("trained {trained:?}"),
//!             TrainOutcome::AlreadyRunning => println!("busy"),
//!         }
//!     }
//!     assert!(manager.is_ready(ModelKind::SurvivalMlp) || manager.needs_training());
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod family;
pub mod manager;
pub mod outputs;
mod registry;
pub mod source;
mod training;

pub use config::{FamilyHyperparams, ManagerConfig};
pub use error::{DataSourceError, ManagerError, ManagerResult};
pub use family::{ModelFamily, ModelKind};
pub use manager::ModelManager;
pub use outputs::{
    CategoryScore, HistoricalSales, ManagerStatus, ModelStatus, QuarterPrediction, SalesForecast,
    SurvivalForecast, TrainOutcome,
};
pub use source::{CollectedData, DataSource, LocationScore, LocationScorer, QuarterSnapshot};
