//! CLI command implementations
//!
//! - [`train`]: fit model families from a record directory
//! - [`status`]: readiness and versions
//! - [`metrics`]: metrics of the latest versions
//! - [`predict`]: run a ready model against one location

mod metrics;
mod predict;
mod status;
mod train;

pub use metrics::MetricsCommand;
pub use predict::{ForecastArgs, LocationArgs, PredictCommand, PredictTarget};
pub use status::StatusCommand;
pub use train::TrainCommand;
