//! Shapes returned by the manager.

use crate::family::ModelKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One forecast quarter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterPrediction {
    /// `"YYYY-Qn"`
    pub quarter: String,
    /// Point forecast
    pub predicted: i64,
    /// Lower bound of the 95% band
    pub lower: i64,
    /// Upper bound of the 95% band
    pub upper: i64,
}

/// Observed revenue of one quarter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalSales {
    /// Raw quarter code
    pub quarter: String,
    /// Revenue
    pub sales: i64,
}

/// Sales forecast for a location and category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesForecast {
    /// Location code
    pub area_code: String,
    /// Category code
    pub business_type: String,
    /// Revenue of the latest quarter
    pub current_quarter_sales: i64,
    /// First forecast quarter
    pub predicted_next_quarter: i64,
    /// Percent change from current to next quarter, one decimal
    pub growth_rate: f64,
    /// Lower bound of the first quarter
    pub confidence_lower: i64,
    /// Upper bound of the first quarter
    pub confidence_upper: i64,
    /// Every forecast quarter
    pub quarterly_predictions: Vec<QuarterPrediction>,
    /// Quarters with nonzero revenue, oldest first
    pub historical: Vec<HistoricalSales>,
}

/// Survival probabilities in percent, one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurvivalForecast {
    /// One year
    pub survival_1yr: f64,
    /// Three years
    pub survival_3yr: f64,
    /// Five years
    pub survival_5yr: f64,
}

/// Fit of one category at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    /// Category code
    pub biz_code: String,
    /// Percent, one decimal
    pub score: f64,
}

/// Readiness and latest version of one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    /// Loaded and usable
    pub ready: bool,
    /// Latest committed version, 0 when none
    pub version: u32,
    /// Commit timestamp of that version, empty when none
    pub trained_at: String,
    /// Training samples of that version
    pub samples: u64,
}

/// Status of every family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerStatus {
    /// A training run holds the gate
    pub training_in_progress: bool,
    /// Per-family status keyed by name
    pub models: BTreeMap<String, ModelStatus>,
}

/// Result of a training request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainOutcome {
    /// The run finished; every requested family is in exactly one list.
    Completed {
        /// Committed and now ready
        trained: Vec<ModelKind>,
        /// Not enough data or no label source
        skipped: Vec<ModelKind>,
        /// Failed; the previous version stays authoritative
        failed: Vec<ModelKind>,
    },
    /// Another run was in progress; nothing was done.
    AlreadyRunning,
}

impl TrainOutcome {
    /// Families committed by this run.
    pub fn trained(&self) -> &[ModelKind] {
        match self {
            TrainOutcome::Completed { trained, .. } => trained,
            TrainOutcome::AlreadyRunning => &[],
        }
    }
}
