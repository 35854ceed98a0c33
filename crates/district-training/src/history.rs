//! Per-run training record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat metrics record persisted next to a model version.
pub type MetricsRecord = Map<String, Value>;

/// Loss curves and summary of one training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Mean training loss per epoch
    pub train_losses: Vec<f64>,
    /// Mean validation loss per epoch
    pub val_losses: Vec<f64>,
    /// 1-based epoch whose weights were kept
    pub best_epoch: usize,
    /// Validation loss at `best_epoch`
    pub best_val_loss: f64,
    /// Wall time in seconds, one decimal
    pub time_sec: f64,
    /// True when patience ran out before the epoch budget
    pub stopped_early: bool,
}

impl TrainingHistory {
    /// Number of epochs that ran.
    pub fn epochs_run(&self) -> usize {
        self.val_losses.len()
    }

    /// Appends this history's fields to a metrics record.
    pub fn extend_record(&self, record: &mut MetricsRecord) {
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            record.extend(fields);
        }
    }
}

/// Rounds to `decimals` places, half away from zero.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
