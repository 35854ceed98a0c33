//! Train command implementation.
//!
//! Collects the configured quarter window from a record directory and fits
//! one or every model family. Score labels come from the
//! [`PercentileScorer`].

use crate::{print_json, CliResult, JsonDirSource, ManagerArgs, PercentileScorer};
use anyhow::bail;
use clap::Args;
use district_serving::{ModelKind, TrainOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Train one or every model family
///
/// # Example
///
/// ```bash
/// district --model-dir /srv/models train --data /srv/records --model survival_mlp
/// ```
#[derive(Args, Debug, Clone)]
pub struct TrainCommand {
    /// Only this family (sales_lstm, survival_mlp, scoring_ensemble, recommendation)
    #[arg(long, short = 'm')]
    pub model: Option<ModelKind>,

    /// Record directory with one sub-directory per quarter
    #[arg(long, env = "DISTRICT_DATA_DIR")]
    pub data: PathBuf,
}

impl TrainCommand {
    /// Execute the train command
    pub async fn run(&self, args: &ManagerArgs) -> CliResult<()> {
        let manager = args.manager()?.with_scorer(Arc::new(PercentileScorer::new()));
        let source = JsonDirSource::new(&self.data);
        info!(data = %self.data.display(), model_dir = %manager.config().model_dir.display(), "Starting training");

        let outcome = match self.model {
            Some(kind) => manager.train_single(kind, &source).await,
            None => manager.train_all(&source).await,
        };
        print_json(&outcome)?;

        match &outcome {
            TrainOutcome::AlreadyRunning => bail!("Another training run is in progress"),
            TrainOutcome::Completed { failed, .. } if !failed.is_empty() => {
                let names: Vec<&str> = failed.iter().map(ModelKind::name).collect();
                bail!("Training failed for {}", names.join(", "))
            }
            TrainOutcome::Completed { skipped, .. } => {
                if !skipped.is_empty() {
                    warn!(skipped = skipped.len(), "Some families were skipped");
                }
                Ok(())
            }
        }
    }
}
