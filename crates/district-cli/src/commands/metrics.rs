//! Metrics command implementation.

use crate::{print_json, CliResult, ManagerArgs};
use anyhow::Context;
use clap::Args;
use district_serving::ModelKind;

/// Show the metrics recorded with the latest version of each family
#[derive(Args, Debug, Clone, Default)]
pub struct MetricsCommand {
    /// Only this family (sales_lstm, survival_mlp, scoring_ensemble, recommendation)
    #[arg(long, short = 'm')]
    pub model: Option<ModelKind>,
}

impl MetricsCommand {
    /// Execute the metrics command
    pub fn run(&self, args: &ManagerArgs) -> CliResult<()> {
        let mut metrics = args.manager()?.get_all_metrics();
        match self.model {
            Some(kind) => {
                let record = metrics
                    .remove(kind.name())
                    .with_context(|| format!("No metrics entry for {kind}"))?;
                print_json(&record)
            }
            None => print_json(&metrics),
        }
    }
}
