//! Status command implementation.

use crate::{print_json, CliResult, ManagerArgs};
use clap::Args;
use tracing::info;

/// Show readiness, latest version and sample count of every family
#[derive(Args, Debug, Clone, Default)]
pub struct StatusCommand {}

impl StatusCommand {
    /// Execute the status command
    pub fn run(&self, args: &ManagerArgs) -> CliResult<()> {
        let manager = args.manager()?;
        let status = manager.get_status();
        let ready = status.models.values().filter(|m| m.ready).count();
        info!(ready, total = status.models.len(), "Model status");
        print_json(&status)
    }
}
