//! District CLI library
//!
//! Command-line front end of the model manager:
//!
//! - **train**: fit one or every model family from a JSON record directory
//! - **status**: readiness and latest version of each family
//! - **metrics**: metrics recorded with the latest versions
//! - **predict**: forecast, survival, score or category ranking for a location
//!
//! # Example
//!
//! ```bash
//! district --model-dir /srv/models train --data /srv/records
//! district --model-dir /srv/models predict forecast --data /srv/records --area 3110008 --category CS100001
//! ```
//!
//! A record directory holds one sub-directory per quarter code:
//!
//! ```text
//! <data>/20253/population.json
//! <data>/20253/sales.json
//! <data>/20253/stores.json
//! <data>/20253/facilities.json
//! ```

pub mod commands;
pub mod scorer;
pub mod source;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use district_serving::{ManagerConfig, ModelManager};
use std::path::PathBuf;

pub use commands::{MetricsCommand, PredictCommand, StatusCommand, TrainCommand};
pub use scorer::PercentileScorer;
pub use source::JsonDirSource;

/// Result type alias for CLI operations
pub type CliResult<T> = anyhow::Result<T>;

/// District - model lifecycle manager for commercial district analytics
#[derive(Parser, Debug)]
#[command(name = "district")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Where models live and how they are configured
    #[command(flatten)]
    pub manager: ManagerArgs,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train one or every model family
    Train(TrainCommand),

    /// Show readiness and versions
    Status(StatusCommand),

    /// Show metrics of the latest versions
    Metrics(MetricsCommand),

    /// Run a model against a location
    Predict(PredictCommand),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ManagerArgs {
    /// Root directory of versioned model artifacts (overrides the config file)
    #[arg(long, short = 'd', global = true, env = "DISTRICT_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Manager configuration file (JSON)
    #[arg(long = "config", short = 'c', global = true, env = "DISTRICT_CONFIG_PATH")]
    pub config_path: Option<PathBuf>,
}

impl ManagerArgs {
    /// The manager configuration: file values first, then flag overrides.
    pub fn config(&self) -> CliResult<ManagerConfig> {
        let mut config = match &self.config_path {
            Some(path) => ManagerConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ManagerConfig::default(),
        };
        if let Some(dir) = &self.model_dir {
            config = config.with_model_dir(dir);
        }
        Ok(config)
    }

    /// A manager with every committed version loaded.
    pub fn manager(&self) -> CliResult<ModelManager> {
        let config = self.config()?;
        let dir = config.model_dir.clone();
        let manager = ModelManager::new(config)
            .with_context(|| format!("Failed to open model directory {}", dir.display()))?;
        manager.load_all();
        Ok(manager)
    }
}

/// Writes `value` to stdout as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{json}");
    Ok(())
}
