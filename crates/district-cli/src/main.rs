//! District CLI - train, inspect and query the district analytics models.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use district_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("district=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("District CLI starting...");

    match &cli.command {
        Commands::Train(cmd) => cmd.run(&cli.manager).await?,
        Commands::Status(cmd) => cmd.run(&cli.manager)?,
        Commands::Metrics(cmd) => cmd.run(&cli.manager)?,
        Commands::Predict(cmd) => cmd.run(&cli.manager).await?,
    }

    info!("District CLI completed successfully");
    Ok(())
}
