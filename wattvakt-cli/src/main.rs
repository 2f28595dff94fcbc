//! ## wattvakt-cli
//! **Operational interface**
//! Runs the polling scheduler, single cycles, and read-only store queries.

use clap::Parser;

mod commands;
mod error;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    commands::run_command(cli).await?;
    Ok(())
}
