//! Paperflow CLI: academic paper ingestion, quality gating and search.
//!
//! Runs each pipeline stage over the data directory and serves the
//! enriched corpus over HTTP.

mod commands;
mod server;
mod telemetry;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // A missing .env file is fine.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
