mod catalog;
mod cli;
mod codec;
mod config;
mod error;
mod events;
mod indexer;
mod rpc;
mod store;
mod subgraph;
mod tokens;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first to get verbose flag
    let cli = cli::Cli::parse();

    // Initialize tracing with appropriate log level
    let default_level = if cli.verbose {
        "yam_indexer=debug"
    } else {
        "yam_indexer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Execute the command
    cli.execute().await
}
