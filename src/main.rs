//! Chunkyard - chunk generation for JavaScript module graphs
//!
//! Loads the entry points named in `chunkyard.toml`, splits the module
//! graph into chunks and writes the rendered bundle.
//!
//! # Features
//! - Automatic code splitting by entry reachability
//! - Manual chunks and per-module output
//! - es, cjs, amd, iife, umd and system output
//! - Source maps and plugin hooks

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chunkyard::Cli;

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chunkyard=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chunkyard=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    cli.execute().await
}
