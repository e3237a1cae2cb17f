//! Command-line interface for Chunkyard
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `build`: Generate and write the bundle

mod build;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use build::BuildCommand;

/// Chunkyard - chunk generation for JavaScript module graphs
#[derive(Parser, Debug)]
#[command(name = "chunkyard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to chunkyard.toml config file
    #[arg(short, long, global = true, default_value = "chunkyard.toml", env = "CHUNKYARD_CONFIG")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the bundle and write it to the output directory
    Build(BuildCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
        }
    }
}

/// Print the Chunkyard banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "▣".cyan(),
        "Chunkyard".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
