//! Build command implementation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use parking_lot::RwLock;
use tracing::info;

use crate::bundler::{Bundler, ModuleGraph, OutputFormat, OutputOptions, SourceMapMode};
use crate::config::Config;
use crate::loader::ModuleLoader;
use crate::plugins;
use crate::utils::{format_duration, format_size};

/// Generate the bundle and write it to disk
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Output directory
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Output format (overrides chunkyard.toml)
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Emit source map files
    #[arg(long)]
    pub sourcemap: bool,
}

impl BuildCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let start = Instant::now();

        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;
        let output = self.output_options(&config);

        eprintln!("{} Building project...", "→".blue());

        let graph = Arc::new(RwLock::new(ModuleGraph::new()));
        let loader = Arc::new(ModuleLoader::new(config.root.clone(), graph.clone()));
        loader
            .load_entries(&config.all_entrypoints())
            .await
            .context("Failed to load modules")?;
        info!("Loaded {} modules", graph.read().len());

        let mut bundler = Bundler::new(graph, config.input_options())
            .with_loader(loader)
            .with_root(config.root.clone());
        for plugin in &config.plugins {
            bundler.register_plugin(plugins::from_config(plugin)?);
        }

        let result = bundler.generate(&output, true).await.context("Failed to generate bundle")?;

        let out_dir = match &output.file {
            Some(file) => file.parent().map(PathBuf::from).unwrap_or_else(|| config.root.clone()),
            None => output.dir.clone().unwrap_or_else(|| config.output_dir()),
        };
        let bundles = result
            .write_to(&out_dir)
            .with_context(|| format!("Failed to write bundle to {}", out_dir.display()))?;

        for warning in &result.warnings {
            eprintln!("{} {}", "!".yellow().bold(), warning.to_string().yellow());
        }

        eprintln!(
            "\n{} Built {} file(s) in {}\n",
            "✓".green().bold(),
            bundles.len(),
            format_duration(start.elapsed())
        );

        // Print bundle summary
        for bundle in &bundles {
            eprintln!(
                "  {} {} {}",
                "•".dimmed(),
                bundle.output_path.display().to_string().cyan(),
                format_size(bundle.size).dimmed()
            );
        }

        eprintln!();

        Ok(())
    }

    /// Output options from the config with command line overrides applied
    fn output_options(&self, config: &Config) -> OutputOptions {
        let mut output = config.output_options();

        if let Some(outdir) = &self.outdir {
            if output.file.is_none() {
                output.dir = Some(outdir.clone());
            }
        }
        if let Some(format) = self.format {
            output.format = format;
        }
        if self.sourcemap && output.sourcemap == SourceMapMode::Off {
            output.sourcemap = SourceMapMode::File;
        }

        output
    }
}
