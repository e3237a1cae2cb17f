//! Configuration handling for chunkyard
//!
//! Parses and manages chunkyard.toml configuration files.

mod schema;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::bundler::{InputOptions, ManualChunks, OutputOptions};

pub use schema::*;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project metadata
    pub project: ProjectConfig,

    /// Entry points for bundling, name → path
    #[serde(default)]
    pub entrypoints: BTreeMap<String, String>,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Manual chunks, alias → module paths
    #[serde(default)]
    pub manual_chunks: BTreeMap<String, Vec<String>>,

    /// Plugin configuration
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        // Set root directory to the directory containing the config file
        let root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let config = Self::parse(&content, root)?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration text for a project rooted at `root`
    pub fn parse(content: &str, root: PathBuf) -> Result<Self> {
        let mut config: Config = toml::from_str(content).with_context(|| "Failed to parse chunkyard.toml")?;
        config.root = root;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Ensure at least one entrypoint exists
        if self.entrypoints.is_empty() {
            anyhow::bail!("At least one entrypoint must be specified in chunkyard.toml");
        }

        // Validate entrypoint paths exist
        for (name, path) in &self.entrypoints {
            let full_path = self.root.join(path);
            if !full_path.exists() {
                anyhow::bail!(
                    "Entrypoint '{}' points to non-existent file: {}",
                    name,
                    full_path.display()
                );
            }
        }

        for (alias, modules) in &self.manual_chunks {
            if modules.is_empty() {
                anyhow::bail!("Manual chunk '{}' lists no modules", alias);
            }
        }

        Ok(())
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.dir)
    }

    /// Get all entrypoint paths, ordered by entry name
    pub fn all_entrypoints(&self) -> Vec<(String, PathBuf)> {
        self.entrypoints
            .iter()
            .map(|(name, path)| (name.clone(), self.root.join(path)))
            .collect()
    }

    /// Input options for a generation call
    pub fn input_options(&self) -> InputOptions {
        InputOptions {
            input: self.all_entrypoints(),
            manual_chunks: (!self.manual_chunks.is_empty()).then(|| ManualChunks::Table(self.manual_chunks.clone())),
        }
    }

    /// Output options for a generation call
    pub fn output_options(&self) -> OutputOptions {
        let output = &self.output;
        let file = output.file.as_ref().map(|file| self.root.join(file));

        OutputOptions {
            dir: file.is_none().then(|| self.output_dir()),
            file,
            format: output.format,
            entry_file_names: output.entry_file_names.clone(),
            chunk_file_names: output.chunk_file_names.clone(),
            asset_file_names: output.asset_file_names.clone(),
            preserve_modules: output.preserve_modules,
            inline_dynamic_imports: output.inline_dynamic_imports,
            sourcemap: output.sourcemap,
            sourcemap_file: output.sourcemap_file.as_ref().map(|file| self.root.join(file)),
            banner: output.banner.clone(),
            footer: output.footer.clone(),
            intro: output.intro.clone(),
            outro: output.outro.clone(),
            name: output.name.clone(),
            validate: output.validate,
        }
    }
}
