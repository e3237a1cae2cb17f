//! Configuration schema definitions

use serde::{Deserialize, Serialize};

use crate::bundler::{OutputFormat, SourceMapMode};

/// Project metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Single output file, relative to the project root
    #[serde(default)]
    pub file: Option<String>,

    /// Output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pattern for entry chunks
    #[serde(default = "default_entry_file_names")]
    pub entry_file_names: String,

    /// Pattern for shared and dynamic chunks
    #[serde(default = "default_chunk_file_names")]
    pub chunk_file_names: String,

    /// Pattern for emitted assets
    #[serde(default = "default_asset_file_names")]
    pub asset_file_names: String,

    #[serde(default)]
    pub preserve_modules: bool,

    #[serde(default)]
    pub inline_dynamic_imports: bool,

    /// `false`, `true`, `"inline"` or `"hidden"`
    #[serde(default)]
    pub sourcemap: SourceMapMode,

    #[serde(default)]
    pub sourcemap_file: Option<String>,

    #[serde(default)]
    pub banner: Option<String>,

    #[serde(default)]
    pub footer: Option<String>,

    #[serde(default)]
    pub intro: Option<String>,

    #[serde(default)]
    pub outro: Option<String>,

    /// Global name for iife and umd bundles
    #[serde(default)]
    pub name: Option<String>,

    /// Check the syntax of every generated chunk
    #[serde(default = "default_true")]
    pub validate: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            file: None,
            format: OutputFormat::default(),
            entry_file_names: default_entry_file_names(),
            chunk_file_names: default_chunk_file_names(),
            asset_file_names: default_asset_file_names(),
            preserve_modules: false,
            inline_dynamic_imports: false,
            sourcemap: SourceMapMode::default(),
            sourcemap_file: None,
            banner: None,
            footer: None,
            intro: None,
            outro: None,
            name: None,
            validate: true,
        }
    }
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_entry_file_names() -> String {
    "[name].js".to_string()
}

fn default_chunk_file_names() -> String {
    "[name]-[hash].js".to_string()
}

fn default_asset_file_names() -> String {
    "assets/[name]-[hash][extname]".to_string()
}

fn default_true() -> bool {
    true
}

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Plugin name/identifier
    pub name: String,

    /// Plugin-specific options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<toml::Table>,
}
