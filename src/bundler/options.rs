//! Normalized input and output options for a generation call

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::manual_chunks::ModuleQuery;
use crate::error::{BundleError, Result};

/// Output syntax a chunk is finalized to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// ES module syntax
    #[default]
    #[serde(alias = "esm", alias = "module")]
    #[value(alias = "esm")]
    Es,
    /// CommonJS
    #[serde(alias = "commonjs")]
    #[value(alias = "commonjs")]
    Cjs,
    /// Asynchronous module definition
    Amd,
    /// Self-executing function
    Iife,
    /// Universal module definition
    Umd,
    /// SystemJS registration
    System,
}

impl OutputFormat {
    /// Formats that can only ever produce a single chunk
    pub fn is_single_file(&self) -> bool {
        matches!(self, OutputFormat::Iife | OutputFormat::Umd)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Es => "es",
            OutputFormat::Cjs => "cjs",
            OutputFormat::Amd => "amd",
            OutputFormat::Iife => "iife",
            OutputFormat::Umd => "umd",
            OutputFormat::System => "system",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How source maps are produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SourceMapSetting")]
pub enum SourceMapMode {
    #[default]
    Off,
    /// Separate `.map` file referenced by a comment
    File,
    /// Map embedded as a data URL
    Inline,
    /// Separate `.map` file without a reference comment
    Hidden,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SourceMapSetting {
    Flag(bool),
    Mode(String),
}

impl TryFrom<SourceMapSetting> for SourceMapMode {
    type Error = String;

    fn try_from(setting: SourceMapSetting) -> std::result::Result<Self, Self::Error> {
        match setting {
            SourceMapSetting::Flag(false) => Ok(SourceMapMode::Off),
            SourceMapSetting::Flag(true) => Ok(SourceMapMode::File),
            SourceMapSetting::Mode(mode) => match mode.as_str() {
                "inline" => Ok(SourceMapMode::Inline),
                "hidden" => Ok(SourceMapMode::Hidden),
                "true" | "file" => Ok(SourceMapMode::File),
                "false" | "off" => Ok(SourceMapMode::Off),
                other => Err(format!("unknown sourcemap mode \"{}\"", other)),
            },
        }
    }
}

/// Per-module classifier used for manual chunks
pub type ChunkClassifier = Arc<dyn Fn(&str, &ModuleQuery<'_>) -> Option<String> + Send + Sync>;

/// User-supplied chunk grouping directives
#[derive(Clone)]
pub enum ManualChunks {
    /// Alias to list of module specifiers
    Table(BTreeMap<String, Vec<String>>),
    /// Called once per included module, returns an alias or nothing
    Classifier(ChunkClassifier),
}

impl ManualChunks {
    /// Wrap a closure as a classifier
    pub fn classifier<F>(f: F) -> Self
    where
        F: Fn(&str, &ModuleQuery<'_>) -> Option<String> + Send + Sync + 'static,
    {
        ManualChunks::Classifier(Arc::new(f))
    }
}

impl fmt::Debug for ManualChunks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualChunks::Table(table) => f.debug_tuple("Table").field(table).finish(),
            ManualChunks::Classifier(_) => f.write_str("Classifier(..)"),
        }
    }
}

/// Options describing what goes into the bundle
#[derive(Debug, Clone, Default)]
pub struct InputOptions {
    /// Named entry points as (name, path) pairs
    pub input: Vec<(String, PathBuf)>,

    /// Manual chunk directives
    pub manual_chunks: Option<ManualChunks>,
}

/// Options describing how the bundle is written out
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Output directory for multi-chunk builds
    pub dir: Option<PathBuf>,

    /// Single output file; disables code splitting
    pub file: Option<PathBuf>,

    pub format: OutputFormat,

    /// Pattern for entry chunk file names
    pub entry_file_names: String,

    /// Pattern for shared and dynamic chunk file names
    pub chunk_file_names: String,

    /// Pattern for emitted asset file names
    pub asset_file_names: String,

    /// One chunk per module, named after the module's path
    pub preserve_modules: bool,

    /// Put dynamic import targets into the importing chunk
    pub inline_dynamic_imports: bool,

    pub sourcemap: SourceMapMode,

    /// Location of the single source map file
    pub sourcemap_file: Option<PathBuf>,

    pub banner: Option<String>,
    pub footer: Option<String>,
    pub intro: Option<String>,
    pub outro: Option<String>,

    /// Global variable name for iife/umd exports
    pub name: Option<String>,

    /// Run the syntax self-check on finalized chunks
    pub validate: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: None,
            file: None,
            format: OutputFormat::default(),
            entry_file_names: "[name].js".to_string(),
            chunk_file_names: "[name]-[hash].js".to_string(),
            asset_file_names: "assets/[name]-[hash][extname]".to_string(),
            preserve_modules: false,
            inline_dynamic_imports: false,
            sourcemap: SourceMapMode::Off,
            sourcemap_file: None,
            banner: None,
            footer: None,
            intro: None,
            outro: None,
            name: None,
            validate: false,
        }
    }
}

impl OutputOptions {
    /// Checks that do not depend on how many chunks the build produces
    pub fn validate(&self, input: &InputOptions) -> Result<()> {
        if self.file.is_some() && self.dir.is_some() {
            return Err(BundleError::invalid_option(
                "file",
                "you must set either \"file\" for a single-file build or \"dir\" for generating multiple chunks, not both",
            ));
        }

        if self.preserve_modules && self.inline_dynamic_imports {
            return Err(BundleError::invalid_option(
                "inline_dynamic_imports",
                "\"inline_dynamic_imports\" cannot be used together with \"preserve_modules\"",
            ));
        }

        if self.inline_dynamic_imports && input.manual_chunks.is_some() {
            return Err(BundleError::invalid_option(
                "manual_chunks",
                "\"manual_chunks\" cannot be used together with \"inline_dynamic_imports\"",
            ));
        }

        if self.file.is_some() && input.manual_chunks.is_some() {
            return Err(BundleError::invalid_option(
                "manual_chunks",
                "\"manual_chunks\" cannot be used together with \"file\"; set \"dir\" to keep the manual chunks",
            ));
        }

        if self.file.is_some() && self.preserve_modules {
            return Err(BundleError::invalid_option(
                "file",
                "you must set \"dir\" instead of \"file\" when using \"preserve_modules\"",
            ));
        }

        Ok(())
    }

    /// Checks that only apply once the partition is known
    pub fn validate_chunk_count(&self, chunk_count: usize) -> Result<()> {
        if chunk_count <= 1 {
            return Ok(());
        }

        if self.format.is_single_file() {
            return Err(BundleError::invalid_option(
                "format",
                format!(
                    "\"{}\" builds are not supported when the bundle produces {} chunks",
                    self.format, chunk_count
                ),
            ));
        }

        if self.file.is_some() {
            return Err(BundleError::invalid_option(
                "file",
                format!(
                    "when building multiple chunks, \"dir\" must be used instead of \"file\" ({} chunks)",
                    chunk_count
                ),
            ));
        }

        if self.sourcemap_file.is_some() {
            return Err(BundleError::invalid_option(
                "sourcemap_file",
                "\"sourcemap_file\" is only supported for single-chunk builds",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sourcemap_setting_parsing() {
        #[derive(Deserialize)]
        struct Wrapper {
            sourcemap: SourceMapMode,
        }

        let parse = |s: &str| toml::from_str::<Wrapper>(s).map(|w| w.sourcemap);

        assert_eq!(parse("sourcemap = true").unwrap(), SourceMapMode::File);
        assert_eq!(parse("sourcemap = false").unwrap(), SourceMapMode::Off);
        assert_eq!(parse("sourcemap = \"inline\"").unwrap(), SourceMapMode::Inline);
        assert_eq!(parse("sourcemap = \"hidden\"").unwrap(), SourceMapMode::Hidden);
        assert!(parse("sourcemap = \"sideways\"").is_err());
    }

    #[test]
    fn test_single_file_formats_reject_multiple_chunks() {
        let options = OutputOptions {
            format: OutputFormat::Iife,
            ..OutputOptions::default()
        };

        assert!(options.validate_chunk_count(1).is_ok());
        assert!(matches!(
            options.validate_chunk_count(2),
            Err(BundleError::InvalidOption { option: "format", .. })
        ));
    }

    #[test]
    fn test_file_and_dir_are_exclusive() {
        let options = OutputOptions {
            file: Some(PathBuf::from("dist/bundle.js")),
            dir: Some(PathBuf::from("dist")),
            ..OutputOptions::default()
        };

        assert!(options.validate(&InputOptions::default()).is_err());
    }

    #[test]
    fn test_file_rejects_manual_chunks() {
        let options = OutputOptions {
            file: Some(PathBuf::from("out/bundle.js")),
            ..OutputOptions::default()
        };
        let input = InputOptions {
            input: Vec::new(),
            manual_chunks: Some(ManualChunks::Table(BTreeMap::from([(
                "vendor".to_string(),
                vec!["vendor.js".to_string()],
            )]))),
        };

        assert!(matches!(
            options.validate(&input),
            Err(BundleError::InvalidOption { option: "manual_chunks", .. })
        ));
        assert!(options.validate(&InputOptions::default()).is_ok());
    }
}
