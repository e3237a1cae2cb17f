//! Error and warning types for chunk generation

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for generation operations
pub type Result<T> = std::result::Result<T, BundleError>;

/// Fatal failures that abort a generation call
#[derive(Debug, Error)]
pub enum BundleError {
    /// Incompatible or malformed output/input options
    #[error("invalid option \"{option}\": {message}")]
    InvalidOption {
        option: &'static str,
        message: String,
    },

    /// A module was placed into two different manual chunks
    #[error(
        "cannot assign \"{module}\" to the \"{requested}\" chunk as it is already in the \"{existing}\" chunk"
    )]
    ManualChunkConflict {
        module: String,
        existing: String,
        requested: String,
    },

    /// A manual chunk lists a specifier that resolves to no module
    #[error("could not resolve \"{specifier}\" listed in manual chunk \"{alias}\"")]
    UnresolvedManualChunk { alias: String, specifier: String },

    /// A chunk identity was assigned twice
    #[error("chunk {chunk} already has the output identity \"{existing}\"")]
    IdentityReassigned { chunk: usize, existing: String },

    /// An output name was reserved but nothing was ever emitted under it
    #[error("output \"{0}\" was reserved but never emitted")]
    UnresolvedPlaceholder(String),

    /// An emitted file asked for an exact name that is already taken
    #[error("the emitted file \"{0}\" conflicts with an existing output file")]
    FileNameConflict(String),

    /// A plugin hook failed
    #[error("plugin \"{plugin}\" failed in {hook}: {source}")]
    Plugin {
        plugin: String,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A module could not be read from disk
    #[error("failed to load module {}: {source}", path.display())]
    Loader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BundleError {
    pub(crate) fn invalid_option(option: &'static str, message: impl Into<String>) -> Self {
        BundleError::InvalidOption {
            option,
            message: message.into(),
        }
    }
}

/// Kinds of non-fatal issues reported alongside a successful generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// A finalized chunk failed the syntax self-check
    InvalidChunkSyntax,
    /// A plugin wrote a bundle entry without an artifact kind
    DeprecatedRawEntry,
    /// A chunk rendered to no code at all
    EmptyChunk,
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            WarningCode::InvalidChunkSyntax => "INVALID_CHUNK_SYNTAX",
            WarningCode::DeprecatedRawEntry => "DEPRECATED_RAW_ENTRY",
            WarningCode::EmptyChunk => "EMPTY_CHUNK",
        };
        f.write_str(code)
    }
}

/// A non-fatal generation warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
