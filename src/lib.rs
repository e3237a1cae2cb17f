//! Chunkyard library
//!
//! Chunk generation for JavaScript module graphs: partitioning modules into
//! chunks, naming them and rendering the output bundle through plugin hooks.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod plugins;
pub mod utils;

pub use bundler::{BuildOutput, Bundler};
pub use cli::Cli;
pub use config::Config;
pub use error::{BundleError, Result, Warning, WarningCode};
pub use loader::ModuleLoader;
