//! Module loading
//!
//! Reads modules from disk, resolves their import specifiers and records
//! everything in the shared module graph.

mod parse;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::bundler::{LoadModule, Module, ModuleGraph, ModuleId, ModuleType};
use crate::error::{BundleError, Result};
use crate::utils::{file_stem, make_legal_identifier, path_to_module_id, relative_path};

pub use parse::{json_module, parse_module, ParsedModule, StaticImport};

/// Extensions tried when a specifier omits one
const EXTENSIONS: [&str; 5] = ["js", "mjs", "cjs", "jsx", "json"];

/// Loads modules into a shared graph
pub struct ModuleLoader {
    /// Project root; module ids are relative to it
    root: PathBuf,

    /// Module graph
    graph: Arc<RwLock<ModuleGraph>>,
}

impl ModuleLoader {
    /// Create a loader for the project at `root`
    pub fn new(root: impl Into<PathBuf>, graph: Arc<RwLock<ModuleGraph>>) -> Self {
        let root = root.into();
        let root = fs::canonicalize(&root).unwrap_or(root);
        Self { root, graph }
    }

    /// The graph modules are loaded into
    pub fn graph(&self) -> Arc<RwLock<ModuleGraph>> {
        self.graph.clone()
    }

    /// Load the named entry points and everything they reach
    pub async fn load_entries(&self, entries: &[(String, PathBuf)]) -> Result<Vec<ModuleId>> {
        let mut ids = Vec::with_capacity(entries.len());

        for (name, path) in entries {
            debug!("Processing entrypoint: {} -> {}", name, path.display());
            let id = self.process_module(path.clone()).await?;
            self.graph.write().mark_entry(id, Some(name.clone()));
            ids.push(id);
        }

        Ok(ids)
    }

    /// Process a single module and its dependencies
    fn process_module(&self, path: PathBuf) -> BoxFuture<'_, Result<ModuleId>> {
        async move {
            let canonical_path = fs::canonicalize(&path).map_err(|source| BundleError::Loader {
                path: path.clone(),
                source,
            })?;
            let id = self.module_id(&canonical_path);

            // Check if already processed
            let existing = self.graph.read().get_module_id(&id);
            if let Some(existing) = existing {
                return Ok(existing);
            }

            let source = fs::read_to_string(&canonical_path).map_err(|source| BundleError::Loader {
                path: canonical_path.clone(),
                source,
            })?;

            let module_type = canonical_path
                .extension()
                .map(|ext| ModuleType::from_extension(&ext.to_string_lossy()))
                .unwrap_or(ModuleType::Unknown);
            let default_local = format!("{}_default", make_legal_identifier(file_stem(&id)));

            let parsed = match module_type {
                ModuleType::JavaScript => parse_module(&source, &default_local),
                ModuleType::Json => json_module(&source, &default_local),
                ModuleType::Unknown => {
                    debug!("No loader for {}, including it without code", id);
                    ParsedModule::default()
                }
            };

            let mut module = Module::new(id.clone(), parsed.code);
            module.source = source;
            module.exports = parsed.exports;

            let module_id = self.graph.write().add_module(module);
            debug!("Loaded {} ({} imports)", id, parsed.imports.len());

            for import in &parsed.imports {
                let Some(resolved) = self.resolve(&import.specifier, &canonical_path) else {
                    continue;
                };
                let dep_id = self.process_module(resolved).await?;

                let mut graph = self.graph.write();
                graph.add_dependency(module_id, dep_id);
                for (imported, local) in &import.bindings {
                    graph.add_import(module_id, dep_id, imported, local);
                }
            }

            for specifier in &parsed.dynamic_imports {
                let Some(resolved) = self.resolve(specifier, &canonical_path) else {
                    continue;
                };
                let target = self.process_module(resolved).await?;
                self.graph.write().add_dynamic_import(module_id, specifier, target);
            }

            Ok(module_id)
        }
        .boxed()
    }

    /// Project-relative module id for an absolute path
    fn module_id(&self, path: &Path) -> String {
        relative_path(&self.root, path).unwrap_or_else(|| path_to_module_id(path))
    }

    /// Resolve an import specifier to a file path
    fn resolve(&self, specifier: &str, from: &Path) -> Option<PathBuf> {
        // Bare specifiers name external packages
        if !specifier.starts_with('.') && !specifier.starts_with('/') {
            warn!("Skipping bare specifier '{}' imported by {}", specifier, from.display());
            return None;
        }

        let base_dir = from.parent().unwrap_or(Path::new("."));
        let resolved = resolve_relative(specifier, base_dir);
        if resolved.is_none() {
            warn!("Could not resolve '{}' from {}", specifier, from.display());
        }
        resolved
    }
}

/// Resolve a path specifier against `base_dir`: exact file, then known
/// extensions, then a directory index
fn resolve_relative(specifier: &str, base_dir: &Path) -> Option<PathBuf> {
    let target = base_dir.join(specifier);

    if target.is_file() {
        return Some(target);
    }

    for ext in &EXTENSIONS {
        let with_ext = target.with_extension(ext);
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }

    if target.is_dir() {
        for ext in &EXTENSIONS {
            let index = target.join(format!("index.{}", ext));
            if index.is_file() {
                return Some(index);
            }
        }
    }

    None
}

#[async_trait]
impl LoadModule for ModuleLoader {
    async fn load_module(&self, specifier: &str) -> Result<Option<ModuleId>> {
        match resolve_relative(specifier, &self.root) {
            Some(path) => self.process_module(path).await.map(Some),
            None => Ok(None),
        }
    }
}
