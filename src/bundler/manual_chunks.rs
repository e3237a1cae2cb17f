//! Manual chunk resolution
//!
//! Turns the user's `manual_chunks` directive into a module → alias map.
//! Both directive kinds feed aliases into the map in alias order, so which
//! alias "wins" a conflict never depends on graph iteration order.

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use parking_lot::RwLock;
use tracing::debug;

use super::graph::{ModuleGraph, ModuleId};
use super::options::{ChunkClassifier, ManualChunks};
use crate::error::{BundleError, Result};

/// Module → manual chunk alias
pub type AliasMap = HashMap<ModuleId, String>;

/// Loads modules that manual chunks name but the graph has not reached yet
#[async_trait]
pub trait LoadModule: Send + Sync {
    /// Load the module `specifier` refers to into the graph.
    /// Returns `None` when the specifier does not resolve to a file.
    async fn load_module(&self, specifier: &str) -> Result<Option<ModuleId>>;
}

/// Read-only view of a module handed to manual chunk classifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub id: String,
    pub is_entry: bool,
    pub is_included: bool,
    pub imported_ids: Vec<String>,
    pub dynamically_imported_ids: Vec<String>,
    pub dynamic_importers: Vec<String>,
    pub exports: Vec<String>,
}

/// Query interface over the module graph for classifiers
pub struct ModuleQuery<'a> {
    graph: &'a ModuleGraph,
}

impl<'a> ModuleQuery<'a> {
    pub fn new(graph: &'a ModuleGraph) -> Self {
        Self { graph }
    }

    /// All module ids in id order
    pub fn module_ids(&self) -> Vec<&'a str> {
        let graph = self.graph;
        graph
            .all_module_ids()
            .into_iter()
            .map(|id| graph.module(id).id.as_str())
            .collect()
    }

    /// Metadata for a module id, if the graph knows it
    pub fn module_info(&self, id: &str) -> Option<ModuleInfo> {
        let graph = self.graph;
        let module = graph.get_module(graph.get_module_id(id)?)?;

        Some(ModuleInfo {
            id: module.id.clone(),
            is_entry: module.is_entry,
            is_included: module.is_included,
            imported_ids: module_ids(graph, module.dependencies.iter().copied()),
            dynamically_imported_ids: module_ids(
                graph,
                module.dynamic_imports.iter().map(|d| d.target),
            ),
            dynamic_importers: module_ids(graph, module.dynamic_importers.iter().copied()),
            exports: module.exports.iter().map(|e| e.exported.clone()).collect(),
        })
    }
}

fn module_ids(graph: &ModuleGraph, ids: impl Iterator<Item = ModuleId>) -> Vec<String> {
    ids.map(|id| graph.module(id).id.clone()).collect()
}

/// Resolve manual chunk directives into an alias map
pub async fn resolve_manual_chunks(
    manual_chunks: &ManualChunks,
    graph: &RwLock<ModuleGraph>,
    loader: Option<&dyn LoadModule>,
) -> Result<AliasMap> {
    match manual_chunks {
        ManualChunks::Table(table) => {
            let requests: Vec<(&str, &str)> = table
                .iter()
                .flat_map(|(alias, specifiers)| {
                    specifiers.iter().map(move |s| (alias.as_str(), s.as_str()))
                })
                .collect();

            let resolved = try_join_all(
                requests
                    .iter()
                    .map(|&(alias, specifier)| resolve_specifier(alias, specifier, graph, loader)),
            )
            .await?;

            let graph = graph.read();
            let mut aliases = AliasMap::new();
            for (&(alias, _), module) in requests.iter().zip(resolved) {
                assign_alias(&mut aliases, &graph, module, alias)?;
            }
            Ok(aliases)
        }
        ManualChunks::Classifier(classifier) => {
            let graph = graph.read();
            classify_modules(classifier, &graph)
        }
    }
}

async fn resolve_specifier(
    alias: &str,
    specifier: &str,
    graph: &RwLock<ModuleGraph>,
    loader: Option<&dyn LoadModule>,
) -> Result<ModuleId> {
    let known = graph.read().find_module(specifier);
    if let Some(id) = known {
        return Ok(id);
    }

    if let Some(loader) = loader {
        debug!("Loading {} for manual chunk \"{}\"", specifier, alias);
        if let Some(id) = loader.load_module(specifier).await? {
            return Ok(id);
        }
    }

    Err(BundleError::UnresolvedManualChunk {
        alias: alias.to_string(),
        specifier: specifier.to_string(),
    })
}

fn classify_modules(classifier: &ChunkClassifier, graph: &ModuleGraph) -> Result<AliasMap> {
    let query = ModuleQuery::new(graph);
    let mut pairs = Vec::new();

    for id in graph.all_module_ids() {
        let module = graph.module(id);
        if !module.is_included {
            continue;
        }
        if let Some(alias) = classifier(&module.id, &query) {
            if !alias.is_empty() {
                pairs.push((alias, id));
            }
        }
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut aliases = AliasMap::new();
    for (alias, id) in pairs {
        assign_alias(&mut aliases, graph, id, &alias)?;
    }
    Ok(aliases)
}

fn assign_alias(
    aliases: &mut AliasMap,
    graph: &ModuleGraph,
    module: ModuleId,
    alias: &str,
) -> Result<()> {
    match aliases.get(&module) {
        Some(existing) if existing != alias => Err(BundleError::ManualChunkConflict {
            module: graph.module(module).id.clone(),
            existing: existing.clone(),
            requested: alias.to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            aliases.insert(module, alias.to_string());
            Ok(())
        }
    }
}
