//! Chunk graph construction: instantiate, link, facades, exports

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::chunk::{Chunk, ChunkId, ChunkImport, LocalAlias, NamespaceObject};
use super::graph::{ModuleGraph, ModuleId};
use super::partition::ChunkGroup;
use crate::utils::make_legal_identifier;

/// Which chunk holds each module's code
pub type ModuleChunkMap = HashMap<ModuleId, ChunkId>;

/// All chunks of one generation and the module → chunk mappings
#[derive(Debug, Clone, Default)]
pub struct ChunkGraph {
    pub chunks: Vec<Chunk>,

    pub module_to_chunk: ModuleChunkMap,

    /// Chunk exposing each entry module's exports
    pub facade_chunk_of: HashMap<ModuleId, ChunkId>,
}

impl ChunkGraph {
    /// Instantiate one chunk per group, link them and add facades
    pub fn build(graph: &ModuleGraph, groups: Vec<ChunkGroup>) -> Self {
        let mut chunk_graph = Self::default();

        for group in groups {
            let id = chunk_graph.chunks.len();
            for &module in &group.modules {
                chunk_graph.module_to_chunk.insert(module, id);
            }
            chunk_graph.chunks.push(Chunk::new(group.alias, group.modules));
        }

        for id in 0..chunk_graph.chunks.len() {
            chunk_graph.link_chunk(graph, id);
        }
        chunk_graph.generate_facades(graph);
        chunk_graph.link_dynamic_imports(graph);

        debug!(
            "Linked {} chunks ({} facades)",
            chunk_graph.chunks.len(),
            chunk_graph.chunks.iter().filter(|c| c.is_facade()).count()
        );

        chunk_graph
    }

    /// Resolve the chunk dependencies and imported bindings of one chunk
    fn link_chunk(&mut self, graph: &ModuleGraph, id: ChunkId) {
        let modules = self.chunks[id].modules().to_vec();

        for module_id in modules {
            let module = graph.module(module_id);

            for &dep in &module.dependencies {
                if let Some(&dep_chunk) = self.module_to_chunk.get(&dep) {
                    if dep_chunk != id {
                        self.chunks[id].add_dependency(dep_chunk);
                    }
                }
            }

            for import in &module.imports {
                let Some(&source_chunk) = self.module_to_chunk.get(&import.source) else {
                    continue;
                };
                let source = graph.module(import.source);

                if import.imported == "*" {
                    let mut properties = Vec::with_capacity(source.exports.len());
                    for export in &source.exports {
                        if source_chunk == id {
                            properties.push((export.exported.clone(), export.local.clone()));
                        } else {
                            let local = format!("{}${}", import.local, make_legal_identifier(&export.exported));
                            self.require_export(source_chunk, import.source, &export.exported);
                            self.chunks[id].add_import(
                                source_chunk,
                                ChunkImport {
                                    module: import.source,
                                    name: export.exported.clone(),
                                    local: local.clone(),
                                },
                            );
                            properties.push((export.exported.clone(), local));
                        }
                    }
                    self.chunks[id].namespaces.push(NamespaceObject {
                        importer: module_id,
                        local: import.local.clone(),
                        properties,
                    });
                    continue;
                }

                let Some(binding) = source.export(&import.imported) else {
                    debug!("{} does not export \"{}\" imported by {}", source.id, import.imported, module.id);
                    continue;
                };

                if source_chunk == id {
                    if binding.local != import.local {
                        self.chunks[id].local_aliases.push(LocalAlias {
                            importer: module_id,
                            local: import.local.clone(),
                            binding: binding.local.clone(),
                        });
                    }
                } else {
                    self.require_export(source_chunk, import.source, &import.imported);
                    self.chunks[id].add_import(
                        source_chunk,
                        ChunkImport {
                            module: import.source,
                            name: import.imported.clone(),
                            local: import.local.clone(),
                        },
                    );
                }
            }
        }
    }

    fn require_export(&mut self, chunk: ChunkId, module: ModuleId, name: &str) {
        self.chunks[chunk]
            .required_exports
            .insert((module, name.to_string()));
    }

    /// Give every entry module a chunk that exposes exactly its exports
    fn generate_facades(&mut self, graph: &ModuleGraph) {
        let primary_count = self.chunks.len();
        let mut facades = Vec::new();

        for id in 0..primary_count {
            let entries: Vec<ModuleId> = self.chunks[id]
                .modules()
                .iter()
                .copied()
                .filter(|&m| self.is_entry_of(graph, m, id))
                .collect();

            for entry in entries {
                let signature: Vec<(ModuleId, String)> = graph
                    .module(entry)
                    .exports
                    .iter()
                    .map(|e| (entry, e.exported.clone()))
                    .collect();

                let chunk = &mut self.chunks[id];
                chunk.entry_modules.push(entry);

                let can_host = chunk.alias.is_none()
                    && chunk.facade_module.is_none()
                    && chunk.required_exports.iter().all(|(m, _)| *m == entry);
                chunk.required_exports.extend(signature.iter().cloned());

                if can_host {
                    chunk.facade_module = Some(entry);
                    self.facade_chunk_of.insert(entry, id);
                    continue;
                }

                let facade_id = primary_count + facades.len();
                let mut facade = Chunk::facade(entry, id);
                for (module, name) in signature {
                    facade.add_import(
                        id,
                        ChunkImport {
                            module,
                            name: name.clone(),
                            local: facade_local(&name),
                        },
                    );
                    facade.required_exports.insert((module, name));
                }
                debug!("Created facade chunk for {}", graph.module(entry).id);
                facades.push(facade);
                self.facade_chunk_of.insert(entry, facade_id);
            }
        }

        self.chunks.extend(facades);
    }

    /// Whether `module` needs to be reachable from outside chunk `id`
    fn is_entry_of(&self, graph: &ModuleGraph, module: ModuleId, id: ChunkId) -> bool {
        graph.module(module).is_user_defined_entry
            || graph
                .included_dynamic_importers(module)
                .iter()
                .any(|importer| self.module_to_chunk.get(importer) != Some(&id))
    }

    fn link_dynamic_imports(&mut self, graph: &ModuleGraph) {
        for id in 0..self.chunks.len() {
            let mut targets = Vec::new();
            for &module in self.chunks[id].modules() {
                for dynamic in &graph.module(module).dynamic_imports {
                    if let Some(target) = self.dynamic_target(dynamic.target) {
                        if target != id && !targets.contains(&target) {
                            targets.push(target);
                        }
                    }
                }
            }
            self.chunks[id].dynamic_dependencies = targets;
        }
    }

    /// Chunk an `import()` of `module` resolves to
    pub fn dynamic_target(&self, module: ModuleId) -> Option<ChunkId> {
        self.facade_chunk_of
            .get(&module)
            .or_else(|| self.module_to_chunk.get(&module))
            .copied()
    }

    /// Decide the exported name of every required binding.
    ///
    /// The facade module's exports keep their names; other bindings take
    /// their exported name or the first free `name$N`.
    pub fn generate_exports(&mut self) {
        for chunk in &mut self.chunks {
            let mut used = HashSet::new();
            let mut exports = indexmap::IndexMap::new();

            if let Some(facade) = chunk.facade_module {
                for key in chunk.required_exports.iter().filter(|(m, _)| *m == facade) {
                    used.insert(key.1.clone());
                    exports.insert(key.clone(), key.1.clone());
                }
            }

            for key in &chunk.required_exports {
                if exports.contains_key(key) {
                    continue;
                }
                let mut name = key.1.clone();
                let mut counter = 1;
                while used.contains(&name) {
                    name = format!("{}${}", key.1, counter);
                    counter += 1;
                }
                used.insert(name.clone());
                exports.insert(key.clone(), name);
            }

            chunk.exports = exports;
        }
    }

    /// Name under which `chunk` exports the binding `name` of `module`
    pub fn export_name(&self, chunk: ChunkId, module: ModuleId, name: &str) -> Option<&str> {
        self.chunks[chunk]
            .exports
            .get(&(module, name.to_string()))
            .map(String::as_str)
    }

    /// Binding inside `chunk`'s code that an export refers to
    pub fn export_local(&self, graph: &ModuleGraph, chunk: ChunkId, module: ModuleId, name: &str) -> Option<String> {
        let chunk = &self.chunks[chunk];
        match chunk.facade_target {
            Some(target) => chunk
                .imports
                .get(&target)?
                .iter()
                .find(|import| import.module == module && import.name == name)
                .map(|import| import.local.clone()),
            None => graph.module(module).export(name).map(|e| e.local.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Local binding a facade chunk uses for a re-exported name
fn facade_local(exported: &str) -> String {
    if exported == "default" {
        "_default".to_string()
    } else {
        make_legal_identifier(exported)
    }
}
