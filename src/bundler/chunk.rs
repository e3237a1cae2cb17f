//! Chunks produced by code splitting

use indexmap::{IndexMap, IndexSet};

use super::graph::ModuleId;
use crate::error::{BundleError, Result};

/// Index of a chunk in the chunk graph
pub type ChunkId = usize;

/// A binding one chunk imports from another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkImport {
    /// Module that owns the binding
    pub module: ModuleId,
    /// Exported name of the binding in `module`
    pub name: String,
    /// Name the importing chunk's code uses
    pub local: String,
}

/// A namespace object a chunk builds for an `import * as ns` of another chunk's module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceObject {
    /// Module whose code refers to the namespace
    pub importer: ModuleId,
    pub local: String,
    /// Exported name to local binding
    pub properties: Vec<(String, String)>,
}

/// A same-chunk import whose local name differs from the exporter's binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAlias {
    pub importer: ModuleId,
    pub local: String,
    pub binding: String,
}

/// Rendered body of a chunk before format finalization
#[derive(Debug, Clone, Default)]
pub struct PreRendered {
    pub body: String,
    /// Where each module's code starts in `body`
    pub segments: Vec<Segment>,
}

/// Lines of `body` that came from one module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub module: ModuleId,
    /// Zero-based line in the body where the module's code starts
    pub start_line: u32,
    pub line_count: u32,
}

/// A chunk is a group of modules that will be bundled together
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Manual chunk alias, if any
    pub alias: Option<String>,

    /// Module IDs included in this chunk, in execution order
    modules: Vec<ModuleId>,

    /// Entry modules (user-defined or dynamic) this chunk contains
    pub entry_modules: Vec<ModuleId>,

    /// Entry module whose exports this chunk exposes verbatim
    pub facade_module: Option<ModuleId>,

    /// For facade chunks, the chunk holding the facade module's code
    pub facade_target: Option<ChunkId>,

    /// Chunks that must execute before this one
    pub dependencies: Vec<ChunkId>,

    /// Bindings imported from each dependency chunk
    pub imports: IndexMap<ChunkId, Vec<ChunkImport>>,

    pub namespaces: Vec<NamespaceObject>,

    pub local_aliases: Vec<LocalAlias>,

    /// Chunks loaded through `import()`
    pub dynamic_dependencies: Vec<ChunkId>,

    /// Bindings other chunks need from this one
    pub required_exports: IndexSet<(ModuleId, String)>,

    /// Final export name per required binding, set by export generation
    pub exports: IndexMap<(ModuleId, String), String>,

    pub rendered: Option<PreRendered>,

    /// Name substituted for `[name]`
    pub name: String,

    identity: Option<String>,
}

impl Chunk {
    /// Create a chunk over a group of modules
    pub fn new(alias: Option<String>, modules: Vec<ModuleId>) -> Self {
        Self {
            alias,
            modules,
            entry_modules: Vec::new(),
            facade_module: None,
            facade_target: None,
            dependencies: Vec::new(),
            imports: IndexMap::new(),
            namespaces: Vec::new(),
            local_aliases: Vec::new(),
            dynamic_dependencies: Vec::new(),
            required_exports: IndexSet::new(),
            exports: IndexMap::new(),
            rendered: None,
            name: String::new(),
            identity: None,
        }
    }

    /// Create a facade chunk re-exporting `module` from `target`
    pub fn facade(module: ModuleId, target: ChunkId) -> Self {
        let mut chunk = Self::new(None, Vec::new());
        chunk.facade_module = Some(module);
        chunk.facade_target = Some(target);
        chunk.entry_modules.push(module);
        chunk.dependencies.push(target);
        chunk
    }

    /// Modules in execution order
    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }

    pub fn is_facade(&self) -> bool {
        self.facade_target.is_some()
    }

    /// Add a dependency chunk once
    pub fn add_dependency(&mut self, chunk: ChunkId) {
        if !self.dependencies.contains(&chunk) {
            self.dependencies.push(chunk);
        }
    }

    /// Record an imported binding, skipping exact duplicates
    pub fn add_import(&mut self, from: ChunkId, import: ChunkImport) {
        self.add_dependency(from);
        let imports = self.imports.entry(from).or_default();
        if !imports.contains(&import) {
            imports.push(import);
        }
    }

    /// Output identity, once assigned
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Assign the output identity; a chunk gets exactly one
    pub fn set_identity(&mut self, id: ChunkId, identity: String) -> Result<()> {
        if let Some(existing) = &self.identity {
            return Err(BundleError::IdentityReassigned {
                chunk: id,
                existing: existing.clone(),
            });
        }
        self.identity = Some(identity);
        Ok(())
    }

    /// Check if chunk is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Number of modules in chunk
    pub fn len(&self) -> usize {
        self.modules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_set_once() {
        let mut chunk = Chunk::new(None, vec![0]);
        chunk.set_identity(0, "main.js".to_string()).unwrap();
        assert_eq!(chunk.identity(), Some("main.js"));

        let err = chunk.set_identity(0, "other.js".to_string()).unwrap_err();
        assert!(matches!(err, BundleError::IdentityReassigned { chunk: 0, .. }));
        assert_eq!(chunk.identity(), Some("main.js"));
    }

    #[test]
    fn test_facade_chunk_shape() {
        let chunk = Chunk::facade(3, 1);
        assert!(chunk.is_empty());
        assert!(chunk.is_facade());
        assert_eq!(chunk.dependencies, vec![1]);
        assert_eq!(chunk.entry_modules, vec![3]);
    }

    #[test]
    fn test_imports_are_deduplicated() {
        let mut chunk = Chunk::new(None, vec![0]);
        let import = ChunkImport {
            module: 4,
            name: "a".to_string(),
            local: "a".to_string(),
        };
        chunk.add_import(2, import.clone());
        chunk.add_import(2, import);

        assert_eq!(chunk.dependencies, vec![2]);
        assert_eq!(chunk.imports[&2].len(), 1);
    }
}
