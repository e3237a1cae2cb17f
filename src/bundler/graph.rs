//! Module graph data structures

use std::collections::{HashMap, VecDeque};

use crate::utils::clean_path;

/// Unique identifier for a module
pub type ModuleId = usize;

/// Extensions tried when looking a specifier up by id
const PROBE_EXTENSIONS: [&str; 4] = ["js", "mjs", "cjs", "json"];

/// Types of modules the loader can handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleType {
    JavaScript,
    Json,
    Unknown,
}

impl ModuleType {
    /// Determine module type from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" | "jsx" => ModuleType::JavaScript,
            "json" => ModuleType::Json,
            _ => ModuleType::Unknown,
        }
    }
}

/// A binding a module exposes to importers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBinding {
    /// Name seen by importers (`default` for default exports)
    pub exported: String,
    /// Binding name inside the module's rendered code
    pub local: String,
}

impl ExportBinding {
    pub fn new(exported: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            exported: exported.into(),
            local: local.into(),
        }
    }
}

/// A binding a module pulls in from one of its static dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Module the binding comes from
    pub source: ModuleId,
    /// Exported name in the source module, or `*` for a namespace import
    pub imported: String,
    /// Name the importing module's code refers to
    pub local: String,
}

/// A dynamic `import()` expression and the module it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicImport {
    pub specifier: String,
    pub target: ModuleId,
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Stable module id (project-relative path for loaded modules)
    pub id: String,

    /// Original source text, used for source maps
    pub source: String,

    /// Rendered code, with static import statements already removed
    pub code: String,

    /// Whether tree-shaking kept any part of this module
    pub is_included: bool,

    /// Whether this is an entry point of any kind
    pub is_entry: bool,

    /// Whether the user listed this module as an entry point
    pub is_user_defined_entry: bool,

    /// Entry name given by the user
    pub entry_name: Option<String>,

    /// Static dependencies in import order
    pub dependencies: Vec<ModuleId>,

    /// Bindings imported from static dependencies
    pub imports: Vec<ImportBinding>,

    /// Dynamic imports in source order
    pub dynamic_imports: Vec<DynamicImport>,

    /// Modules that dynamically import this one
    pub dynamic_importers: Vec<ModuleId>,

    /// Exported bindings
    pub exports: Vec<ExportBinding>,

    /// Position in execution order, set by [`ModuleGraph::analyze_execution_order`]
    pub exec_index: usize,
}

impl Module {
    /// Create an included, non-entry module with the given rendered code
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            id: id.into(),
            source: code.clone(),
            code,
            is_included: true,
            is_entry: false,
            is_user_defined_entry: false,
            entry_name: None,
            dependencies: Vec::new(),
            imports: Vec::new(),
            dynamic_imports: Vec::new(),
            dynamic_importers: Vec::new(),
            exports: Vec::new(),
            exec_index: usize::MAX,
        }
    }

    /// Add an export whose local binding has the same name
    pub fn with_export(mut self, name: &str) -> Self {
        self.exports.push(ExportBinding::new(name, name));
        self
    }

    /// Look up the export binding for an exported name
    pub fn export(&self, exported: &str) -> Option<&ExportBinding> {
        self.exports.iter().find(|e| e.exported == exported)
    }
}

/// The module dependency graph
#[derive(Debug, Default, Clone)]
pub struct ModuleGraph {
    /// All modules; a module's position is its id
    modules: Vec<Module>,

    /// Map from module id string to module ID
    id_to_module: HashMap<String, ModuleId>,

    /// User-defined entries in the order they were requested
    entries: Vec<ModuleId>,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the graph
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        // Check if already exists
        if let Some(&id) = self.id_to_module.get(&module.id) {
            return id;
        }

        let id = self.modules.len();
        self.id_to_module.insert(module.id.clone(), id);
        self.modules.push(module);

        id
    }

    /// Add a static dependency edge between modules
    pub fn add_dependency(&mut self, from: ModuleId, to: ModuleId) {
        if let Some(module) = self.modules.get_mut(from) {
            if !module.dependencies.contains(&to) {
                module.dependencies.push(to);
            }
        }
    }

    /// Record a binding `from` imports out of `source`
    pub fn add_import(&mut self, from: ModuleId, source: ModuleId, imported: &str, local: &str) {
        self.add_dependency(from, source);
        if let Some(module) = self.modules.get_mut(from) {
            module.imports.push(ImportBinding {
                source,
                imported: imported.to_string(),
                local: local.to_string(),
            });
        }
    }

    /// Add a dynamic import edge between modules
    pub fn add_dynamic_import(&mut self, from: ModuleId, specifier: &str, to: ModuleId) {
        if let Some(module) = self.modules.get_mut(from) {
            module.dynamic_imports.push(DynamicImport {
                specifier: specifier.to_string(),
                target: to,
            });
        }
        if let Some(target) = self.modules.get_mut(to) {
            if !target.dynamic_importers.contains(&from) {
                target.dynamic_importers.push(from);
            }
            target.is_entry = true;
        }
    }

    /// Mark a module as a user-defined entry point
    pub fn mark_entry(&mut self, id: ModuleId, name: Option<String>) {
        if let Some(module) = self.modules.get_mut(id) {
            module.is_entry = true;
            module.is_user_defined_entry = true;
            if name.is_some() {
                module.entry_name = name;
            }
            if !self.entries.contains(&id) {
                self.entries.push(id);
            }
        }
    }

    /// Get module ID from its id string
    pub fn get_module_id(&self, id: &str) -> Option<ModuleId> {
        self.id_to_module.get(id).copied()
    }

    /// Find a module by specifier: exact id, cleaned path, or path without extension
    pub fn find_module(&self, specifier: &str) -> Option<ModuleId> {
        if let Some(id) = self.get_module_id(specifier) {
            return Some(id);
        }

        let cleaned = clean_path(&specifier.replace('\\', "/"));
        if let Some(id) = self.get_module_id(&cleaned) {
            return Some(id);
        }

        PROBE_EXTENSIONS
            .iter()
            .find_map(|ext| self.get_module_id(&format!("{}.{}", cleaned, ext)))
    }

    /// Get a module by ID
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Get a mutable reference to a module
    pub fn get_module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    /// Get a module that is known to exist
    ///
    /// # Panics
    /// Panics if `id` was not handed out by this graph.
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id]
    }

    /// Get all module IDs, ordered by module id string
    pub fn all_module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = (0..self.modules.len()).collect();
        ids.sort_by(|&a, &b| self.modules[a].id.cmp(&self.modules[b].id));
        ids
    }

    /// Included modules in execution order
    pub fn included_modules(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = (0..self.modules.len())
            .filter(|&id| self.modules[id].is_included)
            .collect();
        ids.sort_by_key(|&id| (self.modules[id].exec_index, id));
        ids
    }

    /// User-defined entry modules in request order
    pub fn get_entry_modules(&self) -> &[ModuleId] {
        &self.entries
    }

    /// Included importers that dynamically import `id`
    pub fn included_dynamic_importers(&self, id: ModuleId) -> Vec<ModuleId> {
        self.modules[id]
            .dynamic_importers
            .iter()
            .copied()
            .filter(|&importer| self.modules[importer].is_included)
            .collect()
    }

    /// Included modules that are dynamic-import targets of included importers,
    /// in execution order
    pub fn dynamic_entry_modules(&self) -> Vec<ModuleId> {
        self.included_modules()
            .into_iter()
            .filter(|&id| !self.included_dynamic_importers(id).is_empty())
            .collect()
    }

    /// Get direct dependencies of a module
    pub fn get_dependencies(&self, id: ModuleId) -> &[ModuleId] {
        self.modules
            .get(id)
            .map(|m| m.dependencies.as_slice())
            .unwrap_or_default()
    }

    /// Assign every module its execution index.
    ///
    /// Post-order depth-first walk from the user entries in request order,
    /// static dependencies in import order; dynamic import targets are walked
    /// afterwards in discovery order. Unreached modules come last, by id.
    pub fn analyze_execution_order(&mut self) {
        let mut visited = vec![false; self.modules.len()];
        let mut order = Vec::with_capacity(self.modules.len());
        let mut dynamic_queue = VecDeque::new();

        for &entry in &self.entries {
            self.visit(entry, &mut visited, &mut order, &mut dynamic_queue);
        }
        while let Some(next) = dynamic_queue.pop_front() {
            self.visit(next, &mut visited, &mut order, &mut dynamic_queue);
        }
        for id in self.all_module_ids() {
            self.visit(id, &mut visited, &mut order, &mut dynamic_queue);
            while let Some(next) = dynamic_queue.pop_front() {
                self.visit(next, &mut visited, &mut order, &mut dynamic_queue);
            }
        }

        for (index, id) in order.into_iter().enumerate() {
            self.modules[id].exec_index = index;
        }
    }

    /// Post-order walk of the static dependencies of `root`
    fn visit(
        &self,
        root: ModuleId,
        visited: &mut [bool],
        order: &mut Vec<ModuleId>,
        dynamic_queue: &mut VecDeque<ModuleId>,
    ) {
        if visited[root] {
            return;
        }
        visited[root] = true;

        // (module, index of the next dependency to walk)
        let mut stack = vec![(root, 0usize)];
        while let Some(frame) = stack.last_mut() {
            let id = frame.0;
            let module = &self.modules[id];

            if let Some(&dep) = module.dependencies.get(frame.1) {
                frame.1 += 1;
                if !visited[dep] {
                    visited[dep] = true;
                    stack.push((dep, 0));
                }
                continue;
            }

            for dynamic in &module.dynamic_imports {
                dynamic_queue.push_back(dynamic.target);
            }
            order.push(id);
            stack.pop();
        }
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
