//! Partitioning included modules into chunk groups

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use super::graph::{ModuleGraph, ModuleId};
use super::manual_chunks::AliasMap;
use super::options::OutputOptions;

/// Which partitioning strategy to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    /// Everything in a single chunk
    Inline,
    /// One chunk per module
    PreserveModules,
    /// Entry-reachability based code splitting
    Automatic,
}

impl From<&OutputOptions> for PartitionMode {
    fn from(options: &OutputOptions) -> Self {
        if options.preserve_modules {
            PartitionMode::PreserveModules
        } else if options.inline_dynamic_imports || options.file.is_some() {
            PartitionMode::Inline
        } else {
            PartitionMode::Automatic
        }
    }
}

/// A set of modules that becomes one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGroup {
    pub alias: Option<String>,
    /// Modules in execution order
    pub modules: Vec<ModuleId>,
}

/// Partition the included modules of `graph` into chunk groups.
///
/// `graph` must have had its execution order analyzed.
pub fn partition(graph: &ModuleGraph, aliases: &AliasMap, mode: PartitionMode) -> Vec<ChunkGroup> {
    let included = graph.included_modules();
    if included.is_empty() {
        return Vec::new();
    }

    match mode {
        PartitionMode::Inline => vec![ChunkGroup {
            alias: None,
            modules: included,
        }],
        PartitionMode::PreserveModules => included
            .into_iter()
            .map(|id| ChunkGroup {
                alias: None,
                modules: vec![id],
            })
            .collect(),
        PartitionMode::Automatic => automatic_groups(graph, aliases, &included),
    }
}

fn automatic_groups(graph: &ModuleGraph, aliases: &AliasMap, included: &[ModuleId]) -> Vec<ChunkGroup> {
    let manual = manual_groups(graph, aliases);
    let in_manual: HashSet<ModuleId> = manual.values().flatten().copied().collect();

    // Static entries first, then dynamic import targets
    let mut entries: Vec<ModuleId> = graph
        .get_entry_modules()
        .iter()
        .copied()
        .filter(|&id| graph.module(id).is_included)
        .collect();
    for id in graph.dynamic_entry_modules() {
        if !entries.contains(&id) {
            entries.push(id);
        }
    }

    let mut dependent_entries: HashMap<ModuleId, Vec<usize>> = HashMap::new();
    for (index, &entry) in entries.iter().enumerate() {
        if in_manual.contains(&entry) {
            continue;
        }
        for id in static_closure(graph, entry, &in_manual) {
            dependent_entries.entry(id).or_default().push(index);
        }
    }

    let mut groups: Vec<ChunkGroup> = manual
        .into_iter()
        .map(|(alias, modules)| ChunkGroup {
            alias: Some(alias),
            modules,
        })
        .collect();

    let mut group_by_signature: HashMap<Vec<usize>, usize> = HashMap::new();
    for &id in included {
        if in_manual.contains(&id) {
            continue;
        }
        let signature = dependent_entries.remove(&id).unwrap_or_default();
        let index = *group_by_signature.entry(signature).or_insert_with(|| {
            groups.push(ChunkGroup {
                alias: None,
                modules: Vec::new(),
            });
            groups.len() - 1
        });
        groups[index].modules.push(id);
    }

    for group in &mut groups {
        group
            .modules
            .sort_by_key(|&id| (graph.module(id).exec_index, id));
    }

    groups
}

/// Alias → modules, where each alias also absorbs the static dependencies of
/// its modules that no alias claims
fn manual_groups(graph: &ModuleGraph, aliases: &AliasMap) -> BTreeMap<String, Vec<ModuleId>> {
    let mut assigned: HashMap<ModuleId, String> = aliases
        .iter()
        .filter(|(&id, _)| graph.module(id).is_included)
        .map(|(&id, alias)| (id, alias.clone()))
        .collect();

    let mut seeds: Vec<(String, ModuleId)> = assigned
        .iter()
        .map(|(&id, alias)| (alias.clone(), id))
        .collect();
    seeds.sort_by_key(|(alias, id)| (alias.clone(), graph.module(*id).exec_index));

    // Modules listed under an alias bound every other alias's dependency walk
    let listed: HashSet<ModuleId> = assigned.keys().copied().collect();

    for (alias, seed) in seeds {
        for id in static_closure(graph, seed, &listed) {
            if !assigned.contains_key(&id) {
                assigned.insert(id, alias.clone());
            }
        }
    }

    let mut groups: BTreeMap<String, Vec<ModuleId>> = BTreeMap::new();
    for (id, alias) in assigned {
        groups.entry(alias).or_default().push(id);
    }
    groups
}

/// Modules statically reachable from `entry` without entering manual chunks
fn static_closure(graph: &ModuleGraph, entry: ModuleId, stop: &HashSet<ModuleId>) -> Vec<ModuleId> {
    let mut visited = HashSet::new();
    let mut result = Vec::new();
    let mut queue = VecDeque::from([entry]);
    visited.insert(entry);

    while let Some(id) = queue.pop_front() {
        result.push(id);
        for &dep in graph.get_dependencies(id) {
            if !stop.contains(&dep) && graph.module(dep).is_included && visited.insert(dep) {
                queue.push_back(dep);
            }
        }
    }

    result
}
