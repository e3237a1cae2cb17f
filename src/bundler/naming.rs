//! Output identities for chunks

use std::path::Path;

use tracing::debug;

use super::graph::ModuleGraph;
use super::link::ChunkGraph;
use super::options::OutputOptions;
use super::output::OutputBundle;
use crate::error::{BundleError, Result};
use crate::utils::{common_dir, contained_path, file_stem, hash_content};

/// Substitute `[placeholder]`s in a file name pattern.
///
/// Unknown placeholders and patterns that are not plain relative paths are
/// rejected as invalid values of `option`.
pub fn render_pattern<F>(pattern: &str, option: &'static str, replace: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if pattern.starts_with('/') || pattern.starts_with("./") || pattern.starts_with("../") {
        return Err(BundleError::invalid_option(
            option,
            format!(
                "invalid pattern \"{}\": patterns can be neither absolute nor relative paths",
                pattern
            ),
        ));
    }

    let mut result = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(open) = rest.find('[') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            result.push_str(&rest[open..]);
            return Ok(result);
        };

        let placeholder = &after[..close];
        match replace(placeholder) {
            Some(value) => result.push_str(&value),
            None => {
                return Err(BundleError::invalid_option(
                    option,
                    format!("\"[{}]\" is not a valid placeholder in \"{}\"", placeholder, pattern),
                ))
            }
        }
        rest = &after[close + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Name substituted for `[name]` for a chunk
fn chunk_name(chunks: &ChunkGraph, graph: &ModuleGraph, id: usize) -> String {
    let chunk = &chunks.chunks[id];

    if let Some(alias) = &chunk.alias {
        return alias.clone();
    }

    match chunk.facade_module.map(|m| graph.module(m)) {
        Some(module) => module
            .entry_name
            .clone()
            .unwrap_or_else(|| file_stem(&module.id).to_string()),
        None => "chunk".to_string(),
    }
}

/// Chunks whose facade module is a user-defined entry come first, the rest
/// follow in generation order
pub fn identity_order(chunks: &ChunkGraph, graph: &ModuleGraph) -> Vec<usize> {
    let (mut entries, rest): (Vec<usize>, Vec<usize>) =
        (0..chunks.len()).partition(|&id| hosts_user_entry(chunks, graph, id));
    entries.extend(rest);
    entries
}

/// Assign every chunk its unique file name, reserving it in the bundle
pub fn assign_identities(
    chunks: &mut ChunkGraph,
    graph: &ModuleGraph,
    options: &OutputOptions,
    bundle: &mut OutputBundle,
) -> Result<()> {
    let preserve_base = options.preserve_modules.then(|| {
        common_dir(
            graph
                .included_modules()
                .into_iter()
                .map(|id| graph.module(id).id.as_str()),
        )
    });

    for id in identity_order(chunks, graph) {
        let requested = match (&options.file, &preserve_base) {
            (Some(file), _) => Path::new(file)
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .ok_or_else(|| BundleError::invalid_option("file", "\"file\" must name a file"))?,
            (None, Some(base)) => {
                let name = preserved_name(chunks, graph, id, base);
                chunks.chunks[id].name = name.clone();
                chunk_file_name(chunks, graph, options, id, "entry_file_names", &name)?
            }
            (None, None) => {
                let name = chunk_name(chunks, graph, id);
                chunks.chunks[id].name = name.clone();
                let option = if hosts_user_entry(chunks, graph, id) {
                    "entry_file_names"
                } else {
                    "chunk_file_names"
                };
                chunk_file_name(chunks, graph, options, id, option, &name)?
            }
        };

        if chunks.chunks[id].name.is_empty() {
            chunks.chunks[id].name = file_stem(&requested).to_string();
        }

        let identity = bundle.reserve(&requested);
        debug!("Chunk {} -> {}", id, identity);
        chunks.chunks[id].set_identity(id, identity)?;
    }

    Ok(())
}

fn hosts_user_entry(chunks: &ChunkGraph, graph: &ModuleGraph, id: usize) -> bool {
    chunks.chunks[id]
        .facade_module
        .is_some_and(|m| graph.module(m).is_user_defined_entry)
}

/// Module path relative to the common base directory, extension stripped,
/// kept inside the output directory
fn preserved_name(chunks: &ChunkGraph, graph: &ModuleGraph, id: usize, base: &str) -> String {
    let chunk = &chunks.chunks[id];
    let Some(module) = chunk.modules().first().or(chunk.facade_module.as_ref()) else {
        return "chunk".to_string();
    };
    let module_id = &graph.module(*module).id;

    let relative = if base.is_empty() {
        module_id.as_str()
    } else {
        module_id
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(module_id.as_str())
    };
    let relative = contained_path(relative);

    match relative.rfind('.') {
        Some(dot) if dot > relative.rfind('/').map_or(0, |slash| slash + 1) => relative[..dot].to_string(),
        _ => relative,
    }
}

fn chunk_file_name(
    chunks: &ChunkGraph,
    graph: &ModuleGraph,
    options: &OutputOptions,
    id: usize,
    option: &'static str,
    name: &str,
) -> Result<String> {
    let pattern = if option == "entry_file_names" {
        &options.entry_file_names
    } else {
        &options.chunk_file_names
    };
    let hash = content_hash(chunks, graph, options, id);

    render_pattern(pattern, option, |placeholder| match placeholder {
        "name" => Some(name.to_string()),
        "hash" => Some(hash.clone()),
        "format" => Some(options.format.to_string()),
        "ext" => Some("js".to_string()),
        "extname" => Some(".js".to_string()),
        _ => None,
    })
}

/// Eight hex characters over the chunk body, format and module ids
fn content_hash(chunks: &ChunkGraph, graph: &ModuleGraph, options: &OutputOptions, id: usize) -> String {
    let chunk = &chunks.chunks[id];
    let mut input = String::new();

    if let Some(rendered) = &chunk.rendered {
        input.push_str(&rendered.body);
    }
    input.push('\0');
    input.push_str(options.format.as_str());
    for &module in chunk.modules().iter().chain(chunk.facade_module.iter()) {
        input.push('\0');
        input.push_str(&graph.module(module).id);
    }
    for &dep in &chunk.dependencies {
        for &module in chunks.chunks[dep].modules() {
            input.push('\0');
            input.push_str(&graph.module(module).id);
        }
    }

    hash_content(input.as_bytes())[..8].to_string()
}
