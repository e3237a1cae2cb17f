//! Line-level source maps for rendered chunks

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use oxc_sourcemap::SourceMapBuilder;

use super::chunk::Segment;
use super::graph::{ModuleGraph, ModuleId};

/// Build a source map for a chunk whose body starts `line_offset` lines
/// into the final code. Every line of a module maps to the start of the
/// same line in its original source.
pub fn chunk_sourcemap(file: &str, graph: &ModuleGraph, segments: &[Segment], line_offset: u32) -> String {
    let mut builder = SourceMapBuilder::default();
    builder.set_file(file);

    let mut source_ids: HashMap<ModuleId, u32> = HashMap::new();
    for segment in segments {
        let source_id = match source_ids.get(&segment.module) {
            Some(&id) => id,
            None => {
                let module = graph.module(segment.module);
                let id = builder.add_source_and_content(&module.id, &module.source);
                source_ids.insert(segment.module, id);
                id
            }
        };

        for line in 0..segment.line_count {
            builder.add_token(
                line_offset + segment.start_line + line,
                0,
                line,
                0,
                Some(source_id),
                None,
            );
        }
    }

    builder.into_sourcemap().to_json_string()
}

/// Trailing comment referencing a map file
pub fn url_comment(url: &str) -> String {
    format!("//# sourceMappingURL={}\n", url)
}

/// Trailing comment embedding a map as a data URL
pub fn inline_comment(map: &str) -> String {
    url_comment(&format!(
        "data:application/json;charset=utf-8;base64,{}",
        STANDARD.encode(map.as_bytes())
    ))
}
