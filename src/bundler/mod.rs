//! Core bundler implementation
//!
//! Turns a module graph into chunks, names them and renders the output
//! bundle while driving the plugin hooks in a fixed order.

mod addons;
mod chunk;
mod graph;
mod link;
mod manual_chunks;
mod naming;
mod options;
mod output;
mod partition;
mod render;
mod sourcemap;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::try_join_all;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{Result, Warning, WarningCode};
use crate::plugins::{Plugin, PluginContext, PluginManager};
use crate::utils::import_path;

pub use addons::Addons;
pub use chunk::{Chunk, ChunkId, ChunkImport, PreRendered, Segment};
pub use graph::{DynamicImport, ExportBinding, ImportBinding, Module, ModuleGraph, ModuleId, ModuleType};
pub use link::{ChunkGraph, ModuleChunkMap};
pub use manual_chunks::{resolve_manual_chunks, AliasMap, LoadModule, ModuleInfo, ModuleQuery};
pub use naming::render_pattern;
pub use options::{ChunkClassifier, InputOptions, ManualChunks, OutputFormat, OutputOptions, SourceMapMode};
pub use output::{
    AssetSource, BundleEntry, EmittedAsset, OutputAsset, OutputBundle, OutputChunk, OutputFile, RenderedChunk,
};
pub use partition::{partition, ChunkGroup, PartitionMode};

use render::{DynamicTarget, FinalizeContext, ImportBlock};

/// Result of a generation call
#[derive(Debug)]
pub struct BuildOutput {
    /// Output files by file name, chunks in identity order then assets
    pub files: IndexMap<String, OutputFile>,

    /// Non-fatal issues found while generating
    pub warnings: Vec<Warning>,
}

/// Information about a written output file
#[derive(Debug)]
pub struct BundleInfo {
    /// Output file path
    pub output_path: PathBuf,

    /// File size in bytes
    pub size: usize,
}

impl BuildOutput {
    /// Generated chunks in output order
    pub fn chunks(&self) -> impl Iterator<Item = &OutputChunk> {
        self.files.values().filter_map(OutputFile::as_chunk)
    }

    pub fn get(&self, file_name: &str) -> Option<&OutputFile> {
        self.files.get(file_name)
    }

    /// Write every file below `dir`
    pub fn write_to(&self, dir: &Path) -> Result<Vec<BundleInfo>> {
        fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(self.files.len());
        for (file_name, file) in &self.files {
            let output_path = dir.join(file_name);
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let contents = file.contents();
            fs::write(&output_path, contents)?;
            debug!("Wrote {}", output_path.display());

            written.push(BundleInfo {
                output_path,
                size: contents.len(),
            });
        }

        Ok(written)
    }
}

/// The main bundler
pub struct Bundler {
    /// What goes into the bundle
    input: InputOptions,

    /// Module graph
    graph: Arc<RwLock<ModuleGraph>>,

    /// Loads modules manual chunks name but the graph has not reached
    loader: Option<Arc<dyn LoadModule>>,

    /// Registered plugins
    plugins: PluginManager,

    /// Project root handed to plugins
    root: PathBuf,
}

impl Bundler {
    /// Create a bundler over a shared module graph
    pub fn new(graph: Arc<RwLock<ModuleGraph>>, input: InputOptions) -> Self {
        Self {
            input,
            graph,
            loader: None,
            plugins: PluginManager::new(),
            root: PathBuf::from("."),
        }
    }

    /// Create a bundler that owns its module graph
    pub fn from_graph(graph: ModuleGraph, input: InputOptions) -> Self {
        Self::new(Arc::new(RwLock::new(graph)), input)
    }

    pub fn with_loader(mut self, loader: Arc<dyn LoadModule>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Register a plugin; hooks run in registration order
    pub fn register_plugin(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.register(plugin);
    }

    pub fn graph(&self) -> Arc<RwLock<ModuleGraph>> {
        self.graph.clone()
    }

    /// Generate the output bundle for `output`.
    ///
    /// `is_write` is passed on to `generate_bundle` hooks; the bundle is
    /// never written here.
    pub async fn generate(&self, output: &OutputOptions, is_write: bool) -> Result<BuildOutput> {
        let start = Instant::now();
        output.validate(&self.input)?;

        let ctx = PluginContext::new(self.root.clone(), output.asset_file_names.clone());
        self.plugins.render_start(output, &self.input, &ctx).await?;

        if let Err(err) = self.render_chunks(output, &ctx).await {
            self.plugins.render_error(&err, &ctx).await;
            return Err(err);
        }

        debug!("Running generate_bundle hooks (is_write: {})", is_write);
        let mut bundle = ctx.take_bundle();
        self.plugins.generate_bundle(output, &mut bundle, is_write, &ctx).await?;

        if output.validate {
            let invalid: Vec<(String, String)> = bundle
                .iter()
                .filter_map(|(file_name, file)| {
                    let chunk = file.as_chunk()?;
                    render::check_syntax(&chunk.code)
                        .err()
                        .map(|message| (file_name.to_string(), message))
                })
                .collect();

            for (file_name, message) in invalid {
                bundle.warn(Warning::new(
                    WarningCode::InvalidChunkSyntax,
                    format!("Chunk \"{}\" is not valid JavaScript: {}", file_name, message),
                ));
            }
        }

        let (files, warnings) = bundle.finalize()?;
        info!("Generated {} files in {:?}", files.len(), start.elapsed());

        Ok(BuildOutput { files, warnings })
    }

    /// Everything between render_start and generate_bundle
    async fn render_chunks(&self, output: &OutputOptions, ctx: &PluginContext) -> Result<()> {
        // 1. Partition the graph into chunks
        let aliases = match &self.input.manual_chunks {
            Some(manual) => resolve_manual_chunks(manual, &self.graph, self.loader.as_deref()).await?,
            None => AliasMap::new(),
        };

        let graph = {
            let mut graph = self.graph.read().clone();
            graph.analyze_execution_order();
            graph
        };

        let groups = partition(&graph, &aliases, PartitionMode::from(output));
        let mut chunks = ChunkGraph::build(&graph, groups);
        output.validate_chunk_count(chunks.len())?;
        info!("Generating {} chunks...", chunks.len());

        // 2. Addons
        let addons = Addons::resolve(output, &self.plugins, ctx).await?;

        // 3. Exports of every chunk before any chunk renders
        chunks.generate_exports();

        // 4. Module code
        for id in 0..chunks.len() {
            let rendered = render::pre_render(&chunks, &graph, id);
            chunks.chunks[id].rendered = Some(rendered);
        }

        // 5. File names
        naming::assign_identities(&mut chunks, &graph, output, &mut ctx.bundle().lock())?;

        // 6. Finalize every chunk
        try_join_all((0..chunks.len()).map(|id| self.render_chunk(&chunks, &graph, id, output, &addons, ctx))).await?;

        Ok(())
    }

    /// Wrap, transform and store one chunk
    async fn render_chunk(
        &self,
        chunks: &ChunkGraph,
        graph: &ModuleGraph,
        id: ChunkId,
        output: &OutputOptions,
        addons: &Addons,
        ctx: &PluginContext,
    ) -> Result<()> {
        let chunk = &chunks.chunks[id];
        let file_name = chunk.identity().unwrap_or_default();
        let identity = |dep: ChunkId| chunks.chunks[dep].identity().unwrap_or_default();

        let imports = chunk
            .dependencies
            .iter()
            .map(|&dep| ImportBlock {
                path: import_path(file_name, identity(dep)),
                bindings: chunk
                    .imports
                    .get(&dep)
                    .map(|imports| {
                        imports
                            .iter()
                            .map(|import| {
                                let name = chunks
                                    .export_name(dep, import.module, &import.name)
                                    .unwrap_or(import.name.as_str());
                                (name.to_string(), import.local.clone())
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();

        let exports = chunk
            .exports
            .iter()
            .filter_map(|((module, name), exported)| {
                let local = chunks.export_local(graph, id, *module, name)?;
                Some((exported.clone(), local))
            })
            .collect();

        let rendered = chunk.rendered.clone().unwrap_or_default();
        let body = render::resolve_dynamic_imports(&rendered.body, output.format, |module| {
            Some(match chunks.dynamic_target(module) {
                Some(target) if target != id => DynamicTarget::Chunk(import_path(file_name, identity(target))),
                Some(_) => {
                    let properties: Vec<(String, String)> = graph
                        .module(module)
                        .exports
                        .iter()
                        .map(|e| (e.exported.clone(), e.local.clone()))
                        .collect();
                    DynamicTarget::Inline(render::namespace_object(&properties))
                }
                None => DynamicTarget::Inline(render::namespace_object(&[])),
            })
        });

        let wrapped = render::finalize(
            output.format,
            &FinalizeContext {
                imports,
                exports,
                name: output.name.as_deref(),
                intro: &addons.intro,
                outro: &addons.outro,
            },
        );

        let mut code = String::new();
        if !addons.banner.is_empty() {
            code.push_str(&addons.banner);
            code.push('\n');
        }
        let line_offset = render::count_lines(&code) + render::count_lines(&wrapped.prefix);
        code.push_str(&wrapped.prefix);
        code.push_str(&body);
        code.push_str(&wrapped.suffix);
        if !addons.footer.is_empty() {
            code.push_str(&addons.footer);
            code.push('\n');
        }

        let map = (output.sourcemap != SourceMapMode::Off)
            .then(|| sourcemap::chunk_sourcemap(file_name, graph, &rendered.segments, line_offset));

        let info = self.rendered_chunk(chunks, graph, id);
        let (mut code, map) = self.plugins.render_chunk(code, map, &info, ctx).await?;

        if let Some(map) = &map {
            match output.sourcemap {
                SourceMapMode::File | SourceMapMode::Hidden => {
                    let requested = match output.sourcemap_file.as_deref().and_then(Path::file_name) {
                        Some(name) => name.to_string_lossy().to_string(),
                        None => format!("{}.map", file_name),
                    };
                    let map_file = ctx.bundle().lock().insert_unique(&requested, |unique| {
                        OutputFile::Asset(OutputAsset {
                            file_name: unique.to_string(),
                            name: None,
                            source: map.clone().into(),
                        })
                    });
                    if output.sourcemap == SourceMapMode::File {
                        let url = map_file.rsplit('/').next().unwrap_or(&map_file);
                        code.push_str(&sourcemap::url_comment(url));
                    }
                }
                SourceMapMode::Inline => code.push_str(&sourcemap::inline_comment(map)),
                SourceMapMode::Off => {}
            }
        }

        let is_empty = !chunk.is_facade() && chunk.modules().iter().all(|&m| graph.module(m).code.trim().is_empty());
        let mut bundle = ctx.bundle().lock();
        if is_empty {
            bundle.warn(Warning::new(
                WarningCode::EmptyChunk,
                format!("Generated an empty chunk: \"{}\"", chunk.name),
            ));
        }
        debug!("Rendered {} ({} bytes)", file_name, code.len());
        bundle.insert(file_name.to_string(), OutputChunk { code, map, info });

        Ok(())
    }

    /// Metadata handed to render_chunk hooks and stored with the chunk
    fn rendered_chunk(&self, chunks: &ChunkGraph, graph: &ModuleGraph, id: ChunkId) -> RenderedChunk {
        let chunk = &chunks.chunks[id];
        let facade = chunk.facade_module.map(|m| graph.module(m));
        let file_names = |ids: &[ChunkId]| -> Vec<String> {
            ids.iter()
                .map(|&dep| chunks.chunks[dep].identity().unwrap_or_default().to_string())
                .collect()
        };

        RenderedChunk {
            file_name: chunk.identity().unwrap_or_default().to_string(),
            name: chunk.name.clone(),
            is_entry: facade.is_some_and(|m| m.is_user_defined_entry),
            is_dynamic_entry: chunk
                .facade_module
                .is_some_and(|m| !graph.included_dynamic_importers(m).is_empty()),
            is_facade: chunk.is_facade(),
            facade_module_id: facade.map(|m| m.id.clone()),
            module_ids: chunk.modules().iter().map(|&m| graph.module(m).id.clone()).collect(),
            exports: chunk.exports.values().cloned().collect(),
            imports: file_names(&chunk.dependencies),
            dynamic_imports: file_names(&chunk.dynamic_dependencies),
        }
    }
}
