//! Plugin system for chunkyard
//!
//! Provides Rollup-style output generation hooks for extending the bundler.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::future::{join_all, try_join_all};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bundler::{EmittedAsset, InputOptions, OutputBundle, OutputOptions, RenderedChunk};
use crate::config::PluginConfig;
use crate::error::BundleError;

/// Plugin hook context, shared by every hook of one generation
pub struct PluginContext {
    /// Project root directory
    pub root: PathBuf,

    /// Output bundle; written to with single, non-suspending updates
    bundle: Arc<Mutex<OutputBundle>>,

    asset_file_names: String,
}

impl PluginContext {
    pub fn new(root: PathBuf, asset_file_names: impl Into<String>) -> Self {
        Self {
            root,
            bundle: Arc::new(Mutex::new(OutputBundle::new())),
            asset_file_names: asset_file_names.into(),
        }
    }

    /// Emit an asset into the bundle and return its file name
    pub fn emit_asset(&self, asset: EmittedAsset) -> crate::error::Result<String> {
        self.bundle.lock().emit_asset(asset, &self.asset_file_names)
    }

    pub(crate) fn bundle(&self) -> &Arc<Mutex<OutputBundle>> {
        &self.bundle
    }

    /// Move everything written so far out of the context
    pub(crate) fn take_bundle(&self) -> OutputBundle {
        std::mem::take(&mut *self.bundle.lock())
    }
}

/// Result of a render_chunk hook
pub enum RenderChunkResult {
    /// Continue to next plugin with the code unchanged
    Skip,
    /// Replacement code and optional source map (JSON)
    Replaced { code: String, map: Option<String> },
}

/// Which addon a hook contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonHook {
    Banner,
    Footer,
    Intro,
    Outro,
}

impl AddonHook {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddonHook::Banner => "banner",
            AddonHook::Footer => "footer",
            AddonHook::Intro => "intro",
            AddonHook::Outro => "outro",
        }
    }
}

/// Plugin trait - implement this to create a chunkyard plugin
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name for logging and debugging
    fn name(&self) -> &str;

    /// Called once before any chunk is generated
    async fn render_start(
        &self,
        _output: &OutputOptions,
        _input: &InputOptions,
        _ctx: &PluginContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Text placed before every chunk, outside the format wrapper
    async fn banner(&self, _ctx: &PluginContext) -> Result<Option<String>> {
        Ok(None)
    }

    /// Text placed after every chunk, outside the format wrapper
    async fn footer(&self, _ctx: &PluginContext) -> Result<Option<String>> {
        Ok(None)
    }

    /// Text placed at the start of every chunk body, inside the wrapper
    async fn intro(&self, _ctx: &PluginContext) -> Result<Option<String>> {
        Ok(None)
    }

    /// Text placed at the end of every chunk body, inside the wrapper
    async fn outro(&self, _ctx: &PluginContext) -> Result<Option<String>> {
        Ok(None)
    }

    /// Transform the finalized code of a chunk
    /// Return RenderChunkResult::Skip to leave code unchanged
    async fn render_chunk(
        &self,
        _code: &str,
        _map: Option<&str>,
        _chunk: &RenderedChunk,
        _ctx: &PluginContext,
    ) -> Result<RenderChunkResult> {
        Ok(RenderChunkResult::Skip)
    }

    /// Inspect or modify the complete bundle
    async fn generate_bundle(
        &self,
        _output: &OutputOptions,
        _bundle: &mut OutputBundle,
        _is_write: bool,
        _ctx: &PluginContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Called when generation fails before the bundle is complete
    async fn render_error(&self, _error: &BundleError, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }
}

fn hook_error(plugin: &dyn Plugin, hook: &'static str, source: anyhow::Error) -> BundleError {
    BundleError::Plugin {
        plugin: plugin.name().to_string(),
        hook,
        source,
    }
}

/// Plugin manager, the driver of every hook.
///
/// Plugins run in registration order. `render_start` and `render_error` run
/// concurrently across plugins, `render_chunk` is a chain, and
/// `generate_bundle` and the addon hooks run one plugin at a time.
#[derive(Default, Clone)]
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginManager {
    /// Create a new plugin manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run render_start hooks concurrently
    pub async fn render_start(
        &self,
        output: &OutputOptions,
        input: &InputOptions,
        ctx: &PluginContext,
    ) -> crate::error::Result<()> {
        try_join_all(self.plugins.iter().map(|plugin| async move {
            plugin
                .render_start(output, input, ctx)
                .await
                .map_err(|source| hook_error(plugin.as_ref(), "render_start", source))
        }))
        .await?;
        Ok(())
    }

    /// Run one addon hook on every plugin in order
    pub async fn addon(&self, hook: AddonHook, ctx: &PluginContext) -> crate::error::Result<Vec<String>> {
        let mut parts = Vec::new();
        for plugin in &self.plugins {
            let result = match hook {
                AddonHook::Banner => plugin.banner(ctx).await,
                AddonHook::Footer => plugin.footer(ctx).await,
                AddonHook::Intro => plugin.intro(ctx).await,
                AddonHook::Outro => plugin.outro(ctx).await,
            };
            match result {
                Ok(Some(text)) if !text.is_empty() => parts.push(text),
                Ok(_) => {}
                Err(source) => return Err(hook_error(plugin.as_ref(), hook.as_str(), source)),
            }
        }
        Ok(parts)
    }

    /// Run render_chunk hooks as a chain
    pub async fn render_chunk(
        &self,
        code: String,
        map: Option<String>,
        chunk: &RenderedChunk,
        ctx: &PluginContext,
    ) -> crate::error::Result<(String, Option<String>)> {
        let mut current_code = code;
        let mut current_map = map;

        for plugin in &self.plugins {
            let result = plugin
                .render_chunk(&current_code, current_map.as_deref(), chunk, ctx)
                .await
                .map_err(|source| hook_error(plugin.as_ref(), "render_chunk", source))?;

            match result {
                RenderChunkResult::Skip => continue,
                RenderChunkResult::Replaced { code, map } => {
                    debug!("{} replaced {}", plugin.name(), chunk.file_name);
                    current_code = code;
                    current_map = map;
                }
            }
        }

        Ok((current_code, current_map))
    }

    /// Run generate_bundle hooks one plugin at a time. Assets a plugin emits
    /// through the context are moved into `bundle` before the next plugin runs.
    pub async fn generate_bundle(
        &self,
        output: &OutputOptions,
        bundle: &mut OutputBundle,
        is_write: bool,
        ctx: &PluginContext,
    ) -> crate::error::Result<()> {
        for plugin in &self.plugins {
            plugin
                .generate_bundle(output, bundle, is_write, ctx)
                .await
                .map_err(|source| hook_error(plugin.as_ref(), "generate_bundle", source))?;
            bundle.absorb(ctx.take_bundle());
        }
        Ok(())
    }

    /// Run render_error hooks concurrently; their failures are only logged
    pub async fn render_error(&self, error: &BundleError, ctx: &PluginContext) {
        let results = join_all(self.plugins.iter().map(|plugin| plugin.render_error(error, ctx))).await;

        for (plugin, result) in self.plugins.iter().zip(results) {
            if let Err(e) = result {
                warn!("Plugin {} failed in render_error: {}", plugin.name(), e);
            }
        }
    }
}

/// Create a built-in plugin from its configuration entry
pub fn from_config(config: &PluginConfig) -> Result<Arc<dyn Plugin>> {
    let option = |key: &str| {
        config
            .options
            .as_ref()
            .and_then(|options| options.get(key))
            .and_then(|value| value.as_str())
            .map(String::from)
    };

    match config.name.as_str() {
        "manifest" => Ok(Arc::new(ManifestPlugin {
            file_name: option("file_name").unwrap_or_else(|| "manifest.json".to_string()),
        })),
        "banner" => match option("text") {
            Some(text) => Ok(Arc::new(BannerPlugin { text })),
            None => bail!("plugin \"banner\" requires a \"text\" option"),
        },
        other => bail!("Unknown plugin: {}", other),
    }
}

// Built-in plugins

/// Manifest plugin - emits a JSON map from entry names to chunk files
pub struct ManifestPlugin {
    pub file_name: String,
}

impl Default for ManifestPlugin {
    fn default() -> Self {
        Self {
            file_name: "manifest.json".to_string(),
        }
    }
}

#[async_trait]
impl Plugin for ManifestPlugin {
    fn name(&self) -> &str {
        "manifest"
    }

    async fn generate_bundle(
        &self,
        _output: &OutputOptions,
        bundle: &mut OutputBundle,
        _is_write: bool,
        ctx: &PluginContext,
    ) -> Result<()> {
        let manifest: BTreeMap<&str, &str> = bundle
            .iter()
            .filter_map(|(file_name, file)| file.as_chunk().map(|chunk| (file_name, chunk)))
            .filter(|(_, chunk)| chunk.info.is_entry)
            .map(|(file_name, chunk)| (chunk.info.name.as_str(), file_name))
            .collect();

        let json = serde_json::to_string_pretty(&manifest)?;
        ctx.emit_asset(EmittedAsset {
            name: Some(self.file_name.clone()),
            file_name: Some(self.file_name.clone()),
            source: Some(json.into()),
        })?;

        Ok(())
    }
}

/// Banner plugin - prepends fixed text to every chunk
pub struct BannerPlugin {
    pub text: String,
}

#[async_trait]
impl Plugin for BannerPlugin {
    fn name(&self) -> &str {
        "banner"
    }

    async fn banner(&self, _ctx: &PluginContext) -> Result<Option<String>> {
        Ok(Some(self.text.clone()))
    }
}
