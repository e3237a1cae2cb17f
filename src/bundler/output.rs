//! The output bundle: file name → generated artifact
//!
//! Names are claimed with a placeholder before their artifact exists, so the
//! identity pass and plugins emitting assets cannot hand out the same name
//! twice. Placeholders are invisible through the public accessors and must
//! all be filled before the bundle is finalized.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use super::naming::render_pattern;
use crate::error::{BundleError, Result, Warning, WarningCode};
use crate::utils::{file_stem, hash_content};

/// Raw contents of an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AssetSource {
    Text(String),
    Binary(Vec<u8>),
}

impl AssetSource {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AssetSource::Text(text) => text.as_bytes(),
            AssetSource::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for AssetSource {
    fn from(text: String) -> Self {
        AssetSource::Text(text)
    }
}

impl From<&str> for AssetSource {
    fn from(text: &str) -> Self {
        AssetSource::Text(text.to_string())
    }
}

impl From<Vec<u8>> for AssetSource {
    fn from(bytes: Vec<u8>) -> Self {
        AssetSource::Binary(bytes)
    }
}

/// Metadata describing a rendered chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedChunk {
    pub file_name: String,
    pub name: String,
    pub is_entry: bool,
    pub is_dynamic_entry: bool,
    pub is_facade: bool,
    pub facade_module_id: Option<String>,
    pub module_ids: Vec<String>,
    pub exports: Vec<String>,
    /// File names of statically imported chunks
    pub imports: Vec<String>,
    /// File names of dynamically imported chunks
    pub dynamic_imports: Vec<String>,
}

/// A generated chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputChunk {
    pub code: String,
    /// Source map as JSON
    pub map: Option<String>,
    #[serde(flatten)]
    pub info: RenderedChunk,
}

/// A generated or emitted asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputAsset {
    pub file_name: String,
    pub name: Option<String>,
    pub source: AssetSource,
}

/// An artifact in the output bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputFile {
    Chunk(OutputChunk),
    Asset(OutputAsset),
}

impl OutputFile {
    pub fn file_name(&self) -> &str {
        match self {
            OutputFile::Chunk(chunk) => &chunk.info.file_name,
            OutputFile::Asset(asset) => &asset.file_name,
        }
    }

    /// Bytes written to disk for this artifact
    pub fn contents(&self) -> &[u8] {
        match self {
            OutputFile::Chunk(chunk) => chunk.code.as_bytes(),
            OutputFile::Asset(asset) => asset.source.as_bytes(),
        }
    }

    pub fn as_chunk(&self) -> Option<&OutputChunk> {
        match self {
            OutputFile::Chunk(chunk) => Some(chunk),
            OutputFile::Asset(_) => None,
        }
    }

    pub fn as_chunk_mut(&mut self) -> Option<&mut OutputChunk> {
        match self {
            OutputFile::Chunk(chunk) => Some(chunk),
            OutputFile::Asset(_) => None,
        }
    }

    pub fn as_asset(&self) -> Option<&OutputAsset> {
        match self {
            OutputFile::Asset(asset) => Some(asset),
            OutputFile::Chunk(_) => None,
        }
    }

    fn rename(&mut self, file_name: &str) {
        match self {
            OutputFile::Chunk(chunk) => chunk.info.file_name = file_name.to_string(),
            OutputFile::Asset(asset) => asset.file_name = file_name.to_string(),
        }
    }
}

/// A value plugins may write into the bundle
#[derive(Debug, Clone)]
pub enum BundleEntry {
    File(OutputFile),
    /// Untyped contents; stored as an asset with a deprecation warning
    Raw(AssetSource),
}

impl From<OutputFile> for BundleEntry {
    fn from(file: OutputFile) -> Self {
        BundleEntry::File(file)
    }
}

impl From<OutputChunk> for BundleEntry {
    fn from(chunk: OutputChunk) -> Self {
        BundleEntry::File(OutputFile::Chunk(chunk))
    }
}

impl From<OutputAsset> for BundleEntry {
    fn from(asset: OutputAsset) -> Self {
        BundleEntry::File(OutputFile::Asset(asset))
    }
}

impl From<AssetSource> for BundleEntry {
    fn from(source: AssetSource) -> Self {
        BundleEntry::Raw(source)
    }
}

impl From<String> for BundleEntry {
    fn from(text: String) -> Self {
        BundleEntry::Raw(AssetSource::Text(text))
    }
}

impl From<&str> for BundleEntry {
    fn from(text: &str) -> Self {
        BundleEntry::Raw(AssetSource::Text(text.to_string()))
    }
}

/// An asset a plugin asks to emit
#[derive(Debug, Clone, Default)]
pub struct EmittedAsset {
    /// Name used for `[name]` and `[ext]` in the asset pattern
    pub name: Option<String>,
    /// Exact output file name; bypasses the pattern
    pub file_name: Option<String>,
    pub source: Option<AssetSource>,
}

#[derive(Debug, Clone)]
enum Slot {
    Placeholder,
    Ready(OutputFile),
}

/// Output file name → artifact for one generation
#[derive(Debug, Default)]
pub struct OutputBundle {
    entries: IndexMap<String, Slot>,
    /// Lowercased keys of `entries`
    taken: HashSet<String>,
    warnings: Vec<Warning>,
}

impl OutputBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name`, or the first `name2`, `name3`, ... that no entry uses
    /// (compared case-insensitively)
    pub fn make_unique(&self, name: &str) -> String {
        if !self.is_taken(name) {
            return name.to_string();
        }

        let (stem, ext) = split_extension(name);
        let mut counter = 2;
        loop {
            let candidate = format!("{}{}{}", stem, counter, ext);
            if !self.is_taken(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(&name.to_lowercase())
    }

    fn put(&mut self, file_name: String, slot: Slot) {
        self.taken.insert(file_name.to_lowercase());
        self.entries.insert(file_name, slot);
    }

    /// Claim a unique name derived from `name` and return it
    pub fn reserve(&mut self, name: &str) -> String {
        let unique = self.make_unique(name);
        self.put(unique.clone(), Slot::Placeholder);
        unique
    }

    /// Whether a name is claimed, by a placeholder or an artifact
    pub fn is_reserved(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Store an artifact under `file_name`, filling a placeholder if one
    /// was reserved there
    pub fn insert(&mut self, file_name: impl Into<String>, entry: impl Into<BundleEntry>) {
        let file_name = file_name.into();
        let file = match entry.into() {
            BundleEntry::File(file) => file,
            BundleEntry::Raw(source) => {
                self.warn(Warning::new(
                    WarningCode::DeprecatedRawEntry,
                    format!(
                        "A plugin is directly adding \"{}\" to the bundle without an artifact kind; it is stored as an asset",
                        file_name
                    ),
                ));
                OutputFile::Asset(OutputAsset {
                    file_name: file_name.clone(),
                    name: None,
                    source,
                })
            }
        };
        self.put(file_name, Slot::Ready(file));
    }

    /// Store an artifact under a unique name derived from `file_name`,
    /// letting `build` see the final name. Returns the name used.
    pub fn insert_unique<F>(&mut self, file_name: &str, build: F) -> String
    where
        F: FnOnce(&str) -> OutputFile,
    {
        let unique = self.make_unique(file_name);
        let file = build(&unique);
        self.put(unique.clone(), Slot::Ready(file));
        unique
    }

    pub fn get(&self, file_name: &str) -> Option<&OutputFile> {
        match self.entries.get(file_name)? {
            Slot::Ready(file) => Some(file),
            Slot::Placeholder => None,
        }
    }

    pub fn get_mut(&mut self, file_name: &str) -> Option<&mut OutputFile> {
        match self.entries.get_mut(file_name)? {
            Slot::Ready(file) => Some(file),
            Slot::Placeholder => None,
        }
    }

    /// Whether an artifact (not just a placeholder) exists under `file_name`
    pub fn contains_key(&self, file_name: &str) -> bool {
        self.get(file_name).is_some()
    }

    pub fn remove(&mut self, file_name: &str) -> Option<OutputFile> {
        match self.entries.get(file_name)? {
            Slot::Placeholder => None,
            Slot::Ready(_) => match self.entries.shift_remove(file_name) {
                Some(Slot::Ready(file)) => {
                    let lower = file_name.to_lowercase();
                    if !self.entries.keys().any(|key| key.to_lowercase() == lower) {
                        self.taken.remove(&lower);
                    }
                    Some(file)
                }
                _ => None,
            },
        }
    }

    /// Artifacts in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputFile)> {
        self.entries.iter().filter_map(|(name, slot)| match slot {
            Slot::Ready(file) => Some((name.as_str(), file)),
            Slot::Placeholder => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut OutputFile)> {
        self.entries.iter_mut().filter_map(|(name, slot)| match slot {
            Slot::Ready(file) => Some((name.as_str(), file)),
            Slot::Placeholder => None,
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Emit an asset, naming it through `pattern` unless it carries an
    /// exact file name. An exact name that is already taken is an error.
    /// Returns the final file name.
    pub fn emit_asset(&mut self, asset: EmittedAsset, pattern: &str) -> Result<String> {
        let source = asset.source.unwrap_or_else(|| AssetSource::Text(String::new()));

        let file_name = match asset.file_name {
            Some(file_name) if self.is_taken(&file_name) => return Err(BundleError::FileNameConflict(file_name)),
            Some(file_name) => file_name,
            None => {
                let name = asset.name.clone().unwrap_or_else(|| "asset".to_string());
                let extname = split_extension(&name).1.to_string();
                let hash = hash_content(source.as_bytes());
                let requested = render_pattern(pattern, "asset_file_names", |placeholder| match placeholder {
                    "name" => Some(file_stem(&name).to_string()),
                    "hash" => Some(hash[..8].to_string()),
                    "ext" => Some(extname.trim_start_matches('.').to_string()),
                    "extname" => Some(extname.clone()),
                    _ => None,
                })?;
                self.make_unique(&requested)
            }
        };

        self.put(
            file_name.clone(),
            Slot::Ready(OutputFile::Asset(OutputAsset {
                file_name: file_name.clone(),
                name: asset.name,
                source,
            })),
        );
        Ok(file_name)
    }

    /// Move the artifacts of `other` into this bundle, renaming any whose
    /// name is already taken
    pub fn absorb(&mut self, other: OutputBundle) {
        for (name, slot) in other.entries {
            let Slot::Ready(mut file) = slot else {
                continue;
            };
            let unique = self.make_unique(&name);
            if unique != name {
                file.rename(&unique);
            }
            self.put(unique, Slot::Ready(file));
        }
        for warning in other.warnings {
            self.warnings.push(warning);
        }
    }

    /// Record a warning and log it
    pub fn warn(&mut self, warning: Warning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check every claimed name resolved to an artifact and unwrap them
    pub fn finalize(self) -> Result<(IndexMap<String, OutputFile>, Vec<Warning>)> {
        let mut files = IndexMap::with_capacity(self.entries.len());
        for (name, slot) in self.entries {
            match slot {
                Slot::Ready(file) => {
                    files.insert(name, file);
                }
                Slot::Placeholder => return Err(BundleError::UnresolvedPlaceholder(name)),
            }
        }
        Ok((files, self.warnings))
    }
}

/// Split `dir/name.ext` into (`dir/name`, `.ext`)
fn split_extension(name: &str) -> (&str, &str) {
    let file_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[file_start..].rfind('.') {
        Some(0) | None => (name, ""),
        Some(dot) => name.split_at(file_start + dot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn asset(name: &str, text: &str) -> OutputAsset {
        OutputAsset {
            file_name: name.to_string(),
            name: None,
            source: AssetSource::from(text),
        }
    }

    #[test]
    fn test_make_unique_is_case_insensitive() {
        let mut bundle = OutputBundle::new();
        bundle.reserve("chunk.js");

        assert_eq!(bundle.make_unique("chunk.js"), "chunk2.js");
        assert_eq!(bundle.make_unique("Chunk.js"), "Chunk2.js");
        assert_eq!(bundle.make_unique("other.js"), "other.js");

        bundle.reserve("chunk.js");
        assert_eq!(bundle.make_unique("chunk.js"), "chunk3.js");
    }

    #[test]
    fn test_placeholders_are_hidden_until_filled() {
        let mut bundle = OutputBundle::new();
        let name = bundle.reserve("main.js");

        assert!(bundle.is_reserved(&name));
        assert!(!bundle.contains_key(&name));
        assert!(bundle.get(&name).is_none());
        assert_eq!(bundle.len(), 0);

        bundle.insert(name.clone(), asset("main.js", "x"));
        assert!(bundle.contains_key(&name));
        assert_eq!(bundle.len(), 1);
    }

    #[test]
    fn test_finalize_rejects_unfilled_placeholder() {
        let mut bundle = OutputBundle::new();
        bundle.reserve("ghost.js");

        let err = bundle.finalize().unwrap_err();
        assert!(matches!(err, BundleError::UnresolvedPlaceholder(name) if name == "ghost.js"));
    }

    #[test]
    fn test_raw_entries_become_assets_with_warning() {
        let mut bundle = OutputBundle::new();
        bundle.insert("notes.txt", "hello");

        let file = bundle.get("notes.txt").unwrap();
        assert_eq!(file.as_asset().unwrap().source, AssetSource::from("hello"));
        assert_eq!(bundle.warnings().len(), 1);
        assert_eq!(bundle.warnings()[0].code, WarningCode::DeprecatedRawEntry);
    }

    #[test]
    fn test_emit_asset_uses_pattern() {
        let mut bundle = OutputBundle::new();
        let pattern = "assets/[name]-[hash][extname]";

        let first = bundle
            .emit_asset(
                EmittedAsset {
                    name: Some("style.css".to_string()),
                    source: Some(AssetSource::from("body {}")),
                    ..EmittedAsset::default()
                },
                pattern,
            )
            .unwrap();
        assert!(first.starts_with("assets/style-"));
        assert!(first.ends_with(".css"));

        // Identical content and name collide and get a counter
        let second = bundle
            .emit_asset(
                EmittedAsset {
                    name: Some("style.css".to_string()),
                    source: Some(AssetSource::from("body {}")),
                    ..EmittedAsset::default()
                },
                pattern,
            )
            .unwrap();
        assert_eq!(second, first.replace(".css", "2.css"));
    }

    #[test]
    fn test_emit_asset_rejects_unknown_placeholder() {
        let mut bundle = OutputBundle::new();
        let err = bundle
            .emit_asset(EmittedAsset::default(), "[name].[color]")
            .unwrap_err();
        assert!(matches!(err, BundleError::InvalidOption { option: "asset_file_names", .. }));
    }

    #[test]
    fn test_absorb_renames_collisions() {
        let mut bundle = OutputBundle::new();
        bundle.insert("manifest.json", asset("manifest.json", "{}"));

        let mut emitted = OutputBundle::new();
        emitted.insert("manifest.json", asset("manifest.json", "[]"));
        bundle.absorb(emitted);

        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.get("manifest2.json").unwrap().file_name(), "manifest2.json");
    }

    #[test]
    fn test_remove_and_iteration_order() {
        let mut bundle = OutputBundle::new();
        bundle.insert("b.js", asset("b.js", ""));
        bundle.insert("a.js", asset("a.js", ""));
        bundle.reserve("c.js");

        assert!(bundle.remove("c.js").is_none());
        assert!(bundle.remove("b.js").is_some());

        let names: Vec<&str> = bundle.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a.js"]);
    }

    #[test]
    fn test_exact_asset_name_cannot_overwrite() {
        let mut bundle = OutputBundle::new();
        let reserved = bundle.reserve("main.js");
        bundle.insert("style.css", asset("style.css", "body {}"));

        for taken in [reserved.as_str(), "STYLE.css"] {
            let err = bundle
                .emit_asset(
                    EmittedAsset {
                        file_name: Some(taken.to_string()),
                        source: Some(AssetSource::from("x")),
                        ..EmittedAsset::default()
                    },
                    "[name][extname]",
                )
                .unwrap_err();
            assert!(matches!(err, BundleError::FileNameConflict(ref name) if name == taken));
        }
        assert!(bundle.is_reserved("main.js"));
        assert_eq!(bundle.get("style.css").unwrap().contents(), b"body {}");
    }

    #[test]
    fn test_insert_unique_avoids_existing_names() {
        let mut bundle = OutputBundle::new();
        bundle.reserve("main.js.map");

        let name = bundle.insert_unique("main.js.map", |name| OutputFile::Asset(asset(name, "{}")));

        assert_eq!(name, "main.js2.map");
        assert_eq!(bundle.get(&name).unwrap().file_name(), "main.js2.map");
        assert!(bundle.is_reserved("main.js.map"));
    }

    #[test]
    fn test_removed_names_can_be_reused() {
        let mut bundle = OutputBundle::new();
        bundle.insert("a.js", asset("a.js", ""));
        bundle.remove("a.js");

        assert_eq!(bundle.make_unique("A.js"), "A.js");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("chunk.js"), ("chunk", ".js"));
        assert_eq!(split_extension("nested.dir/chunk"), ("nested.dir/chunk", ""));
        assert_eq!(split_extension("a/b.min.js"), ("a/b.min", ".js"));
    }
}
