//! End-to-end generation tests over in-memory module graphs

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use pretty_assertions::assert_eq;

use chunkyard::bundler::{
    Bundler, InputOptions, ManualChunks, Module, ModuleGraph, OutputBundle, OutputChunk, OutputFile, OutputFormat,
    OutputOptions, RenderedChunk, SourceMapMode,
};
use chunkyard::plugins::{Plugin, PluginContext, RenderChunkResult};
use chunkyard::{BundleError, ModuleLoader, WarningCode};

/// Records the hooks it sees
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl Plugin for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn render_start(&self, _output: &OutputOptions, _input: &InputOptions, _ctx: &PluginContext) -> anyhow::Result<()> {
        self.events.lock().push("render_start".to_string());
        Ok(())
    }

    async fn render_chunk(
        &self,
        _code: &str,
        _map: Option<&str>,
        chunk: &RenderedChunk,
        _ctx: &PluginContext,
    ) -> anyhow::Result<RenderChunkResult> {
        self.events.lock().push(format!("render_chunk {}", chunk.file_name));
        Ok(RenderChunkResult::Skip)
    }

    async fn generate_bundle(
        &self,
        _output: &OutputOptions,
        _bundle: &mut OutputBundle,
        is_write: bool,
        _ctx: &PluginContext,
    ) -> anyhow::Result<()> {
        self.events.lock().push(format!("generate_bundle {}", is_write));
        Ok(())
    }

    async fn render_error(&self, _error: &BundleError, _ctx: &PluginContext) -> anyhow::Result<()> {
        self.events.lock().push("render_error".to_string());
        Ok(())
    }
}

/// Two entries sharing one module
fn two_entry_graph() -> ModuleGraph {
    let mut graph = ModuleGraph::new();
    let main = graph.add_module(Module::new("src/main.js", "run(shared);\n"));
    let admin = graph.add_module(Module::new("src/admin.js", "audit(shared);\n"));
    let shared = graph.add_module(Module::new("src/shared.js", "const shared = 1;\n").with_export("shared"));
    graph.add_import(main, shared, "shared", "shared");
    graph.add_import(admin, shared, "shared", "shared");
    graph.mark_entry(main, Some("main".to_string()));
    graph.mark_entry(admin, Some("admin".to_string()));
    graph
}

fn table(entries: &[(&str, &[&str])]) -> ManualChunks {
    ManualChunks::Table(
        entries
            .iter()
            .map(|(alias, specs)| (alias.to_string(), specs.iter().map(|s| s.to_string()).collect()))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn chunks(files: &indexmap::IndexMap<String, OutputFile>) -> Vec<&OutputChunk> {
    files.values().filter_map(OutputFile::as_chunk).collect()
}

fn chunk_with_module<'a>(files: &'a indexmap::IndexMap<String, OutputFile>, module: &str) -> &'a OutputChunk {
    chunks(files)
        .into_iter()
        .find(|c| c.info.module_ids.iter().any(|m| m == module))
        .unwrap()
}

#[tokio::test]
async fn test_conflicting_aliases_fail_regardless_of_order() {
    for entries in [
        [("a", &["src/shared.js"][..]), ("b", &["src/shared.js"][..])],
        [("b", &["src/shared.js"][..]), ("a", &["src/shared.js"][..])],
    ] {
        let input = InputOptions {
            input: Vec::new(),
            manual_chunks: Some(table(&entries)),
        };
        let recorder = Arc::new(Recorder::default());
        let mut bundler = Bundler::from_graph(two_entry_graph(), input);
        bundler.register_plugin(recorder.clone());

        let err = bundler.generate(&OutputOptions::default(), false).await.unwrap_err();
        match err {
            BundleError::ManualChunkConflict { module, existing, requested } => {
                assert_eq!(module, "src/shared.js");
                assert_eq!(existing, "a");
                assert_eq!(requested, "b");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(recorder.events(), vec!["render_start", "render_error"]);
    }
}

#[tokio::test]
async fn test_entry_identities_come_first() {
    let output = Bundler::from_graph(two_entry_graph(), InputOptions::default())
        .generate(&OutputOptions::default(), false)
        .await
        .unwrap();

    let names: Vec<&str> = output.files.keys().map(String::as_str).collect();
    assert_eq!(&names[..2], &["main.js", "admin.js"]);
    assert!(names[2].starts_with("shared-") && names[2].ends_with(".js"));

    let infos: Vec<bool> = chunks(&output.files).iter().map(|c| c.info.is_entry).collect();
    assert_eq!(infos, vec![true, true, false]);
}

#[tokio::test]
async fn test_iife_with_several_chunks_fails_before_rendering() {
    let recorder = Arc::new(Recorder::default());
    let mut bundler = Bundler::from_graph(two_entry_graph(), InputOptions::default());
    bundler.register_plugin(recorder.clone());

    let options = OutputOptions {
        format: OutputFormat::Iife,
        ..OutputOptions::default()
    };
    let err = bundler.generate(&options, false).await.unwrap_err();

    assert!(matches!(err, BundleError::InvalidOption { option: "format", .. }));
    assert_eq!(recorder.events(), vec!["render_start", "render_error"]);
}

#[tokio::test]
async fn test_hook_order_of_a_successful_generation() {
    let mut graph = ModuleGraph::new();
    let main = graph.add_module(Module::new("main.js", "go();\n"));
    graph.mark_entry(main, Some("main".to_string()));

    let recorder = Arc::new(Recorder::default());
    let mut bundler = Bundler::from_graph(graph, InputOptions::default());
    bundler.register_plugin(recorder.clone());

    bundler.generate(&OutputOptions::default(), true).await.unwrap();
    assert_eq!(
        recorder.events(),
        vec!["render_start", "render_chunk main.js", "generate_bundle true"]
    );
}

#[tokio::test]
async fn test_preserve_modules_emits_one_chunk_per_module() {
    let mut graph = ModuleGraph::new();
    let main = graph.add_module(Module::new("src/main.js", "a(); b();\n"));
    let a = graph.add_module(Module::new("src/lib/a.js", "function a() {}\n").with_export("a"));
    let b = graph.add_module(Module::new("src/lib/b.js", "function b() {}\n").with_export("b"));
    graph.add_import(main, a, "a", "a");
    graph.add_import(main, b, "b", "b");
    graph.mark_entry(main, Some("main".to_string()));

    let options = OutputOptions {
        preserve_modules: true,
        ..OutputOptions::default()
    };
    let output = Bundler::from_graph(graph, InputOptions::default())
        .generate(&options, false)
        .await
        .unwrap();

    let names: Vec<&str> = output.files.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["main.js", "lib/a.js", "lib/b.js"]);
    for chunk in chunks(&output.files) {
        assert_eq!(chunk.info.module_ids.len(), 1);
    }

    let main = output.get("main.js").and_then(OutputFile::as_chunk).unwrap();
    assert!(main.code.starts_with("import { a } from './lib/a.js';\nimport { b } from './lib/b.js';\n"));
}

#[tokio::test]
async fn test_aliased_chunk_imports_instead_of_duplicating() {
    let mut graph = ModuleGraph::new();
    let main = graph.add_module(Module::new("main.mod", "use(y);\n"));
    let y = graph.add_module(Module::new("y.mod", "const y = x + 1;\n").with_export("y"));
    let x = graph.add_module(Module::new("x.mod", "const x = 1;\n").with_export("x"));
    graph.add_import(main, y, "y", "y");
    graph.add_import(y, x, "x", "x");
    graph.mark_entry(main, Some("main".to_string()));

    let input = InputOptions {
        input: Vec::new(),
        manual_chunks: Some(table(&[("a", &["x.mod"][..]), ("b", &["y.mod"][..])])),
    };
    let output = Bundler::from_graph(graph, input)
        .generate(&OutputOptions::default(), false)
        .await
        .unwrap();

    let a = chunk_with_module(&output.files, "x.mod");
    let b = chunk_with_module(&output.files, "y.mod");
    assert_eq!(a.info.name, "a");
    assert_eq!(b.info.name, "b");
    assert_eq!(a.info.module_ids, vec!["x.mod"]);
    assert_eq!(b.info.module_ids, vec!["y.mod"]);
    assert_eq!(b.info.imports, vec![a.info.file_name.clone()]);

    let holding_x = chunks(&output.files)
        .iter()
        .filter(|c| c.info.module_ids.iter().any(|m| m == "x.mod"))
        .count();
    assert_eq!(holding_x, 1);
    assert!(b.code.starts_with(&format!("import {{ x }} from './{}';\n", a.info.file_name)));
}

#[tokio::test]
async fn test_facade_only_reexports_its_target() {
    let mut graph = ModuleGraph::new();
    let main = graph.add_module(Module::new("main.js", "function run() {}\n").with_export("run"));
    graph.mark_entry(main, Some("main".to_string()));

    let input = InputOptions {
        input: Vec::new(),
        manual_chunks: Some(table(&[("core", &["main.js"][..])])),
    };
    let output = Bundler::from_graph(graph, input)
        .generate(&OutputOptions::default(), false)
        .await
        .unwrap();

    let facade = output.get("main.js").and_then(OutputFile::as_chunk).unwrap();
    assert!(facade.info.is_facade);
    assert!(facade.info.is_entry);
    assert!(facade.info.module_ids.is_empty());

    let target = &facade.info.imports[0];
    assert!(target.starts_with("core-"));
    assert_eq!(
        facade.code,
        format!("import {{ run }} from './{}';\nexport {{ run }};\n", target)
    );

    let core = output.get(target).and_then(OutputFile::as_chunk).unwrap();
    assert!(core.code.ends_with("export { run };\n"));
}

#[tokio::test]
async fn test_generation_is_deterministic() {
    let mut graph = two_entry_graph();
    let lazy = graph.add_module(Module::new("src/lazy.js", "const lazy = 1;\n").with_export("lazy"));
    let main = graph.get_module_id("src/main.js").unwrap();
    graph.add_dynamic_import(main, "./lazy.js", lazy);

    let mut runs = Vec::new();
    for _ in 0..3 {
        let output = Bundler::from_graph(graph.clone(), InputOptions::default())
            .generate(&OutputOptions::default(), false)
            .await
            .unwrap();
        let snapshot: Vec<(String, Vec<String>, String)> = chunks(&output.files)
            .into_iter()
            .map(|c| (c.info.file_name.clone(), c.info.module_ids.clone(), c.code.clone()))
            .collect();
        runs.push(snapshot);
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[tokio::test]
async fn test_dynamic_imports_point_at_their_chunk() {
    let mut graph = ModuleGraph::new();
    let main = graph.add_module(Module::new("main.js", "const load = () => import('./lazy.js');\n"));
    let lazy = graph.add_module(Module::new("lazy.js", "const value = 42;\n").with_export("value"));
    graph.add_dynamic_import(main, "./lazy.js", lazy);
    graph.mark_entry(main, Some("main".to_string()));

    let output = Bundler::from_graph(graph.clone(), InputOptions::default())
        .generate(&OutputOptions::default(), false)
        .await
        .unwrap();

    let lazy_chunk = chunk_with_module(&output.files, "lazy.js");
    assert!(lazy_chunk.info.is_dynamic_entry);
    assert!(!lazy_chunk.info.is_entry);
    assert!(lazy_chunk.code.ends_with("export { value };\n"));

    let main_chunk = output.get("main.js").and_then(OutputFile::as_chunk).unwrap();
    assert_eq!(main_chunk.info.dynamic_imports, vec![lazy_chunk.info.file_name.clone()]);
    assert!(main_chunk
        .code
        .contains(&format!("const load = () => import('./{}');", lazy_chunk.info.file_name)));

    let options = OutputOptions {
        inline_dynamic_imports: true,
        ..OutputOptions::default()
    };
    let output = Bundler::from_graph(graph, InputOptions::default())
        .generate(&options, false)
        .await
        .unwrap();

    assert_eq!(output.files.len(), 1);
    let chunk = output.get("main.js").and_then(OutputFile::as_chunk).unwrap();
    assert!(chunk.code.contains(
        "Promise.resolve().then(function () { return Object.freeze({ __proto__: null, get value () { return value; } }); })"
    ));
}

#[tokio::test]
async fn test_render_chunk_plugins_chain() {
    struct Append(&'static str);

    #[async_trait]
    impl Plugin for Append {
        fn name(&self) -> &str {
            "append"
        }

        async fn render_chunk(
            &self,
            code: &str,
            _map: Option<&str>,
            _chunk: &RenderedChunk,
            _ctx: &PluginContext,
        ) -> anyhow::Result<RenderChunkResult> {
            Ok(RenderChunkResult::Replaced {
                code: format!("{}{}\n", code, self.0),
                map: None,
            })
        }
    }

    let mut bundler = Bundler::from_graph(two_entry_graph(), InputOptions::default());
    bundler.register_plugin(Arc::new(Append("// one")));
    bundler.register_plugin(Arc::new(Append("// two")));

    let output = bundler.generate(&OutputOptions::default(), false).await.unwrap();
    for chunk in chunks(&output.files) {
        assert!(chunk.code.ends_with("// one\n// two\n"), "{}", chunk.code);
    }
}

#[tokio::test]
async fn test_generate_bundle_mutations_and_raw_entries() {
    struct Rewrite;

    #[async_trait]
    impl Plugin for Rewrite {
        fn name(&self) -> &str {
            "rewrite"
        }

        async fn generate_bundle(
            &self,
            _output: &OutputOptions,
            bundle: &mut OutputBundle,
            _is_write: bool,
            _ctx: &PluginContext,
        ) -> anyhow::Result<()> {
            bundle.remove("admin.js");
            if let Some(chunk) = bundle.get_mut("main.js").and_then(OutputFile::as_chunk_mut) {
                chunk.code.push_str("// stamped\n");
            }
            bundle.insert("LICENSE.txt", "MIT");
            Ok(())
        }
    }

    let mut bundler = Bundler::from_graph(two_entry_graph(), InputOptions::default());
    bundler.register_plugin(Arc::new(Rewrite));

    let output = bundler.generate(&OutputOptions::default(), false).await.unwrap();

    assert!(output.get("admin.js").is_none());
    let main = output.get("main.js").and_then(OutputFile::as_chunk).unwrap();
    assert!(main.code.ends_with("// stamped\n"));

    let license = output.get("LICENSE.txt").and_then(OutputFile::as_asset).unwrap();
    assert_eq!(license.source.as_bytes(), b"MIT");
    assert_eq!(output.warnings.len(), 1);
    assert_eq!(output.warnings[0].code, WarningCode::DeprecatedRawEntry);
}

#[tokio::test]
async fn test_inline_sourcemap_and_syntax_check() {
    let mut graph = ModuleGraph::new();
    let main = graph.add_module(Module::new("main.js", "function broken( {\n"));
    graph.mark_entry(main, Some("main".to_string()));

    let options = OutputOptions {
        sourcemap: SourceMapMode::Inline,
        validate: true,
        ..OutputOptions::default()
    };
    let output = Bundler::from_graph(graph, InputOptions::default())
        .generate(&options, false)
        .await
        .unwrap();

    let chunk = output.get("main.js").and_then(OutputFile::as_chunk).unwrap();
    assert!(chunk
        .code
        .contains("//# sourceMappingURL=data:application/json;charset=utf-8;base64,"));
    assert!(chunk.map.is_some());
    assert_eq!(output.files.len(), 1);

    let codes: Vec<WarningCode> = output.warnings.iter().map(|w| w.code).collect();
    assert_eq!(codes, vec![WarningCode::InvalidChunkSyntax]);
}

#[tokio::test]
async fn test_manual_chunk_loads_unreached_module() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.js"), "console.log('main');\n").unwrap();
    std::fs::create_dir_all(dir.path().join("vendor")).unwrap();
    std::fs::write(dir.path().join("vendor/polyfill.js"), "globalThis.ready = true;\n").unwrap();

    let graph = Arc::new(RwLock::new(ModuleGraph::new()));
    let loader = Arc::new(ModuleLoader::new(dir.path(), graph.clone()));
    let entries = vec![("main".to_string(), dir.path().join("main.js"))];
    loader.load_entries(&entries).await.unwrap();

    let input = InputOptions {
        input: entries,
        manual_chunks: Some(table(&[("polyfills", &["vendor/polyfill.js"][..])])),
    };
    let output = Bundler::new(graph, input)
        .with_loader(loader)
        .generate(&OutputOptions::default(), false)
        .await
        .unwrap();

    let polyfills = chunk_with_module(&output.files, "vendor/polyfill.js");
    assert_eq!(polyfills.info.name, "polyfills");
    assert!(polyfills.code.contains("globalThis.ready = true;"));
}

#[tokio::test]
async fn test_umd_with_several_chunks_fails_before_rendering() {
    let recorder = Arc::new(Recorder::default());
    let mut bundler = Bundler::from_graph(two_entry_graph(), InputOptions::default());
    bundler.register_plugin(recorder.clone());

    let options = OutputOptions {
        format: OutputFormat::Umd,
        name: Some("lib".to_string()),
        ..OutputOptions::default()
    };
    let err = bundler.generate(&options, false).await.unwrap_err();

    assert!(matches!(err, BundleError::InvalidOption { option: "format", .. }));
    assert_eq!(recorder.events(), vec!["render_start", "render_error"]);
}

#[tokio::test]
async fn test_single_file_with_several_chunks_fails() {
    // Both entries end up in one chunk, so the second needs a facade chunk
    let recorder = Arc::new(Recorder::default());
    let mut bundler = Bundler::from_graph(two_entry_graph(), InputOptions::default());
    bundler.register_plugin(recorder.clone());

    let options = OutputOptions {
        file: Some("dist/bundle.js".into()),
        ..OutputOptions::default()
    };
    let err = bundler.generate(&options, false).await.unwrap_err();

    assert!(matches!(err, BundleError::InvalidOption { option: "file", .. }));
    assert_eq!(recorder.events(), vec!["render_start", "render_error"]);
}

#[tokio::test]
async fn test_sourcemap_file_with_several_chunks_fails() {
    let recorder = Arc::new(Recorder::default());
    let mut bundler = Bundler::from_graph(two_entry_graph(), InputOptions::default());
    bundler.register_plugin(recorder.clone());

    let options = OutputOptions {
        sourcemap: SourceMapMode::File,
        sourcemap_file: Some("dist/bundle.js.map".into()),
        ..OutputOptions::default()
    };
    let err = bundler.generate(&options, false).await.unwrap_err();

    assert!(matches!(err, BundleError::InvalidOption { option: "sourcemap_file", .. }));
    assert_eq!(recorder.events(), vec!["render_start", "render_error"]);
}

#[tokio::test]
async fn test_single_file_with_manual_chunks_is_rejected() {
    let recorder = Arc::new(Recorder::default());
    let input = InputOptions {
        input: Vec::new(),
        manual_chunks: Some(table(&[("vendor", &["src/shared.js"][..])])),
    };
    let mut bundler = Bundler::from_graph(two_entry_graph(), input);
    bundler.register_plugin(recorder.clone());

    let options = OutputOptions {
        file: Some("out/bundle.js".into()),
        ..OutputOptions::default()
    };
    let err = bundler.generate(&options, false).await.unwrap_err();

    assert!(matches!(err, BundleError::InvalidOption { option: "manual_chunks", .. }));
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn test_classifier_chunks_follow_alias_order() {
    let mut graph = ModuleGraph::new();
    let main = graph.add_module(Module::new("main.js", "use(a, b);\n"));
    let a = graph.add_module(Module::new("a.js", "const a = 1;\n").with_export("a"));
    let b = graph.add_module(Module::new("b.js", "const b = 2;\n").with_export("b"));
    graph.add_import(main, a, "a", "a");
    graph.add_import(main, b, "b", "b");
    graph.mark_entry(main, Some("main".to_string()));

    // Module id order (a.js, b.js) is the reverse of alias order (alpha, zeta)
    let input = InputOptions {
        input: Vec::new(),
        manual_chunks: Some(ManualChunks::classifier(|id, _query| match id {
            "a.js" => Some("zeta".to_string()),
            "b.js" => Some("alpha".to_string()),
            _ => None,
        })),
    };
    let output = Bundler::from_graph(graph, input)
        .generate(&OutputOptions::default(), false)
        .await
        .unwrap();

    let names: Vec<&str> = output.files.keys().map(String::as_str).collect();
    assert_eq!(names.len(), 3);
    assert_eq!(names[0], "main.js");
    assert!(names[1].starts_with("alpha-"), "{names:?}");
    assert!(names[2].starts_with("zeta-"), "{names:?}");

    assert_eq!(chunk_with_module(&output.files, "b.js").info.name, "alpha");
    assert_eq!(chunk_with_module(&output.files, "a.js").info.name, "zeta");
}

#[tokio::test]
async fn test_alias_chain_has_no_circular_chunk_imports() {
    // main -> y -> x -> z with a = [y] and b = [x]
    let mut graph = ModuleGraph::new();
    let main = graph.add_module(Module::new("main.js", "use(y);\n"));
    let y = graph.add_module(Module::new("y.js", "const y = x;\n").with_export("y"));
    let x = graph.add_module(Module::new("x.js", "const x = z;\n").with_export("x"));
    let z = graph.add_module(Module::new("z.js", "const z = 1;\n").with_export("z"));
    graph.add_import(main, y, "y", "y");
    graph.add_import(y, x, "x", "x");
    graph.add_import(x, z, "z", "z");
    graph.mark_entry(main, Some("main".to_string()));

    let input = InputOptions {
        input: Vec::new(),
        manual_chunks: Some(table(&[("a", &["y.js"][..]), ("b", &["x.js"][..])])),
    };
    let output = Bundler::from_graph(graph, input)
        .generate(&OutputOptions::default(), false)
        .await
        .unwrap();

    let a = chunk_with_module(&output.files, "y.js");
    let b = chunk_with_module(&output.files, "x.js");
    assert_eq!(a.info.module_ids, vec!["y.js"]);
    assert_eq!(b.info.module_ids, vec!["z.js", "x.js"]);
    assert_eq!(a.info.imports, vec![b.info.file_name.clone()]);
    assert!(b.info.imports.is_empty());
}
