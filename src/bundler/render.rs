//! Chunk rendering: module concatenation and output format wrappers

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::chunk::{ChunkId, PreRendered, Segment};
use super::graph::{ModuleGraph, ModuleId};
use super::link::ChunkGraph;
use super::options::OutputFormat;
use crate::utils::make_legal_identifier;

/// `import('specifier')` with a string literal argument
static DYNAMIC_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s*\(\s*['"`]([^'"`]+)['"`]\s*\)"#).unwrap());

static IMPORT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"__CHUNKYARD_IMPORT_(\d+)__").unwrap());

fn import_token(module: ModuleId) -> String {
    format!("__CHUNKYARD_IMPORT_{}__", module)
}

/// Concatenate the code of a chunk's modules in execution order.
///
/// Dynamic imports are replaced by tokens that [`resolve_dynamic_imports`]
/// rewrites once every chunk has its identity.
pub fn pre_render(chunks: &ChunkGraph, graph: &ModuleGraph, id: ChunkId) -> PreRendered {
    let chunk = &chunks.chunks[id];
    let mut body = String::new();
    let mut segments = Vec::with_capacity(chunk.len());
    let mut line = 0u32;

    for &module_id in chunk.modules() {
        let module = graph.module(module_id);

        let mut prelude = format!("// {}\n", module.id);
        for alias in chunk.local_aliases.iter().filter(|a| a.importer == module_id) {
            prelude.push_str(&format!("const {} = {};\n", alias.local, alias.binding));
        }
        for namespace in chunk.namespaces.iter().filter(|n| n.importer == module_id) {
            prelude.push_str(&format!(
                "const {} = {};\n",
                namespace.local,
                namespace_object(&namespace.properties)
            ));
        }
        line += count_lines(&prelude);
        body.push_str(&prelude);

        let code = DYNAMIC_IMPORT.replace_all(&module.code, |caps: &Captures| {
            module
                .dynamic_imports
                .iter()
                .find(|d| d.specifier == caps[1])
                .map(|d| import_token(d.target))
                .unwrap_or_else(|| caps[0].to_string())
        });

        let line_count = count_lines(&code) + u32::from(!code.is_empty() && !code.ends_with('\n'));
        segments.push(Segment {
            module: module_id,
            start_line: line,
            line_count,
        });
        body.push_str(&code);
        if !code.is_empty() && !code.ends_with('\n') {
            body.push('\n');
        }
        line += line_count;
    }

    PreRendered { body, segments }
}

/// Frozen namespace object exposing `(exported, local)` bindings as getters
pub fn namespace_object(properties: &[(String, String)]) -> String {
    let mut object = String::from("Object.freeze({ __proto__: null");
    for (exported, local) in properties {
        object.push_str(&format!(", get {} () {{ return {}; }}", property_key(exported), local));
    }
    object.push_str(" })");
    object
}

fn property_key(name: &str) -> String {
    if make_legal_identifier(name) == name {
        name.to_string()
    } else {
        format!("'{}'", name)
    }
}

fn property_access(name: &str) -> String {
    if make_legal_identifier(name) == name {
        format!(".{}", name)
    } else {
        format!("['{}']", name)
    }
}

/// Where a dynamic import ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicTarget {
    /// Another chunk, by path relative to the importing chunk
    Chunk(String),
    /// A module rendered into the importing chunk, by namespace expression
    Inline(String),
}

/// Replace dynamic import tokens using `resolve`
pub fn resolve_dynamic_imports<F>(code: &str, format: OutputFormat, resolve: F) -> String
where
    F: Fn(ModuleId) -> Option<DynamicTarget>,
{
    IMPORT_TOKEN
        .replace_all(code, |caps: &Captures| {
            caps[1]
                .parse::<ModuleId>()
                .ok()
                .and_then(&resolve)
                .map(|target| dynamic_import_expression(format, &target))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn dynamic_import_expression(format: OutputFormat, target: &DynamicTarget) -> String {
    match target {
        DynamicTarget::Inline(namespace) => {
            format!("Promise.resolve().then(function () {{ return {}; }})", namespace)
        }
        DynamicTarget::Chunk(path) => match format {
            OutputFormat::Es => format!("import('{}')", path),
            OutputFormat::Cjs => format!(
                "Promise.resolve().then(function () {{ return require('{}'); }})",
                path
            ),
            OutputFormat::Amd => format!(
                "new Promise(function (resolve, reject) {{ require(['{}'], resolve, reject); }})",
                amd_path(path)
            ),
            OutputFormat::System => format!("module.import('{}')", path),
            OutputFormat::Iife | OutputFormat::Umd => format!("import('{}')", path),
        },
    }
}

fn amd_path(path: &str) -> &str {
    path.strip_suffix(".js").unwrap_or(path)
}

/// Bindings imported from one dependency chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBlock {
    /// Path relative to the importing chunk
    pub path: String,
    /// (name exported by the dependency, local name)
    pub bindings: Vec<(String, String)>,
}

/// Everything a format wrapper needs to know about a chunk
#[derive(Debug, Clone, Default)]
pub struct FinalizeContext<'a> {
    pub imports: Vec<ImportBlock>,
    /// (exported name, local binding)
    pub exports: Vec<(String, String)>,
    /// Global variable name for iife/umd
    pub name: Option<&'a str>,
    pub intro: &'a str,
    pub outro: &'a str,
}

/// Text placed before and after a chunk body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wrapped {
    pub prefix: String,
    pub suffix: String,
}

/// Wrap a chunk body for `format`, with intro/outro inside the wrapper
pub fn finalize(format: OutputFormat, ctx: &FinalizeContext<'_>) -> Wrapped {
    let mut wrapped = match format {
        OutputFormat::Es => es(ctx),
        OutputFormat::Cjs => cjs(ctx),
        OutputFormat::Amd => amd(ctx),
        OutputFormat::Iife => iife(ctx),
        OutputFormat::Umd => umd(ctx),
        OutputFormat::System => system(ctx),
    };

    if !ctx.intro.is_empty() {
        wrapped.prefix.push_str(ctx.intro);
        wrapped.prefix.push('\n');
    }
    if !ctx.outro.is_empty() {
        wrapped.suffix.insert_str(0, &format!("{}\n", ctx.outro));
    }

    wrapped
}

fn es(ctx: &FinalizeContext<'_>) -> Wrapped {
    let mut prefix = String::new();
    for import in &ctx.imports {
        if import.bindings.is_empty() {
            prefix.push_str(&format!("import '{}';\n", import.path));
        } else {
            let specifiers: Vec<String> = import
                .bindings
                .iter()
                .map(|(name, local)| if name == local { name.clone() } else { format!("{} as {}", name, local) })
                .collect();
            prefix.push_str(&format!("import {{ {} }} from '{}';\n", specifiers.join(", "), import.path));
        }
    }

    let mut suffix = String::new();
    if !ctx.exports.is_empty() {
        let specifiers: Vec<String> = ctx
            .exports
            .iter()
            .map(|(exported, local)| {
                if exported == local {
                    local.clone()
                } else {
                    format!("{} as {}", local, exported)
                }
            })
            .collect();
        suffix.push_str(&format!("export {{ {} }};\n", specifiers.join(", ")));
    }

    Wrapped { prefix, suffix }
}

/// `const { a, b: c } = <source>;`
fn destructure(bindings: &[(String, String)], source: &str) -> String {
    let fields: Vec<String> = bindings
        .iter()
        .map(|(name, local)| if name == local { name.clone() } else { format!("{}: {}", property_key(name), local) })
        .collect();
    format!("const {{ {} }} = {};\n", fields.join(", "), source)
}

fn export_assignments(exports: &[(String, String)]) -> String {
    exports
        .iter()
        .map(|(exported, local)| format!("exports{} = {};\n", property_access(exported), local))
        .collect()
}

fn cjs(ctx: &FinalizeContext<'_>) -> Wrapped {
    let mut prefix = String::from("'use strict';\n\n");
    for import in &ctx.imports {
        let source = format!("require('{}')", import.path);
        if import.bindings.is_empty() {
            prefix.push_str(&format!("{};\n", source));
        } else {
            prefix.push_str(&destructure(&import.bindings, &source));
        }
    }

    Wrapped {
        prefix,
        suffix: export_assignments(&ctx.exports),
    }
}

fn amd(ctx: &FinalizeContext<'_>) -> Wrapped {
    let mut deps = Vec::new();
    let mut params = Vec::new();
    if !ctx.exports.is_empty() {
        deps.push("'exports'".to_string());
        params.push("exports".to_string());
    }
    for (index, import) in ctx.imports.iter().enumerate() {
        deps.push(format!("'{}'", amd_path(&import.path)));
        params.push(format!("__chunk{}", index));
    }

    let mut prefix = format!(
        "define([{}], (function ({}) {{ 'use strict';\n\n",
        deps.join(", "),
        params.join(", ")
    );
    for (index, import) in ctx.imports.iter().enumerate() {
        if !import.bindings.is_empty() {
            prefix.push_str(&destructure(&import.bindings, &format!("__chunk{}", index)));
        }
    }

    Wrapped {
        prefix,
        suffix: format!("{}\n}}));\n", export_assignments(&ctx.exports)),
    }
}

fn system(ctx: &FinalizeContext<'_>) -> Wrapped {
    let paths: Vec<String> = ctx.imports.iter().map(|i| format!("'{}'", i.path)).collect();
    let mut prefix = format!(
        "System.register([{}], (function (exports, module) {{\n'use strict';\n",
        paths.join(", ")
    );

    let locals: Vec<&str> = ctx
        .imports
        .iter()
        .flat_map(|i| i.bindings.iter().map(|(_, local)| local.as_str()))
        .collect();
    if !locals.is_empty() {
        prefix.push_str(&format!("var {};\n", locals.join(", ")));
    }

    let setters: Vec<String> = ctx
        .imports
        .iter()
        .map(|import| {
            if import.bindings.is_empty() {
                "null".to_string()
            } else {
                let assignments: Vec<String> = import
                    .bindings
                    .iter()
                    .map(|(name, local)| format!("{} = m{};", local, property_access(name)))
                    .collect();
                format!("function (m) {{ {} }}", assignments.join(" "))
            }
        })
        .collect();
    prefix.push_str(&format!(
        "return {{\nsetters: [{}],\nexecute: (function () {{\n",
        setters.join(", ")
    ));

    let mut suffix = String::new();
    if !ctx.exports.is_empty() {
        let fields: Vec<String> = ctx
            .exports
            .iter()
            .map(|(exported, local)| format!("{}: {}", property_key(exported), local))
            .collect();
        suffix.push_str(&format!("exports({{ {} }});\n", fields.join(", ")));
    }
    suffix.push_str("})\n};\n}));\n");

    Wrapped { prefix, suffix }
}

fn iife(ctx: &FinalizeContext<'_>) -> Wrapped {
    let has_exports = !ctx.exports.is_empty();
    let params = if has_exports { "exports" } else { "" };
    let assign = match (ctx.name, has_exports) {
        (Some(name), true) => format!("var {} = ", name),
        _ => String::new(),
    };

    let prefix = format!("{}(function ({}) {{\n'use strict';\n\n", assign, params);
    let suffix = if has_exports {
        format!("{}\nreturn exports;\n\n}})({{}});\n", export_assignments(&ctx.exports))
    } else {
        "\n})();\n".to_string()
    };

    Wrapped { prefix, suffix }
}

fn umd(ctx: &FinalizeContext<'_>) -> Wrapped {
    let global_target = match ctx.name {
        Some(name) => format!("global.{} = {{}}", name),
        None => "{}".to_string(),
    };

    let prefix = format!(
        "(function (global, factory) {{\n\
         typeof exports === 'object' && typeof module !== 'undefined' ? factory(exports) :\n\
         typeof define === 'function' && define.amd ? define(['exports'], factory) :\n\
         (global = typeof globalThis !== 'undefined' ? globalThis : global || self, factory({}));\n\
         }})(this, (function (exports) {{ 'use strict';\n\n",
        global_target
    );

    Wrapped {
        prefix,
        suffix: format!("{}\n}}));\n", export_assignments(&ctx.exports)),
    }
}

pub fn count_lines(text: &str) -> u32 {
    text.bytes().filter(|&b| b == b'\n').count() as u32
}

/// Cheap structural check of finalized code: balanced brackets and
/// terminated strings, comments and template literals
pub fn check_syntax(code: &str) -> std::result::Result<(), String> {
    let mut stack: Vec<(char, u32)> = Vec::new();
    let mut line = 1u32;
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let start = line;
                let mut prev = ' ';
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '\n' {
                        line += 1;
                    }
                    if prev == '*' && next == '/' {
                        closed = true;
                        break;
                    }
                    prev = next;
                }
                if !closed {
                    return Err(format!("unterminated comment starting on line {}", start));
                }
            }
            '"' | '\'' | '`' => {
                let start = line;
                let mut escaped = false;
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '\n' {
                        if c != '`' {
                            break;
                        }
                        line += 1;
                    }
                    if escaped {
                        escaped = false;
                    } else if next == '\\' {
                        escaped = true;
                    } else if next == c {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(format!("unterminated string starting on line {}", start));
                }
            }
            '(' | '[' | '{' => stack.push((c, line)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => return Err(format!("unexpected '{}' on line {}", c, line)),
                }
            }
            _ => {}
        }
    }

    match stack.pop() {
        Some((open, opened_on)) => Err(format!("unclosed '{}' opened on line {}", open, opened_on)),
        None => Ok(()),
    }
}
