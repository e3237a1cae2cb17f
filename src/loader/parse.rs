//! Regex-based extraction of module syntax
//!
//! Import and re-export statements are removed from the rendered code and
//! `export` keywords are stripped, always leaving the same number of lines
//! behind so rendered lines still match the original source.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::bundler::ExportBinding;

/// Static import statements: default, named and namespace clauses
static IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*import\s+(?:([\w$]+)\s*,?\s*)?(?:\{([^}]*)\}\s*|\*\s*as\s+([\w$]+)\s*)?(?:from\s*)?["']([^"']+)["'][ \t]*;?"#,
    )
    .unwrap()
});

/// `export { a, b as c } from '...'` and `export * from '...'`
static EXPORT_FROM_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*export\s*(?:\{([^}]*)\}|\*(?:\s*as\s+([\w$]+))?)\s*from\s*["']([^"']+)["'][ \t]*;?"#)
        .unwrap()
});

static EXPORT_LIST_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^[ \t]*export\s*\{([^}]*)\}[ \t]*;?"#).unwrap());

static EXPORT_DECL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^([ \t]*)export\s+(default\s+)?((?:async\s+)?function\s*\*?|class|const|let|var)\s*([\w$]+)"#,
    )
    .unwrap()
});

static EXPORT_DEFAULT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^([ \t]*)export\s+default\s+"#).unwrap());

static DYNAMIC_IMPORT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\s*\(\s*["'`]([^"'`]+)["'`]\s*\)"#).unwrap());

/// A static import of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticImport {
    pub specifier: String,
    /// (imported name or `*`, local name); empty for side-effect imports
    pub bindings: Vec<(String, String)>,
}

/// Module syntax the loader cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedModule {
    /// Code with imports removed and exports stripped
    pub code: String,
    pub imports: Vec<StaticImport>,
    pub dynamic_imports: Vec<String>,
    pub exports: Vec<ExportBinding>,
}

/// Same number of newlines as `text`
fn blank(text: &str) -> String {
    "\n".repeat(text.matches('\n').count())
}

/// `a, b as c` → [(a, a), (b, c)]
fn parse_specifiers(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.split_once(" as ") {
            Some((name, alias)) => (name.trim().to_string(), alias.trim().to_string()),
            None => (s.to_string(), s.to_string()),
        })
        .collect()
}

/// Parse a JavaScript module. `default_local` names the binding created for
/// anonymous default exports.
pub fn parse_module(source: &str, default_local: &str) -> ParsedModule {
    let mut imports = Vec::new();
    let mut exports = Vec::new();

    let code = IMPORT_REGEX.replace_all(source, |caps: &Captures| {
        let mut bindings = Vec::new();
        if let Some(default) = caps.get(1) {
            bindings.push(("default".to_string(), default.as_str().to_string()));
        }
        if let Some(named) = caps.get(2) {
            bindings.extend(parse_specifiers(named.as_str()));
        }
        if let Some(namespace) = caps.get(3) {
            bindings.push(("*".to_string(), namespace.as_str().to_string()));
        }
        imports.push(StaticImport {
            specifier: caps[4].to_string(),
            bindings,
        });
        blank(&caps[0])
    });

    let code = EXPORT_FROM_REGEX.replace_all(&code, |caps: &Captures| {
        let specifier = caps[3].to_string();
        let mut bindings = Vec::new();

        if let Some(named) = caps.get(1) {
            for (imported, exported) in parse_specifiers(named.as_str()) {
                let local = if imported == "default" {
                    format!("{}_reexport", exported)
                } else {
                    imported.clone()
                };
                exports.push(ExportBinding::new(exported, local.clone()));
                bindings.push((imported, local));
            }
        } else if let Some(namespace) = caps.get(2) {
            exports.push(ExportBinding::new(namespace.as_str(), namespace.as_str()));
            bindings.push(("*".to_string(), namespace.as_str().to_string()));
        } else {
            tracing::debug!("export * from '{}' does not re-export bindings", specifier);
        }

        imports.push(StaticImport { specifier, bindings });
        blank(&caps[0])
    });

    let code = EXPORT_LIST_REGEX.replace_all(&code, |caps: &Captures| {
        for (local, exported) in parse_specifiers(&caps[1]) {
            exports.push(ExportBinding::new(exported, local));
        }
        blank(&caps[0])
    });

    let code = EXPORT_DECL_REGEX.replace_all(&code, |caps: &Captures| {
        let name = caps[4].to_string();
        let exported = if caps.get(2).is_some() { "default".to_string() } else { name.clone() };
        exports.push(ExportBinding::new(exported, name.clone()));

        format!("{}{} {}", &caps[1], caps[3].trim_end(), name)
    });

    let code = EXPORT_DEFAULT_REGEX.replace_all(&code, |caps: &Captures| {
        exports.push(ExportBinding::new("default", default_local));
        format!("{}const {} = ", &caps[1], default_local)
    });

    let mut dynamic_imports: Vec<String> = Vec::new();
    for caps in DYNAMIC_IMPORT_REGEX.captures_iter(&code) {
        let specifier = caps[1].to_string();
        if !dynamic_imports.contains(&specifier) {
            dynamic_imports.push(specifier);
        }
    }

    ParsedModule {
        code: code.into_owned(),
        imports,
        dynamic_imports,
        exports,
    }
}

/// A JSON module: the document becomes the default export
pub fn json_module(source: &str, default_local: &str) -> ParsedModule {
    ParsedModule {
        code: format!("const {} = {};\n", default_local, source.trim_end()),
        exports: vec![ExportBinding::new("default", default_local)],
        ..ParsedModule::default()
    }
}
