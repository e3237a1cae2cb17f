//! Utility functions and helpers

use std::path::Path;

use sha2::{Digest, Sha256};

/// Generate a hash of the given content
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// Get relative path from base to target
pub fn relative_path(from: &Path, to: &Path) -> Option<String> {
    pathdiff::diff_paths(to, from).map(|p| p.display().to_string().replace('\\', "/"))
}

/// Path an output file uses to import another output file
pub fn import_path(from_file: &str, to_file: &str) -> String {
    let from_dir = Path::new(from_file).parent().unwrap_or(Path::new(""));
    let relative = relative_path(from_dir, Path::new(to_file)).unwrap_or_else(|| to_file.to_string());

    if relative.starts_with("../") {
        relative
    } else {
        format!("./{}", relative)
    }
}

/// Clean a path by removing . and .. components
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if path.starts_with('/') {
        format!("/{}", parts.join("/"))
    } else {
        parts.join("/")
    }
}

/// Relative output path that stays below its output directory: `.` and
/// empty segments are dropped, and paths leaving the directory through `..`
/// or a leading `/` are moved under `_virtual/`
pub fn contained_path(path: &str) -> String {
    let mut escaped = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => escaped = true,
            _ => parts.push(part),
        }
    }

    if escaped {
        parts.insert(0, "_virtual");
    }
    parts.join("/")
}

/// Convert a file path to a module ID
pub fn path_to_module_id(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// Longest directory prefix shared by all `/`-separated ids
pub fn common_dir<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let mut common: Option<Vec<&str>> = None;

    for id in ids {
        let mut dirs: Vec<&str> = id.split('/').collect();
        dirs.pop();

        common = Some(match common {
            None => dirs,
            Some(prefix) => prefix
                .into_iter()
                .zip(dirs)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }

    common.map(|parts| parts.join("/")).unwrap_or_default()
}

/// File name without directories or extension
pub fn file_stem(id: &str) -> &str {
    let name = id.rsplit('/').next().unwrap_or(id);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    }
}

/// Turn arbitrary text into a valid JavaScript identifier
pub fn make_legal_identifier(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect();

    if result.is_empty() || result.starts_with(|c: char| c.is_ascii_digit()) {
        result.insert(0, '_');
    }

    result
}

/// Format bytes as human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = secs - (mins as f64 * 60.0);
        format!("{}m {:.2}s", mins, remaining_secs)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}
