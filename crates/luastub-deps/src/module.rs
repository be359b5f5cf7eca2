//! Module identifiers, aliases and project configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Analysis input settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project root directory
    pub root: PathBuf,
    /// Ordered bucket subdirectories; earlier buckets are analyzed first
    pub buckets: Vec<String>,
    /// Source file extension, without the dot
    pub extension: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            buckets: vec!["shared".into(), "client".into(), "server".into()],
            extension: "lua".into(),
        }
    }
}

impl ProjectConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

/// A source file handed to the analysis
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Module id: root-relative path without extension, `/`-separated
    pub id: String,
    pub path: Option<PathBuf>,
    pub text: String,
}

impl SourceFile {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
            text: text.into(),
        }
    }
}

/// Derive a module id from a path below `root`
pub fn module_id_from_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let relative = relative.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// The bucket of a module: its first path component, if it names a bucket
pub fn bucket_of<'a>(id: &str, buckets: &'a [String]) -> Option<&'a str> {
    let first = id.split('/').next()?;
    buckets.iter().find(|b| b.as_str() == first).map(|b| b.as_str())
}

/// Every proper path suffix of a module id: `a/b/c` gives `b/c` and `c`
pub fn module_aliases(id: &str) -> Vec<String> {
    let parts: Vec<&str> = id.split('/').collect();
    (1..parts.len()).map(|i| parts[i..].join("/")).collect()
}

/// Normalize a `require` argument to module-id form
///
/// `Foo.Bar`, `Foo/Bar.lua` and `Foo\Bar` all become `Foo/Bar`.
pub fn normalize_require(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_suffix(".lua").unwrap_or(name);
    let name = name.replace('\\', "/");
    if name.contains('/') {
        name
    } else {
        name.replace('.', "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_from_path() {
        let id = module_id_from_path(Path::new("/proj"), Path::new("/proj/shared/Foo/Bar.lua"));
        assert_eq!(id.as_deref(), Some("shared/Foo/Bar"));
        assert!(module_id_from_path(Path::new("/proj"), Path::new("/other/x.lua")).is_none());
    }

    #[test]
    fn test_aliases_are_suffixes() {
        assert_eq!(module_aliases("shared/Foo/Bar"), vec!["Foo/Bar", "Bar"]);
        assert!(module_aliases("single").is_empty());
    }

    #[test]
    fn test_normalize_require() {
        assert_eq!(normalize_require("Foo.Bar"), "Foo/Bar");
        assert_eq!(normalize_require("Foo/Bar.lua"), "Foo/Bar");
        assert_eq!(normalize_require("Foo\\Bar"), "Foo/Bar");
    }

    #[test]
    fn test_bucket_of() {
        let buckets = ProjectConfig::default().buckets;
        assert_eq!(bucket_of("client/ui/Window", &buckets), Some("client"));
        assert_eq!(bucket_of("misc/Thing", &buckets), None);
    }
}
