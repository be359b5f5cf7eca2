//! Project file discovery

use crate::{module_id_from_path, DependencyError, ProjectConfig, SourceFile};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Find every source file of the configured buckets
///
/// With no buckets configured the whole root is scanned. Files come back
/// in directory-walk order, sorted by name within each directory.
pub fn discover_files(config: &ProjectConfig) -> Vec<PathBuf> {
    let roots: Vec<PathBuf> = if config.buckets.is_empty() {
        vec![config.root.clone()]
    } else {
        config.buckets.iter().map(|b| config.root.join(b)).collect()
    };

    let mut files = Vec::new();
    for dir in roots {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "bucket directory missing");
            continue;
        }
        for entry in WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| has_extension(e.path(), &config.extension))
        {
            files.push(entry.into_path());
        }
    }

    debug!(count = files.len(), "discovered source files");
    files
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Read discovered files into memory
///
/// Unreadable files are reported and skipped.
pub fn load_sources(config: &ProjectConfig, paths: &[PathBuf]) -> (Vec<SourceFile>, Vec<DependencyError>) {
    let mut sources = Vec::new();
    let mut errors = Vec::new();

    for path in paths {
        let Some(id) = module_id_from_path(&config.root, path) else {
            continue;
        };
        match fs::read_to_string(path) {
            Ok(text) => sources.push(SourceFile {
                id,
                path: Some(path.clone()),
                text,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read source file");
                errors.push(DependencyError::Io {
                    path: path.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    (sources, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_discover_bucket_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("shared/util")).unwrap();
        fs::create_dir_all(root.join("client")).unwrap();
        fs::create_dir_all(root.join("ignored")).unwrap();
        fs::write(root.join("shared/util/Strings.lua"), "return {}").unwrap();
        fs::write(root.join("shared/notes.txt"), "not lua").unwrap();
        fs::write(root.join("client/Ui.lua"), "").unwrap();
        fs::write(root.join("ignored/Other.lua"), "").unwrap();

        let config = ProjectConfig::new(root);
        let files = discover_files(&config);
        let (sources, errors) = load_sources(&config, &files);

        assert!(errors.is_empty());
        let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["shared/util/Strings", "client/Ui"]);
        assert_eq!(sources[0].text, "return {}");
    }

    #[test]
    fn test_no_buckets_scans_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.lua"), "").unwrap();

        let config = ProjectConfig {
            buckets: Vec::new(),
            ..ProjectConfig::new(dir.path())
        };
        assert_eq!(discover_files(&config).len(), 1);
    }
}
