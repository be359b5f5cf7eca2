use std::fs;
use std::path::Path;

use luastub::deps::SourceFile;
use tempfile::TempDir;

/// In-memory sources from `(id, text)` pairs
pub fn sources(files: &[(&str, &str)]) -> Vec<SourceFile> {
    files
        .iter()
        .map(|(id, text)| SourceFile::new(*id, *text))
        .collect()
}

/// A project directory holding `(relative path, text)` files
pub fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    for (path, text) in files {
        write_file(dir.path(), path, text);
    }
    dir
}

pub fn write_file(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    fs::write(&path, text).unwrap_or_else(|e| panic!("Failed to write {}: {}", relative, e));
}
