//! luastub-deps: Analysis order for a Lua project
//!
//! The type inference reads each file once, so a module's exports must be
//! known before its dependents are read. This crate:
//! - discovers the project's source files and their module ids
//! - extracts load-time global reads/writes and `require` targets
//! - builds the alias and global-setter indexes
//! - orders files per bucket, breaking reference cycles
//!
//! # Example
//!
//! ```ignore
//! use luastub_deps::{order_sources, SourceFile};
//!
//! let files = vec![
//!     SourceFile::new("shared/a", "local b = require('b')"),
//!     SourceFile::new("shared/b", "return {}"),
//! ];
//! let result = order_sources(&files, &["shared".to_string()]);
//! assert_eq!(result.order, vec!["shared/b", "shared/a"]);
//! ```

mod discovery;
mod error;
mod extractor;
mod graph;
mod module;
mod resolver;

pub use discovery::{discover_files, load_sources};
pub use error::DependencyError;
pub use extractor::{DependencyReader, FileDependencies};
pub use graph::{DependencyFile, DependencyGraph, RequireTarget};
pub use module::{
    bucket_of, module_aliases, module_id_from_path, normalize_require, ProjectConfig, SourceFile,
};
pub use resolver::{OrderResolver, ResolvedOrder};

use luastub_ast::Chunk;

/// Order already-parsed chunks
///
/// Duplicate ids are reported and only the first file with an id is kept.
pub fn order_chunks<'c>(
    chunks: impl IntoIterator<Item = (&'c str, &'c Chunk)>,
    buckets: &[String],
) -> ResolvedOrder {
    let mut graph = DependencyGraph::new(buckets.to_vec());
    let mut errors = Vec::new();

    for (id, chunk) in chunks {
        let deps = DependencyReader::new().read(chunk);
        if let Err(e) = graph.insert(id.to_string(), deps) {
            errors.push(e);
        }
    }

    let mut resolved = OrderResolver::new(&graph).resolve();
    errors.append(&mut resolved.diagnostics);
    resolved.diagnostics = errors;
    resolved
}

/// Parse and order in-memory sources; unparseable files are left out
pub fn order_sources(files: &[SourceFile], buckets: &[String]) -> ResolvedOrder {
    let mut parsed = Vec::new();
    let mut errors = Vec::new();

    for file in files {
        match luastub_parser::parse(&file.text) {
            Ok(chunk) => parsed.push((file.id.as_str(), chunk)),
            Err(e) => errors.push(DependencyError::Parse {
                id: file.id.clone(),
                message: e.to_string(),
            }),
        }
    }

    let mut resolved = order_chunks(parsed.iter().map(|(id, chunk)| (*id, chunk)), buckets);
    errors.append(&mut resolved.diagnostics);
    resolved.diagnostics = errors;
    resolved
}
