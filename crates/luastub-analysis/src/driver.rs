//! Batch driver: discover, parse, order, read and finalize a project

use crate::context::AnalysisContext;
use crate::error::AnalysisError;
use crate::module::AnalyzedModule;
use crate::reader::read_module;
use luastub_ast::Chunk;
use luastub_deps::{discover_files, load_sources, order_chunks, ProjectConfig, SourceFile};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Analysis input settings: project root, ordered buckets and extension
pub type AnalysisConfig = ProjectConfig;

/// Everything a run produces
#[derive(Debug, Default, Serialize)]
pub struct AnalysisOutput {
    /// One model per analyzed file, in analysis order
    pub modules: Vec<AnalyzedModule>,
    pub order: Vec<String>,
    /// `code: message` lines for skipped files and advisories
    pub diagnostics: Vec<String>,
}

impl AnalysisOutput {
    pub fn module(&self, id: &str) -> Option<&AnalyzedModule> {
        self.modules.iter().find(|m| m.id == id)
    }
}

/// Analyze every source file below the configured root
pub fn analyze_project(config: &AnalysisConfig) -> AnalysisOutput {
    let paths = discover_files(config);
    info!(
        files = paths.len(),
        root = %config.root.display(),
        "discovered source files"
    );

    let (files, errors) = load_sources(config, &paths);
    let mut output = analyze_sources(files, config);

    let mut diagnostics: Vec<String> = errors
        .into_iter()
        .map(|e| AnalysisError::from(e).to_diagnostic())
        .collect();
    diagnostics.append(&mut output.diagnostics);
    output.diagnostics = diagnostics;
    output
}

/// Analyze in-memory sources
///
/// Files that fail to parse and duplicate ids are reported and skipped;
/// the rest are analyzed in dependency order.
pub fn analyze_sources(files: Vec<SourceFile>, config: &AnalysisConfig) -> AnalysisOutput {
    let mut errors: Vec<AnalysisError> = Vec::new();
    let mut parsed: Vec<(String, Chunk)> = Vec::with_capacity(files.len());

    for file in files {
        match luastub_parser::parse(&file.text) {
            Ok(chunk) => parsed.push((file.id, chunk)),
            Err(e) => {
                warn!(
                    module = %file.id,
                    line = e.span().line(&file.text),
                    error = %e,
                    "skipping file that failed to parse"
                );
                errors.push(AnalysisError::Parse {
                    id: file.id,
                    message: e.to_string(),
                    span: e.span(),
                });
            }
        }
    }

    let resolved = order_chunks(
        parsed.iter().map(|(id, chunk)| (id.as_str(), chunk)),
        &config.buckets,
    );
    info!(files = resolved.order.len(), "computed analysis order");
    errors.extend(resolved.diagnostics.into_iter().map(AnalysisError::from));

    // The first file with a given id is the one that was ordered
    let mut chunks: HashMap<&str, &Chunk> = HashMap::new();
    for (id, chunk) in &parsed {
        chunks.entry(id.as_str()).or_insert(chunk);
    }

    let mut ctx = AnalysisContext::new(config.buckets.clone());
    for id in &resolved.order {
        ctx.register_module(id);
    }
    for id in &resolved.order {
        if let Some(chunk) = chunks.get(id.as_str()) {
            read_module(&mut ctx, id, chunk);
        }
    }
    errors.extend(ctx.take_diagnostics());

    let modules = ctx.finalize_modules();
    AnalysisOutput {
        modules,
        order: resolved.order,
        diagnostics: errors.iter().map(AnalysisError::to_diagnostic).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn test_parse_failure_is_skipped() {
        let files = vec![
            SourceFile::new("shared/good", "return {}"),
            SourceFile::new("shared/bad", "function f("),
        ];
        let output = analyze_sources(files, &config());
        assert_eq!(output.order, vec!["shared/good"]);
        assert_eq!(output.modules.len(), 1);
        assert!(output.diagnostics.iter().any(|d| d.starts_with("E-ANA-001")));
    }

    #[test]
    fn test_duplicate_id_reported_once() {
        let files = vec![
            SourceFile::new("shared/a", "A = 1"),
            SourceFile::new("shared/a", "A = 'two'"),
        ];
        let output = analyze_sources(files, &config());
        assert_eq!(output.modules.len(), 1);
        assert!(output.diagnostics.iter().any(|d| d.starts_with("E-DEP-003")));
    }

    #[test]
    fn test_project_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::write(shared.join("Util.lua"), "local M = {}\nfunction M.id(x) return x end\nreturn M").unwrap();
        std::fs::write(shared.join("Main.lua"), "local Util = require('Util')\nreturn Util").unwrap();

        let output = analyze_project(&AnalysisConfig::new(dir.path()));
        assert_eq!(output.order, vec!["shared/Util", "shared/Main"]);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("shared/Main"));
    }
}
