//! luastub - Type inference for Lua projects
//!
//! This is the root workspace crate that provides integration tests.
//! The actual implementation is in the workspace member crates.

// Re-export main crates for convenience
pub use luastub_analysis as analysis;
pub use luastub_ast as ast;
pub use luastub_deps as deps;
pub use luastub_lexer as lexer;
pub use luastub_parser as parser;

pub use luastub_analysis::{
    analyze_project, analyze_sources, AnalysisConfig, AnalysisOutput, AnalyzedModule,
};
