//! luastub-analysis: Type inference for Lua modules
//!
//! Reads parsed Lua files in dependency order and infers the structural
//! types of their classes, tables, functions, fields and return values.
//!
//! - `scope`: lexical scopes and symbol ids
//! - `reader`: lowers one chunk to IR and reports what it sees
//! - `context`: definitions, usages, class detection and type resolution
//! - `module`: the immutable per-module output model
//! - `driver`: whole-project runs
//!
//! # Example
//!
//! ```ignore
//! use luastub_analysis::{analyze_sources, AnalysisConfig, SourceFile};
//!
//! let files = vec![SourceFile::new(
//!     "shared/M",
//!     "local M = {}\nfunction M.f(x) return x + 1 end\nreturn M",
//! )];
//! let output = analyze_sources(files, &AnalysisConfig::default());
//! let module = output.module("shared/M").unwrap();
//! assert_eq!(module.returns.len(), 1);
//! ```

pub mod context;
pub mod driver;
pub mod error;
pub mod ir;
pub mod module;
pub mod reader;
pub mod scope;
pub mod symbol;
pub mod types;

pub use context::{
    AnalysisContext, ClassIdiom, ClassInfo, Definition, FunctionInfo, IdiomEvent, TableInfo,
    UsageKey, CLASS_COLLAPSE_THRESHOLD,
};
pub use driver::{analyze_project, analyze_sources, AnalysisConfig, AnalysisOutput};
pub use error::AnalysisError;
pub use ir::{ExprArena, ExprId, Expression, Ident, Literal, Operator};
pub use module::{
    AnalyzedClass, AnalyzedField, AnalyzedFunction, AnalyzedModule, AnalyzedParam,
    AnalyzedRequire, AnalyzedTable, FinalValue,
};
pub use reader::{read_module, AnalysisReader};
pub use scope::{Scope, ScopeIndex, ScopeKey, ScopeKind, ScopeTree};
pub use symbol::{FunctionId, ModuleScopeId, SymbolAllocator, SymbolId, SymbolKind, TableId};
pub use types::{TypeSet, TypeTag};

pub use luastub_deps::SourceFile;
