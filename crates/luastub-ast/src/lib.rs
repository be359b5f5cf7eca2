//! luastub AST - Core types for the Lua syntax tree
//!
//! This crate defines the syntax tree produced by `luastub-parser`,
//! spans for source locations, and the per-file node identifiers that
//! later phases use to cache derived data.

mod span;
mod expr;
mod stmt;

pub use span::*;
pub use expr::*;
pub use stmt::*;

use serde::{Deserialize, Serialize};

/// A complete Lua source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub block: Block,
    pub span: Span,
    /// Number of node ids handed out while parsing this chunk
    pub node_count: u32,
}
