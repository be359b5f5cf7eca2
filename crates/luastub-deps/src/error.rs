//! Error types for dependency resolution

use std::path::PathBuf;
use thiserror::Error;

/// Errors and advisories produced while ordering files
#[derive(Debug, Clone, Error)]
pub enum DependencyError {
    /// E-DEP-001: The file could not be read
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// E-DEP-002: The file failed to parse
    #[error("failed to parse {id}: {message}")]
    Parse { id: String, message: String },

    /// E-DEP-003: Two files map to the same module id
    #[error("duplicate module id: {id}")]
    DuplicateId { id: String },

    /// E-DEP-004: A require target matches several files
    #[error("ambiguous require '{name}' in {from}: {}", candidates.join(", "))]
    AmbiguousRequire {
        from: String,
        name: String,
        candidates: Vec<String>,
    },

    /// E-DEP-005: A require target matches no file in the project
    #[error("unresolved require '{name}' in {from}")]
    UnresolvedRequire { from: String, name: String },

    /// E-DEP-006: A dependency cycle was broken to keep ordering
    #[error("dependency cycle broken: {from} -> {to}")]
    CycleBroken { from: String, to: String },
}

impl DependencyError {
    /// Whether the file involved is excluded from analysis
    pub fn is_hard_error(&self) -> bool {
        match self {
            DependencyError::Io { .. } => true,
            DependencyError::Parse { .. } => true,
            DependencyError::DuplicateId { .. } => true,
            DependencyError::AmbiguousRequire { .. } => false,
            DependencyError::UnresolvedRequire { .. } => false,
            DependencyError::CycleBroken { .. } => false,
        }
    }

    /// Error code for machine-readable output
    pub fn code(&self) -> &'static str {
        match self {
            DependencyError::Io { .. } => "E-DEP-001",
            DependencyError::Parse { .. } => "E-DEP-002",
            DependencyError::DuplicateId { .. } => "E-DEP-003",
            DependencyError::AmbiguousRequire { .. } => "E-DEP-004",
            DependencyError::UnresolvedRequire { .. } => "E-DEP-005",
            DependencyError::CycleBroken { .. } => "E-DEP-006",
        }
    }

    /// `code: message`, the form used in diagnostic lists
    pub fn to_diagnostic(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}
