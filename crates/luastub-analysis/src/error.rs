//! Error types for the analysis pass

use luastub_ast::Span;
use luastub_deps::DependencyError;
use thiserror::Error;

/// Errors and advisories produced while analyzing a project
#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    /// E-ANA-001: A module failed to parse and was skipped
    #[error("failed to parse {id}: {message}")]
    Parse {
        id: String,
        message: String,
        span: Span,
    },

    /// E-ANA-002: Discovery or ordering reported a problem
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// E-ANA-003: A module was required before it had been read
    #[error("{from} requires {target} before it was analyzed")]
    RequireBeforeAnalysis { from: String, target: String },
}

impl AnalysisError {
    /// Error code for machine-readable output
    ///
    /// Dependency errors keep their own `E-DEP-*` code.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::Parse { .. } => "E-ANA-001",
            AnalysisError::Dependency(e) => e.code(),
            AnalysisError::RequireBeforeAnalysis { .. } => "E-ANA-003",
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            AnalysisError::Parse { span, .. } => Some(*span),
            _ => None,
        }
    }

    /// Whether the file involved is excluded from analysis
    pub fn is_hard_error(&self) -> bool {
        match self {
            AnalysisError::Parse { .. } => true,
            AnalysisError::Dependency(e) => e.is_hard_error(),
            AnalysisError::RequireBeforeAnalysis { .. } => false,
        }
    }

    /// `code: message`, the form used in diagnostic lists
    pub fn to_diagnostic(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}
