//! Parser error types

use luastub_ast::Span;
use luastub_lexer::TokenKind;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("unexpected token: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("unexpected end of file")]
    UnexpectedEof { span: Span },

    #[error("invalid expression")]
    InvalidExpression { span: Span },

    #[error("cannot assign to this expression")]
    InvalidAssignmentTarget { span: Span },

    #[error("malformed string literal")]
    InvalidString { span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::UnexpectedEof { span } => *span,
            ParseError::InvalidExpression { span } => *span,
            ParseError::InvalidAssignmentTarget { span } => *span,
            ParseError::InvalidString { span } => *span,
        }
    }

    pub fn unexpected(expected: impl Into<String>, found: TokenKind, span: Span) -> Self {
        if found == TokenKind::Eof {
            return ParseError::UnexpectedEof { span };
        }
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: found.describe().to_string(),
            span,
        }
    }
}
