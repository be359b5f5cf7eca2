//! luastub Lexer - Lua tokenization using logos
//!
//! Handles the parts of Lua that a plain regex table cannot:
//! - long strings `[==[ ... ]==]` with a matching level
//! - long comments `--[[ ... ]]` next to line comments
//! - a leading `#!` line

mod token;

pub use token::*;

use logos::Logos;
use luastub_ast::Span;

/// Tokenize a source string into a vector of tokens
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);

    while let Some(result) = lexer.next() {
        let span = Span::new(lexer.span().start, lexer.span().end);
        let kind = match result {
            Ok(kind) => kind,
            Err(_) => TokenKind::Error,
        };
        tokens.push(Token { kind, span });
    }

    // Add EOF token
    let end = source.len();
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(end, end),
    });

    tokens
}

/// A token with its span
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = kinds("local x = 5");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Local,
                TokenKind::Ident,
                TokenKind::Assign,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_equality_vs_assignment() {
        assert_eq!(kinds("a == b")[1], TokenKind::EqEq);
        assert_eq!(kinds("a ~= b")[1], TokenKind::Ne);
        assert_eq!(kinds("a = b")[1], TokenKind::Assign);
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = kinds("x -- trailing\n--[[ block\n comment ]] y --[==[ ]] ]==] z");
        assert_eq!(
            tokens,
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn test_long_string() {
        let source = "s = [==[a ]] b]==]";
        let tokens = tokenize(source);
        assert_eq!(tokens[2].kind, TokenKind::LongString);
        assert_eq!(tokens[2].text(source), "[==[a ]] b]==]");
    }

    #[test]
    fn test_concat_and_vararg() {
        assert_eq!(
            kinds("a .. ..."),
            vec![TokenKind::Ident, TokenKind::DotDot, TokenKind::Ellipsis, TokenKind::Eof]
        );
    }

    #[test]
    fn test_numbers() {
        for source in ["42", "3.14", "1e10", "0x1F", ".5"] {
            assert_eq!(kinds(source)[0], TokenKind::Number, "{source}");
        }
    }

    #[test]
    fn test_method_call_tokens() {
        assert_eq!(
            kinds("obj:m()"),
            vec![
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
    }
}
