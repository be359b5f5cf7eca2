//! luastub Parser - Recursive descent parser for Lua
//!
//! Parses Lua 5.1 source (plus the 5.3 bitwise operators, `goto` and
//! local attributes) into a `Chunk`. Every expression and function body
//! gets a `NodeId` that is unique within the chunk.

mod error;
mod parser;

pub use error::*;
pub use parser::*;

use luastub_ast::Chunk;
use luastub_lexer::tokenize;

/// Parse a source string into a Chunk AST
pub fn parse(source: &str) -> Result<Chunk, ParseError> {
    let tokens = tokenize(source);
    let mut parser = Parser::new(source, tokens);
    parser.parse_chunk()
}

#[cfg(test)]
mod tests {
    use super::*;
    use luastub_ast::*;

    fn first_statement(source: &str) -> StatementKind {
        let chunk = parse(source).expect("parse failed");
        chunk.block.statements.into_iter().next().expect("no statements").kind
    }

    #[test]
    fn test_parse_empty_source() {
        let chunk = parse("").unwrap();
        assert!(chunk.block.statements.is_empty());
    }

    #[test]
    fn test_parse_comments_only() {
        let chunk = parse("-- nothing here\n--[[ or here ]]").unwrap();
        assert!(chunk.block.statements.is_empty());
    }

    #[test]
    fn test_parse_module_pattern() {
        let source = r#"
            local M = {}
            function M.f(x) return x + 1 end
            return M
        "#;
        let chunk = parse(source).unwrap();
        assert_eq!(chunk.block.statements.len(), 3);
        assert!(matches!(
            chunk.block.statements[2].kind,
            StatementKind::Return(ref values) if values.len() == 1
        ));
    }

    #[test]
    fn test_parse_method_definition() {
        match first_statement("function Foo.Bar:new(a, ...) end") {
            StatementKind::Function { name, func } => {
                assert_eq!(name.path, vec!["Foo", "Bar"]);
                assert_eq!(name.method.as_deref(), Some("new"));
                assert_eq!(name.display(), "Foo.Bar:new");
                assert_eq!(func.params, vec!["a"]);
                assert!(func.is_vararg);
            }
            other => panic!("Expected function statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        match first_statement("x = 1 + 2 * 3") {
            StatementKind::Assign { values, .. } => match &values[0].kind {
                ExprKind::Binary { op, right, .. } => {
                    assert_eq!(*op, BinaryOp::Add);
                    assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
                }
                other => panic!("Expected binary, got {:?}", other),
            },
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_concat_is_right_associative() {
        match first_statement("x = a .. b .. c") {
            StatementKind::Assign { values, .. } => match &values[0].kind {
                ExprKind::Binary { op, left, .. } => {
                    assert_eq!(*op, BinaryOp::Concat);
                    assert!(matches!(left.kind, ExprKind::Name(_)));
                }
                other => panic!("Expected binary, got {:?}", other),
            },
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_unary_binds_tighter_than_pow_base() {
        // -x ^ 2 is -(x ^ 2)
        match first_statement("y = -x ^ 2") {
            StatementKind::Assign { values, .. } => {
                assert!(matches!(values[0].kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
            }
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_table_constructor() {
        match first_statement("t = { 1, x = 2, [\"y\"] = 3; 4 }") {
            StatementKind::Assign { values, .. } => match &values[0].kind {
                ExprKind::Table(fields) => {
                    assert_eq!(fields.len(), 4);
                    assert!(matches!(fields[0], TableField::Positional(_)));
                    assert!(matches!(fields[1], TableField::Named { .. }));
                    assert!(matches!(fields[2], TableField::Keyed { .. }));
                }
                other => panic!("Expected table, got {:?}", other),
            },
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_call_sugar() {
        match first_statement("require \"foo.bar\"") {
            StatementKind::Call(expr) => match expr.kind {
                ExprKind::Call { args, .. } => assert_eq!(args[0].as_str(), Some("foo.bar")),
                other => panic!("Expected call, got {:?}", other),
            },
            other => panic!("Expected call statement, got {:?}", other),
        }
    }

    #[test]
    fn test_method_call_statement() {
        match first_statement("obj:method(1)") {
            StatementKind::Call(expr) => {
                assert!(matches!(expr.kind, ExprKind::MethodCall { ref method, .. } if method == "method"));
            }
            other => panic!("Expected call statement, got {:?}", other),
        }
    }

    #[test]
    fn test_control_flow() {
        let source = r#"
            for i = 1, 10, 2 do print(i) end
            for k, v in pairs(t) do end
            while x do break end
            repeat x = x - 1 until x < 0
            if a then elseif b then else end
            do local y <const> = 1 end
            goto done
            ::done::
        "#;
        let chunk = parse(source).unwrap();
        assert_eq!(chunk.block.statements.len(), 8);
    }

    #[test]
    fn test_node_ids_are_unique() {
        let chunk = parse("local a = b.c + d[1]").unwrap();
        assert!(chunk.node_count >= 6);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(unescape(r"a\nb\tc\\").as_deref(), Some("a\nb\tc\\"));
        assert_eq!(unescape(r"\65\x42\u{43}").as_deref(), Some("ABC"));
        assert_eq!(unescape("a\\z   b").as_deref(), Some("ab"));
    }

    #[test]
    fn test_long_string_drops_first_newline() {
        match first_statement("s = [[\nline]]") {
            StatementKind::Assign { values, .. } => assert_eq!(values[0].as_str(), Some("line")),
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        let result = parse("f() = 1");
        assert!(matches!(result, Err(ParseError::InvalidAssignmentTarget { .. })));
    }

    #[test]
    fn test_unexpected_eof() {
        let result = parse("function f(");
        assert!(result.is_err());
    }
}
