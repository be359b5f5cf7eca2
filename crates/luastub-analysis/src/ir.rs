//! Normalized expression IR
//!
//! The reader lowers syntax to these expressions once per syntax node.
//! Expressions live in an `ExprArena` and are compared by `ExprId`, never
//! structurally.

use crate::symbol::{FunctionId, SymbolId, TableId};
use luastub_ast::{BinaryOp, UnaryOp};

/// Index of an expression in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

/// A name as seen by the resolver
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ident {
    Local(SymbolId),
    Global(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Boolean(bool),
    /// Source text of the number
    Number(String),
    String(String),
    Table(TableId),
    Function(FunctionId),
}

impl Literal {
    /// Lua source text for scalar literals
    pub fn source_text(&self) -> Option<String> {
        match self {
            Literal::Nil => Some("nil".to_string()),
            Literal::Boolean(b) => Some(b.to_string()),
            Literal::Number(n) => Some(n.clone()),
            Literal::String(s) => Some(quote_lua_string(s)),
            Literal::Table(_) | Literal::Function(_) => None,
        }
    }
}

/// Double-quoted Lua 5.1 string literal
///
/// Bytes outside printable ASCII are written as three-digit `\ddd`
/// escapes so a following digit cannot extend them.
fn quote_lua_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for byte in s.bytes() {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{:03}", byte)),
        }
    }
    out.push('"');
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Binary(BinaryOp),
    Unary(UnaryOp),
    /// Call with callee as the first operand, then the arguments.
    /// `slot` picks which return value the expression stands for.
    Call { slot: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Reference(Ident),
    Literal(Literal),
    /// `base.name`
    Member { base: ExprId, name: String },
    /// `base[index]`
    Index { base: ExprId, index: ExprId },
    Operation { op: Operator, args: Vec<ExprId> },
    /// `require(name)`, with the target module resolved at read time
    Require {
        name: String,
        target: Option<String>,
        slot: usize,
    },
    /// `...` and anything else with no static value
    Vararg,
}

#[derive(Debug, Default)]
pub struct ExprArena {
    exprs: Vec<Expression>,
}

impl ExprArena {
    pub fn alloc(&mut self, expr: Expression) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> &Expression {
        &self.exprs[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Callee and arguments of a call expression
    pub fn call_parts(&self, id: ExprId) -> Option<(ExprId, &[ExprId])> {
        match self.get(id) {
            Expression::Operation {
                op: Operator::Call { .. },
                args,
            } => args.split_first().map(|(callee, rest)| (*callee, rest)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> String {
        Literal::String(s.to_string())
            .source_text()
            .expect("strings have source text")
    }

    #[test]
    fn test_string_source_text_uses_lua_escapes() {
        assert_eq!(text("plain"), "\"plain\"");
        assert_eq!(text("a\"b\\c"), r#""a\"b\\c""#);
        assert_eq!(text("line\nnext\t"), r#""line\nnext\t""#);
        assert_eq!(text("\u{7}1"), r#""\0071""#);
        assert_eq!(text("é"), r#""\195\169""#);
    }

    #[test]
    fn test_table_and_function_have_no_source_text() {
        assert!(Literal::Table(TableId(0)).source_text().is_none());
        assert_eq!(Literal::Nil.source_text().as_deref(), Some("nil"));
    }
}
