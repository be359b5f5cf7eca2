//! Expression AST nodes

use serde::{Deserialize, Serialize};
use crate::{Block, NodeId, Span};

/// An expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    /// `nil`
    Nil,

    /// `true` / `false`
    Boolean(bool),

    /// Numeric literal, kept as written: `42`, `0x1F`, `1e3`
    Number(String),

    /// String literal with escapes already processed
    String(String),

    /// `...`
    Vararg,

    /// Function literal: `function(a, b) ... end`
    Function(FunctionBody),

    /// Table constructor: `{ 1, x = 2, [k] = 3 }`
    Table(Vec<TableField>),

    /// Name: `x`, `print`
    Name(String),

    /// Member access: `obj.field`
    Member {
        object: Box<Expr>,
        name: String,
    },

    /// Index access: `obj[key]`
    Index {
        object: Box<Expr>,
        key: Box<Expr>,
    },

    /// Function call: `f(a, b)`, `f "s"`, `f { }`
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },

    /// Method call: `obj:method(a, b)`
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },

    /// Binary operation: `a + b`, `a and b`
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Unary operation: `not x`, `-x`, `#t`
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// Parenthesized expression, which truncates multiple results to one
    Paren(Box<Expr>),
}

impl Expr {
    /// Whether this expression can produce more than one value
    /// when it is the last in an expression list
    pub fn is_multi_value(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } | ExprKind::Vararg
        )
    }

    /// The string value of a string literal
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::String(s) => Some(s),
            _ => None,
        }
    }

    /// The identifier of a name expression
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Strip any number of enclosing parentheses
    pub fn unparen(&self) -> &Expr {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }
}

/// A function literal or the body of a function statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionBody {
    pub id: NodeId,
    pub params: Vec<String>,
    pub is_vararg: bool,
    pub body: Block,
    pub span: Span,
}

/// A field in a table constructor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TableField {
    /// `name = value`
    Named { name: String, value: Expr },
    /// `[key] = value`
    Keyed { key: Expr, value: Expr },
    /// `value`, stored at the next array index
    Positional(Expr),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,

    Concat,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,
}

impl BinaryOp {
    /// Left and right binding power, following the Lua reference manual
    pub fn precedence(self) -> (u8, u8) {
        match self {
            BinaryOp::Or => (1, 1),
            BinaryOp::And => (2, 2),
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => (3, 3),
            BinaryOp::BitOr => (4, 4),
            BinaryOp::BitXor => (5, 5),
            BinaryOp::BitAnd => (6, 6),
            BinaryOp::Shl | BinaryOp::Shr => (7, 7),
            BinaryOp::Concat => (9, 8),
            BinaryOp::Add | BinaryOp::Sub => (10, 10),
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod => (11, 11),
            BinaryOp::Pow => (14, 13),
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::FloorDiv
                | BinaryOp::Mod
                | BinaryOp::Pow
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "~",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Concat => "..",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "~=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    Len,
    BitNot,
}

impl UnaryOp {
    /// Binding power of every unary operator
    pub const PRECEDENCE: u8 = 12;

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
            UnaryOp::Len => "#",
            UnaryOp::BitNot => "~",
        }
    }
}
