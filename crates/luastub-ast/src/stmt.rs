//! Statement AST nodes

use serde::{Deserialize, Serialize};
use crate::{Expr, FunctionBody, Span};

/// A block of statements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

/// A statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatementKind {
    /// Local declaration: `local a, b = 1, 2`
    Local {
        names: Vec<String>,
        values: Vec<Expr>,
    },

    /// Assignment: `a, t.x = 1, 2`
    Assign {
        targets: Vec<Expr>,
        values: Vec<Expr>,
    },

    /// Expression statement; always a call
    Call(Expr),

    /// `do ... end`
    Do(Block),

    /// `while cond do ... end`
    While { condition: Expr, body: Block },

    /// `repeat ... until cond`
    Repeat { body: Block, condition: Expr },

    /// `if a then ... elseif b then ... else ... end`
    If {
        clauses: Vec<(Expr, Block)>,
        else_block: Option<Block>,
    },

    /// `for i = start, limit, step do ... end`
    NumericFor {
        var: String,
        start: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Block,
    },

    /// `for k, v in iter do ... end`
    GenericFor {
        names: Vec<String>,
        iterators: Vec<Expr>,
        body: Block,
    },

    /// Function statement: `function a.b:c(...) ... end`
    Function { name: FunctionName, func: FunctionBody },

    /// `local function f(...) ... end`
    LocalFunction { name: String, func: FunctionBody },

    /// `return a, b`
    Return(Vec<Expr>),

    Break,

    /// `goto label`
    Goto(String),

    /// `::label::`
    Label(String),
}

/// The dotted target of a function statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionName {
    /// `a.b.c` as `["a", "b", "c"]`
    pub path: Vec<String>,
    /// Trailing `:method` part, if any
    pub method: Option<String>,
    pub span: Span,
}

impl FunctionName {
    /// Render the name as written: `a.b:c`
    pub fn display(&self) -> String {
        let mut out = self.path.join(".");
        if let Some(method) = &self.method {
            out.push(':');
            out.push_str(method);
        }
        out
    }
}
