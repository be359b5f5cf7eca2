//! Lightweight dependency reader
//!
//! Collects the globals a file reads and writes and the modules it
//! requires. Only module-level code is visited: function bodies run later,
//! so what they touch does not constrain load order.

use luastub_ast::{Block, Chunk, Expr, ExprKind, StatementKind, TableField};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// What a single file needs from, and provides to, the global environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileDependencies {
    /// Global names read at load time
    pub reads: BTreeSet<String>,
    /// Global names assigned at load time
    pub writes: BTreeSet<String>,
    /// Normalized string-literal `require` targets
    pub requires: BTreeSet<String>,
}

/// Walks one chunk and fills a `FileDependencies`
pub struct DependencyReader {
    deps: FileDependencies,
    scopes: Vec<HashSet<String>>,
}

impl DependencyReader {
    pub fn new() -> Self {
        Self {
            deps: FileDependencies::default(),
            scopes: vec![HashSet::new()],
        }
    }

    /// Extract the dependencies of a chunk
    pub fn read(mut self, chunk: &Chunk) -> FileDependencies {
        self.read_block(&chunk.block);
        self.deps
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn read_block(&mut self, block: &Block) {
        self.scopes.push(HashSet::new());
        for stmt in &block.statements {
            self.read_statement(&stmt.kind);
        }
        self.scopes.pop();
    }

    fn read_statement(&mut self, kind: &StatementKind) {
        match kind {
            StatementKind::Local { names, values } => {
                for value in values {
                    self.read_expr(value);
                }
                for name in names {
                    self.declare(name);
                }
            }
            StatementKind::Assign { targets, values } => {
                for value in values {
                    self.read_expr(value);
                }
                for target in targets {
                    self.read_target(target);
                }
            }
            StatementKind::Call(expr) => self.read_expr(expr),
            StatementKind::Do(body) => self.read_block(body),
            StatementKind::While { condition, body } => {
                self.read_expr(condition);
                self.read_block(body);
            }
            StatementKind::Repeat { body, condition } => {
                // The condition sees the body's locals
                self.scopes.push(HashSet::new());
                for stmt in &body.statements {
                    self.read_statement(&stmt.kind);
                }
                self.read_expr(condition);
                self.scopes.pop();
            }
            StatementKind::If {
                clauses,
                else_block,
            } => {
                for (condition, body) in clauses {
                    self.read_expr(condition);
                    self.read_block(body);
                }
                if let Some(body) = else_block {
                    self.read_block(body);
                }
            }
            StatementKind::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => {
                self.read_expr(start);
                self.read_expr(limit);
                if let Some(step) = step {
                    self.read_expr(step);
                }
                self.scopes.push(HashSet::new());
                self.declare(var);
                self.read_block(body);
                self.scopes.pop();
            }
            StatementKind::GenericFor {
                names,
                iterators,
                body,
            } => {
                for iter in iterators {
                    self.read_expr(iter);
                }
                self.scopes.push(HashSet::new());
                for name in names {
                    self.declare(name);
                }
                self.read_block(body);
                self.scopes.pop();
            }
            StatementKind::Function { name, .. } => {
                let root = &name.path[0];
                if self.is_local(root) {
                    return;
                }
                if name.path.len() == 1 && name.method.is_none() {
                    self.deps.writes.insert(root.clone());
                } else {
                    self.deps.reads.insert(root.clone());
                }
            }
            StatementKind::LocalFunction { name, .. } => self.declare(name),
            StatementKind::Return(values) => {
                for value in values {
                    self.read_expr(value);
                }
            }
            StatementKind::Break | StatementKind::Goto(_) | StatementKind::Label(_) => {}
        }
    }

    fn read_target(&mut self, target: &Expr) {
        match &target.kind {
            ExprKind::Name(name) => {
                if !self.is_local(name) {
                    self.deps.writes.insert(name.clone());
                }
            }
            ExprKind::Member { object, .. } => self.read_expr(object),
            ExprKind::Index { object, key } => {
                self.read_expr(object);
                self.read_expr(key);
            }
            _ => self.read_expr(target),
        }
    }

    fn read_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Name(name) => {
                if !self.is_local(name) {
                    self.deps.reads.insert(name.clone());
                }
            }
            ExprKind::Member { object, .. } => self.read_expr(object),
            ExprKind::Index { object, key } => {
                self.read_expr(object);
                self.read_expr(key);
            }
            ExprKind::Call { callee, args } => {
                if let Some(target) = self.require_target(callee, args) {
                    self.deps.requires.insert(target);
                }
                self.read_expr(callee);
                for arg in args {
                    self.read_expr(arg);
                }
            }
            ExprKind::MethodCall { object, args, .. } => {
                self.read_expr(object);
                for arg in args {
                    self.read_expr(arg);
                }
            }
            ExprKind::Binary { left, right, .. } => {
                self.read_expr(left);
                self.read_expr(right);
            }
            ExprKind::Unary { operand, .. } => self.read_expr(operand),
            ExprKind::Paren(inner) => self.read_expr(inner),
            ExprKind::Table(fields) => {
                for field in fields {
                    match field {
                        TableField::Named { value, .. } => self.read_expr(value),
                        TableField::Keyed { key, value } => {
                            self.read_expr(key);
                            self.read_expr(value);
                        }
                        TableField::Positional(value) => self.read_expr(value),
                    }
                }
            }
            // Function bodies are not part of load-time behavior
            ExprKind::Function(_) => {}
            ExprKind::Nil
            | ExprKind::Boolean(_)
            | ExprKind::Number(_)
            | ExprKind::String(_)
            | ExprKind::Vararg => {}
        }
    }

    fn require_target(&self, callee: &Expr, args: &[Expr]) -> Option<String> {
        if callee.as_name() != Some("require") || self.is_local("require") {
            return None;
        }
        let name = args.first()?.unparen().as_str()?;
        Some(crate::normalize_require(name))
    }
}

impl Default for DependencyReader {
    fn default() -> Self {
        Self::new()
    }
}
