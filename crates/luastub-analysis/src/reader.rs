//! AST reader
//!
//! Walks one parsed chunk, lowers its expressions to IR and reports
//! definitions, usages, calls and returns to the `AnalysisContext`.
//! Lowering is cached per syntax node, so reading a node twice yields the
//! same `ExprId`.

use crate::context::AnalysisContext;
use crate::ir::{ExprId, Expression, Ident, Literal, Operator};
use crate::scope::ScopeTree;
use crate::symbol::{FunctionId, SymbolId};
use crate::types::TypeTag;
use luastub_ast::{
    BinaryOp, Block, Chunk, Expr, ExprKind, FunctionBody, FunctionName, NodeId, StatementKind,
    TableField, UnaryOp,
};
use std::collections::HashMap;

/// Names of the object table in closure-built classes
const INSTANCE_NAMES: [&str; 2] = ["self", "publ"];

pub struct AnalysisReader<'a> {
    ctx: &'a mut AnalysisContext,
    scope: ScopeTree,
    cache: HashMap<(NodeId, usize), ExprId>,
    frames: Vec<FunctionId>,
}

impl<'a> AnalysisReader<'a> {
    pub fn new(ctx: &'a mut AnalysisContext, module: &str) -> Self {
        let scope = ctx.begin_module(module);
        Self {
            ctx,
            scope,
            cache: HashMap::new(),
            frames: Vec::new(),
        }
    }

    /// Read the whole chunk and hand the scope tree to the context
    pub fn read(mut self, chunk: &Chunk) {
        self.read_statements(&chunk.block);
        let Self { ctx, scope, .. } = self;
        ctx.end_module(scope);
    }

    fn in_function(&self) -> bool {
        !self.frames.is_empty()
    }

    fn current_function(&self) -> Option<FunctionId> {
        self.frames.last().copied()
    }

    // ===== Statements =====

    fn read_block(&mut self, block: &Block) {
        self.scope.push_block();
        self.read_statements(block);
        self.scope.pop();
    }

    fn read_statements(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.read_statement(&stmt.kind);
        }
    }

    fn read_statement(&mut self, kind: &StatementKind) {
        match kind {
            StatementKind::Local { names, values } => self.read_local(names, values),
            StatementKind::Assign { targets, values } => self.read_assign(targets, values),
            StatementKind::Call(expr) => {
                self.read_expr(expr);
            }
            StatementKind::Do(body) => self.read_block(body),
            StatementKind::While { condition, body } => {
                self.read_expr(condition);
                self.read_block(body);
            }
            StatementKind::Repeat { body, condition } => {
                // `until` sees the body's locals
                self.scope.push_block();
                self.read_statements(body);
                self.read_expr(condition);
                self.scope.pop();
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
                let mut bounds = vec![self.read_expr(start), self.read_expr(limit)];
                if let Some(step) = step {
                    bounds.push(self.read_expr(step));
                }
                for &bound in &bounds {
                    self.ctx.add_usage(bound, &[TypeTag::Number]);
                }

                self.scope.push_block();
                let symbol = self.declare(var, false);
                let target = self.reference(symbol);
                let in_function = self.in_function();
                self.ctx.add_assignment(target, bounds[0], in_function);
                self.read_statements(body);
                self.scope.pop();
            }
            StatementKind::GenericFor {
                names,
                iterators,
                body,
            } => {
                for iter in iterators {
                    self.read_expr(iter);
                }
                self.scope.push_block();
                for name in names {
                    self.declare(name, false);
                }
                self.read_statements(body);
                self.scope.pop();
            }
            StatementKind::Function { name, func } => self.read_function_statement(name, func),
            StatementKind::LocalFunction { name, func } => {
                let symbol = self.declare(name, false);
                let function = self.read_function(func, Some(name.clone()), false, None);
                let target = self.reference(symbol);
                let value = self.function_literal(function);
                let in_function = self.in_function();
                self.ctx.add_assignment(target, value, in_function);
            }
            StatementKind::Return(values) => {
                let function = self.current_function();
                for (slot, value) in values.iter().enumerate() {
                    let id = self.read_expr(value);
                    self.ctx.add_return(function, slot, id);
                }
            }
            StatementKind::Break | StatementKind::Goto(_) | StatementKind::Label(_) => {}
        }
    }

    /// Bind a new local; module-level code gets module-level symbols
    fn declare(&mut self, name: &str, instance: bool) -> SymbolId {
        let alloc = self.ctx.allocator_mut();
        let symbol = if instance {
            self.scope.add_instance(alloc, name)
        } else {
            self.scope.add_local(alloc, name)
        };
        if !self.in_function() {
            self.ctx.mark_module_level(symbol);
        }
        symbol
    }

    fn reference(&mut self, symbol: SymbolId) -> ExprId {
        self.ctx
            .alloc_expr(Expression::Reference(Ident::Local(symbol)))
    }

    fn function_literal(&mut self, function: FunctionId) -> ExprId {
        self.ctx
            .alloc_expr(Expression::Literal(Literal::Function(function)))
    }

    fn read_local(&mut self, names: &[String], values: &[Expr]) {
        let hints: Vec<Option<String>> = names.iter().map(|n| Some(n.clone())).collect();
        let values = self.read_value_list(values, names.len(), &hints);
        let in_function = self.in_function();

        for (name, value) in names.iter().zip(values) {
            let closure_instance = in_function
                && value.is_some()
                && INSTANCE_NAMES.contains(&name.as_str());
            let symbol = self.declare(name, closure_instance);

            let Some(mut value) = value else {
                continue;
            };
            if closure_instance {
                if let Some(function) = self.current_function() {
                    value = self
                        .ctx
                        .add_closure_candidate(function, symbol, value)
                        .unwrap_or(value);
                }
            }
            let target = self.reference(symbol);
            self.ctx.add_assignment(target, value, in_function);
        }
    }

    fn read_assign(&mut self, targets: &[Expr], values: &[Expr]) {
        let hints: Vec<Option<String>> = targets.iter().map(display_name).collect();
        let values = self.read_value_list(values, targets.len(), &hints);
        let in_function = self.in_function();

        for (target, value) in targets.iter().zip(values) {
            let target = self.read_target(target);
            let value = match value {
                Some(value) => value,
                None => self.ctx.alloc_expr(Expression::Literal(Literal::Nil)),
            };
            self.ctx.add_assignment(target, value, in_function);
        }
    }

    /// Lower the values of an assignment list, one per target
    ///
    /// A trailing call or `...` fills the remaining targets from its later
    /// return slots.
    fn read_value_list(
        &mut self,
        values: &[Expr],
        targets: usize,
        hints: &[Option<String>],
    ) -> Vec<Option<ExprId>> {
        let mut result = Vec::with_capacity(targets);
        for (i, value) in values.iter().enumerate() {
            let hint = hints.get(i).cloned().flatten();
            result.push(Some(self.read_value(value, hint)));
        }

        if let Some(last) = values.last() {
            if last.is_multi_value() {
                for slot in 1..=targets.saturating_sub(values.len()) {
                    result.push(Some(self.read_expr_slot(last, slot)));
                }
            }
        }
        result.resize(targets.max(result.len()), None);
        result.truncate(targets);
        result
    }

    /// Lower a value, naming it after its target when it is a function
    fn read_value(&mut self, value: &Expr, name: Option<String>) -> ExprId {
        match &value.unparen().kind {
            ExprKind::Function(body) => {
                if let Some(&id) = self.cache.get(&(value.id, 0)) {
                    return id;
                }
                let function = self.read_function(body, name, false, None);
                let id = self.function_literal(function);
                self.cache.insert((value.id, 0), id);
                id
            }
            _ => self.read_expr(value),
        }
    }

    /// Lower an assignment target
    fn read_target(&mut self, target: &Expr) -> ExprId {
        let id = self.read_expr(target);
        if let Expression::Member { base, .. } | Expression::Index { base, .. } = self.ctx.expr(id) {
            let base = *base;
            self.ctx.add_usage(base, &[TypeTag::Table]);
        }
        id
    }

    fn read_function_statement(&mut self, name: &FunctionName, func: &FunctionBody) {
        let colon = name.method.is_some();
        let (base_path, key) = match &name.method {
            Some(method) => (&name.path[..], method.as_str()),
            None => match name.path.split_last() {
                Some((last, rest)) => (rest, last.as_str()),
                None => return,
            },
        };

        let base = self.read_name_path(base_path);
        if let Some(base) = base {
            self.ctx.add_usage(base, &[TypeTag::Table]);
        }
        let function = self.read_function(func, Some(name.display()), colon, base);
        let value = self.function_literal(function);
        let target = match base {
            Some(base) => self.ctx.alloc_expr(Expression::Member {
                base,
                name: key.to_string(),
            }),
            None => {
                let ident = self.ident(key);
                self.ctx.alloc_expr(Expression::Reference(ident))
            }
        };

        let in_function = self.in_function();
        self.ctx.add_assignment(target, value, in_function);
        if let Some(base) = base {
            self.ctx.method_defined(base, key, function, colon);
        }
    }

    /// `a.b.c` as nested member expressions
    fn read_name_path(&mut self, path: &[String]) -> Option<ExprId> {
        let (first, rest) = path.split_first()?;
        let ident = self.ident(first);
        let mut expr = self.ctx.alloc_expr(Expression::Reference(ident));
        for name in rest {
            expr = self.ctx.alloc_expr(Expression::Member {
                base: expr,
                name: name.clone(),
            });
        }
        Some(expr)
    }

    fn ident(&self, name: &str) -> Ident {
        match self.scope.get_local_id(name) {
            Some(symbol) => Ident::Local(symbol),
            None => Ident::Global(name.to_string()),
        }
    }

    /// Read a function body in its own scope
    ///
    /// Methods get an implicit `self` defined as the receiver; so does an
    /// explicit leading `self` parameter when there is a receiver.
    fn read_function(
        &mut self,
        body: &FunctionBody,
        name: Option<String>,
        colon: bool,
        receiver: Option<ExprId>,
    ) -> FunctionId {
        let function = self.ctx.new_function(name);
        if let Some(receiver) = receiver {
            self.ctx.set_receiver(function, receiver);
        }
        self.scope.push_function(function);
        self.frames.push(function);

        let mut params = Vec::new();
        let explicit_self = receiver.is_some() && body.params.first().map(String::as_str) == Some("self");
        if colon || explicit_self {
            let symbol = self.scope.add_self_parameter(self.ctx.allocator_mut());
            if let Some(receiver) = receiver {
                self.ctx.define_self(symbol, receiver);
            }
            params.push(("self".to_string(), symbol));
        }
        let skip = usize::from(explicit_self && !colon);
        for param in body.params.iter().skip(skip) {
            let symbol = self.scope.add_parameter(self.ctx.allocator_mut(), param);
            params.push((param.clone(), symbol));
        }
        self.ctx.set_parameters(function, params, body.is_vararg, colon);

        self.read_statements(&body.body);
        self.ctx.end_function(function);

        self.frames.pop();
        self.scope.pop();
        function
    }

    // ===== Expressions =====

    fn read_expr(&mut self, expr: &Expr) -> ExprId {
        self.read_expr_slot(expr, 0)
    }

    /// Lower an expression, picking return slot `slot` of a call
    fn read_expr_slot(&mut self, expr: &Expr, slot: usize) -> ExprId {
        if let Some(&id) = self.cache.get(&(expr.id, slot)) {
            return id;
        }
        let id = if slot == 0 {
            self.lower(expr)
        } else {
            let first = self.read_expr_slot(expr, 0);
            self.with_slot(first, slot)
        };
        self.cache.insert((expr.id, slot), id);
        id
    }

    fn with_slot(&mut self, expr: ExprId, slot: usize) -> ExprId {
        let slotted = match self.ctx.expr(expr) {
            Expression::Operation {
                op: Operator::Call { .. },
                args,
            } => Expression::Operation {
                op: Operator::Call { slot },
                args: args.clone(),
            },
            Expression::Require { name, target, .. } => Expression::Require {
                name: name.clone(),
                target: target.clone(),
                slot,
            },
            _ => Expression::Vararg,
        };
        self.ctx.alloc_expr(slotted)
    }

    fn lower(&mut self, expr: &Expr) -> ExprId {
        let lowered = match &expr.kind {
            ExprKind::Nil => Expression::Literal(Literal::Nil),
            ExprKind::Boolean(b) => Expression::Literal(Literal::Boolean(*b)),
            ExprKind::Number(n) => Expression::Literal(Literal::Number(n.clone())),
            ExprKind::String(s) => Expression::Literal(Literal::String(s.clone())),
            ExprKind::Vararg => Expression::Vararg,
            ExprKind::Paren(inner) => return self.read_expr(inner),
            ExprKind::Function(body) => {
                let function = self.read_function(body, None, false, None);
                Expression::Literal(Literal::Function(function))
            }
            ExprKind::Table(fields) => return self.read_table(fields),
            ExprKind::Name(name) => Expression::Reference(self.ident(name)),
            ExprKind::Member { object, name } => {
                let base = self.read_expr(object);
                self.ctx.add_usage(base, &[TypeTag::Table, TypeTag::String]);
                Expression::Member {
                    base,
                    name: name.clone(),
                }
            }
            ExprKind::Index { object, key } => {
                let base = self.read_expr(object);
                self.ctx.add_usage(base, &[TypeTag::Table, TypeTag::String]);
                let index = self.read_expr(key);
                Expression::Index { base, index }
            }
            ExprKind::Call { callee, args } => {
                if let Some(require) = self.read_require(callee, args) {
                    return require;
                }
                let callee = self.read_expr(callee);
                let mut operands = vec![callee];
                operands.extend(args.iter().map(|a| self.read_expr(a)));
                return self.emit_call(operands);
            }
            ExprKind::MethodCall {
                object,
                method,
                args,
            } => {
                let object = self.read_expr(object);
                self.ctx.add_usage(object, &[TypeTag::Table, TypeTag::String]);
                let callee = self.ctx.alloc_expr(Expression::Member {
                    base: object,
                    name: method.clone(),
                });
                let mut operands = vec![callee, object];
                operands.extend(args.iter().map(|a| self.read_expr(a)));
                return self.emit_call(operands);
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.read_expr(left);
                let right = self.read_expr(right);
                let allowed: &[TypeTag] = match op {
                    BinaryOp::Concat => &[TypeTag::String, TypeTag::Number],
                    op if op.is_arithmetic() || op.is_bitwise() => &[TypeTag::Number],
                    _ => &[],
                };
                if !allowed.is_empty() {
                    self.ctx.add_usage(left, allowed);
                    self.ctx.add_usage(right, allowed);
                }
                Expression::Operation {
                    op: Operator::Binary(*op),
                    args: vec![left, right],
                }
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.read_expr(operand);
                match op {
                    UnaryOp::Len => self
                        .ctx
                        .add_usage(operand, &[TypeTag::Table, TypeTag::String]),
                    UnaryOp::Neg | UnaryOp::BitNot => {
                        self.ctx.add_usage(operand, &[TypeTag::Number])
                    }
                    UnaryOp::Not => {}
                }
                Expression::Operation {
                    op: Operator::Unary(*op),
                    args: vec![operand],
                }
            }
        };
        self.ctx.alloc_expr(lowered)
    }

    fn emit_call(&mut self, operands: Vec<ExprId>) -> ExprId {
        if let Some(&callee) = operands.first() {
            self.ctx.add_usage(callee, &[TypeTag::Function]);
        }
        let call = self.ctx.alloc_expr(Expression::Operation {
            op: Operator::Call { slot: 0 },
            args: operands,
        });
        self.ctx.add_call(call);
        call
    }

    /// `require("name")` with a literal name and the global `require`
    fn read_require(&mut self, callee: &Expr, args: &[Expr]) -> Option<ExprId> {
        if callee.as_name() != Some("require") || self.scope.has_local("require") {
            return None;
        }
        let name = args.first()?.unparen().as_str()?.to_string();
        let target = self.ctx.resolve_require(&name);
        Some(self.ctx.alloc_expr(Expression::Require {
            name,
            target,
            slot: 0,
        }))
    }

    fn read_table(&mut self, fields: &[TableField]) -> ExprId {
        let table = self.ctx.new_table("table");
        let literal = self
            .ctx
            .alloc_expr(Expression::Literal(Literal::Table(table)));
        let in_function = self.in_function();
        let mut position = 0usize;

        for field in fields {
            match field {
                TableField::Named { name, value } => {
                    let value = self.read_value(value, Some(name.clone()));
                    self.ctx.add_table_field(table, name, value, in_function);
                }
                TableField::Keyed { key, value } => {
                    let key_id = self.read_expr(key);
                    let value = self.read_value(value, key.as_str().map(str::to_string));
                    if let Some(name) = key.as_str() {
                        self.ctx.add_table_field(table, name, value, in_function);
                    } else if let Expression::Literal(Literal::Number(n)) = self.ctx.expr(key_id) {
                        let n = n.clone();
                        self.ctx.add_table_field(table, &n, value, in_function);
                    }
                }
                TableField::Positional(value) => {
                    position += 1;
                    let value = self.read_value(value, None);
                    self.ctx
                        .add_table_field(table, &position.to_string(), value, in_function);
                }
            }
        }
        literal
    }
}

/// Dotted name of an assignment target, when it has one
fn display_name(expr: &Expr) -> Option<String> {
    match &expr.unparen().kind {
        ExprKind::Name(name) => Some(name.clone()),
        ExprKind::Member { object, name } => {
            display_name(object).map(|base| format!("{}.{}", base, name))
        }
        _ => None,
    }
}

/// Read one chunk into the context as module `id`
pub fn read_module(ctx: &mut AnalysisContext, id: &str, chunk: &Chunk) {
    AnalysisReader::new(ctx, id).read(chunk);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeSet;

    fn read(ctx: &mut AnalysisContext, id: &str, source: &str) {
        let chunk = luastub_parser::parse(source).expect("parse failed");
        read_module(ctx, id, &chunk);
    }

    fn context() -> AnalysisContext {
        AnalysisContext::new(vec!["shared".into(), "client".into()])
    }

    fn returned(ctx: &AnalysisContext, module: usize, slot: usize) -> ExprId {
        ctx.modules[module].returns[slot][0].expr
    }

    #[test]
    fn test_same_node_lowers_once() {
        let source = "local t = {}\nreturn t";
        let chunk = luastub_parser::parse(source).expect("parse failed");
        let value = match &chunk.block.statements[0].kind {
            StatementKind::Local { values, .. } => &values[0],
            other => panic!("Expected local, got {:?}", other),
        };

        let mut ctx = context();
        let mut reader = AnalysisReader::new(&mut ctx, "shared/test");
        let first = reader.read_expr(value);
        let second = reader.read_expr(value);
        assert_eq!(first, second);
    }

    #[test]
    fn test_multiple_assignment_from_call() {
        let mut ctx = context();
        read(
            &mut ctx,
            "shared/test",
            "local function f() return 1, 'two' end\nlocal a, b = f()\nreturn a, b",
        );
        assert_eq!(ctx.resolve(returned(&ctx, 0, 0)), TypeSet::single(TypeTag::Number));
        assert_eq!(ctx.resolve(returned(&ctx, 0, 1)), TypeSet::single(TypeTag::String));
    }

    #[test]
    fn test_method_self_is_receiver_instance() {
        let mut ctx = context();
        read(
            &mut ctx,
            "shared/test",
            "Foo = {}\nfunction Foo:get() return self end",
        );
        let function = ctx
            .functions
            .values()
            .find(|f| f.name.as_deref() == Some("Foo:get"))
            .expect("method missing");
        assert!(function.is_method);
        assert_eq!(function.param_names, vec!["self"]);

        let types = ctx.resolve(function.returns[0][0]);
        assert!(types.is_instance());
        assert!(types.single_table().is_some());
    }

    #[test]
    fn test_require_resolves_through_alias() {
        let mut ctx = context();
        ctx.register_module("shared/util/Strings");
        ctx.register_module("shared/Main");
        read(&mut ctx, "shared/util/Strings", "return { trim = function(s) return s end }");
        read(&mut ctx, "shared/Main", "Strings = require('util.Strings')\nreturn Strings");

        let types = ctx.resolve(returned(&ctx, 1, 0));
        assert!(types.single_table().is_some());
        assert_eq!(
            ctx.modules[1].requires.get("Strings").map(String::as_str),
            Some("shared/util/Strings")
        );
        assert!(ctx.take_diagnostics().is_empty());
    }

    #[test]
    fn test_require_before_read_is_reported() {
        let mut ctx = context();
        ctx.register_module("shared/a");
        ctx.register_module("shared/b");
        read(&mut ctx, "shared/a", "local b = require('b')\nreturn b");
        let diagnostics = ctx.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "E-ANA-003");
    }

    #[test]
    fn test_numeric_for_bounds_are_numbers() {
        let mut ctx = context();
        read(&mut ctx, "shared/test", "function f(n)\n  for i = 1, n do end\nend");
        let function = ctx.functions.values().next().expect("function missing");
        let n = Ident::Local(function.params[0]);
        assert_eq!(
            ctx.usage(&crate::context::UsageKey::Symbol(n)),
            Some(&TypeSet::single(TypeTag::Number))
        );
    }

    #[test]
    fn test_positional_items_are_numbered_fields() {
        let mut ctx = context();
        read(
            &mut ctx,
            "shared/test",
            "local t = { 'a', x = true, 5 }\nreturn t[1], t[2], t[3]",
        );
        assert_eq!(ctx.resolve(returned(&ctx, 0, 0)), TypeSet::single(TypeTag::String));
        assert_eq!(ctx.resolve(returned(&ctx, 0, 1)), TypeSet::single(TypeTag::Number));
        assert!(ctx.resolve(returned(&ctx, 0, 2)).is_empty());
    }

    #[test]
    fn test_locals_shadow_and_scope() {
        let mut ctx = context();
        read(
            &mut ctx,
            "shared/test",
            "local x = 1\ndo local x = 'inner' end\nreturn x",
        );
        assert_eq!(ctx.resolve(returned(&ctx, 0, 0)), TypeSet::single(TypeTag::Number));
    }
}
