//! Recursive, memoized type resolution

use super::{AnalysisContext, MAX_RESOLVE_DEPTH};
use crate::ir::{ExprId, Expression, Ident, Literal, Operator};
use crate::types::{TypeSet, TypeTag};
use luastub_ast::{BinaryOp, UnaryOp};
use std::collections::HashMap;
use tracing::trace;

/// Memo of one resolution; an entry is a placeholder while in progress
pub(crate) type Seen = HashMap<ExprId, TypeSet>;

impl AnalysisContext {
    /// Resolve the types of an expression
    pub fn resolve(&self, expr: ExprId) -> TypeSet {
        let mut seen = Seen::new();
        self.resolve_types(expr, &mut seen, 0)
    }

    /// Resolve with a shared memo
    ///
    /// Re-entering an expression returns what has been computed for it so
    /// far, which ends reference cycles.
    pub(crate) fn resolve_types(&self, expr: ExprId, seen: &mut Seen, depth: usize) -> TypeSet {
        if let Some(types) = seen.get(&expr) {
            return types.clone();
        }
        if depth > MAX_RESOLVE_DEPTH {
            trace!(expr = expr.0, "resolution depth exceeded");
            return TypeSet::new();
        }

        seen.insert(expr, TypeSet::new());
        let raw = self.resolve_raw(expr, seen, depth + 1);
        let types = self.narrow(expr, raw);
        seen.insert(expr, types.clone());
        types
    }

    fn resolve_raw(&self, expr: ExprId, seen: &mut Seen, depth: usize) -> TypeSet {
        match self.exprs.get(expr) {
            Expression::Literal(literal) => self.literal_types(literal),
            Expression::Reference(ident) => self.resolve_ident(ident, seen, depth),
            Expression::Member { base, name } => self.resolve_field(*base, name, seen, depth),
            Expression::Index { base, index } => match self.field_key(*index) {
                Some(key) => self.resolve_field(*base, &key, seen, depth),
                None => TypeSet::new(),
            },
            Expression::Require { target, slot, .. } => match target {
                Some(target) => self.resolve_module_return(target, *slot, seen, depth),
                None => TypeSet::new(),
            },
            Expression::Operation { op, args } => self.resolve_operation(op, args, seen, depth),
            Expression::Vararg => TypeSet::new(),
        }
    }

    fn literal_types(&self, literal: &Literal) -> TypeSet {
        match literal {
            Literal::Nil => TypeSet::single(TypeTag::Nil),
            Literal::Boolean(true) => TypeSet::single(TypeTag::True),
            Literal::Boolean(false) => TypeSet::single(TypeTag::False),
            Literal::Number(_) => TypeSet::single(TypeTag::Number),
            Literal::String(_) => TypeSet::single(TypeTag::String),
            Literal::Function(f) => TypeSet::single(TypeTag::FunctionRef(*f)),
            Literal::Table(t) => match self.tables.get(t).and_then(|info| info.instance_of) {
                Some(class) => [TypeTag::TableRef(class), TypeTag::Instance].into_iter().collect(),
                None => TypeSet::single(TypeTag::TableRef(*t)),
            },
        }
    }

    /// Whether a definition holds a table later replaced by a class
    pub(crate) fn is_replaced_table(&self, expr: ExprId) -> bool {
        self.literal_table(expr)
            .and_then(|t| self.tables.get(&t))
            .map(|t| t.is_empty_class)
            .unwrap_or(false)
    }

    /// Bindings visible to module-level code
    pub(crate) fn is_module_level(&self, ident: &Ident) -> bool {
        match ident {
            Ident::Global(_) => true,
            Ident::Local(sym) => self.module_level.contains(sym),
        }
    }

    /// Union of every definition of a name
    ///
    /// A module-level binding only ever assigned inside functions may still
    /// be unset when read, so it also gets `nil`.
    pub(crate) fn resolve_ident(&self, ident: &Ident, seen: &mut Seen, depth: usize) -> TypeSet {
        let defs = self.definitions(ident);
        let mut types = TypeSet::new();
        let mut has_load_time_definition = false;

        for def in defs {
            if self.is_replaced_table(def.expr) {
                continue;
            }
            has_load_time_definition |= !def.in_function;
            let mut resolved = self.resolve_types(def.expr, seen, depth);
            if def.instance && resolved.tables().next().is_some() {
                resolved.insert(TypeTag::Instance);
            }
            types.extend(&resolved);
        }

        if !defs.is_empty() && !has_load_time_definition && self.is_module_level(ident) {
            types.insert(TypeTag::Nil);
        }
        types
    }

    fn resolve_field(&self, base: ExprId, key: &str, seen: &mut Seen, depth: usize) -> TypeSet {
        let base_types = self.resolve_types(base, seen, depth);
        let mut types = TypeSet::new();
        for table in base_types.tables() {
            for def in self.field_definitions(table, key) {
                if self.is_replaced_table(def.expr) {
                    continue;
                }
                types.extend(&self.resolve_types(def.expr, seen, depth));
            }
        }
        types
    }

    fn resolve_module_return(&self, module: &str, slot: usize, seen: &mut Seen, depth: usize) -> TypeSet {
        let mut types = TypeSet::new();
        let Some(record) = self.module_by_id(module) else {
            return types;
        };
        if let Some(defs) = record.returns.get(slot) {
            for def in defs {
                types.extend(&self.resolve_types(def.expr, seen, depth));
            }
        }
        types
    }

    fn resolve_operation(&self, op: &Operator, args: &[ExprId], seen: &mut Seen, depth: usize) -> TypeSet {
        match op {
            Operator::Binary(op) => {
                let (Some(&left), Some(&right)) = (args.first(), args.get(1)) else {
                    return TypeSet::new();
                };
                match op {
                    BinaryOp::And => {
                        let left = self.resolve_types(left, seen, depth);
                        match left.truthiness() {
                            Some(true) => self.resolve_types(right, seen, depth),
                            Some(false) => left,
                            None => {
                                let mut types = left.falsy_part();
                                types.extend(&self.resolve_types(right, seen, depth));
                                types
                            }
                        }
                    }
                    BinaryOp::Or => {
                        if let Some(types) = self.resolve_ternary(left, right, seen, depth) {
                            return types;
                        }
                        let left = self.resolve_types(left, seen, depth);
                        match left.truthiness() {
                            Some(true) => left,
                            Some(false) => self.resolve_types(right, seen, depth),
                            None => {
                                let mut types = left.truthy_part();
                                types.extend(&self.resolve_types(right, seen, depth));
                                types
                            }
                        }
                    }
                    BinaryOp::Concat => TypeSet::single(TypeTag::String),
                    op if op.is_comparison() => TypeSet::single(TypeTag::Boolean),
                    _ => TypeSet::single(TypeTag::Number),
                }
            }
            Operator::Unary(UnaryOp::Not) => {
                let Some(&operand) = args.first() else {
                    return TypeSet::single(TypeTag::Boolean);
                };
                if self.is_constant(operand) {
                    match self.resolve_types(operand, seen, depth).truthiness() {
                        Some(true) => return TypeSet::single(TypeTag::False),
                        Some(false) => return TypeSet::single(TypeTag::True),
                        None => {}
                    }
                }
                TypeSet::single(TypeTag::Boolean)
            }
            Operator::Unary(_) => TypeSet::single(TypeTag::Number),
            Operator::Call { slot } => self.resolve_call(args, *slot, seen, depth),
        }
    }

    /// `c and a or b`: `a` when `c` holds and `a` is truthy, else `b`
    fn resolve_ternary(
        &self,
        left: ExprId,
        right: ExprId,
        seen: &mut Seen,
        depth: usize,
    ) -> Option<TypeSet> {
        let Expression::Operation {
            op: Operator::Binary(BinaryOp::And),
            args,
        } = self.exprs.get(left)
        else {
            return None;
        };
        let (&condition, &then) = (args.first()?, args.get(1)?);

        let condition = self.resolve_types(condition, seen, depth).truthiness();
        let then = self.resolve_types(then, seen, depth);
        let mut types = TypeSet::new();
        if condition != Some(false) {
            types.extend(&then.truthy_part());
        }
        if condition != Some(true) || then.truthiness() != Some(true) {
            types.extend(&self.resolve_types(right, seen, depth));
        }
        Some(types)
    }

    /// Literal scalars, possibly negated with `not`
    fn is_constant(&self, expr: ExprId) -> bool {
        match self.exprs.get(expr) {
            Expression::Literal(Literal::Table(_) | Literal::Function(_)) => false,
            Expression::Literal(_) => true,
            Expression::Operation {
                op: Operator::Unary(UnaryOp::Not),
                args,
            } => args.first().map(|&a| self.is_constant(a)).unwrap_or(false),
            _ => false,
        }
    }

    fn resolve_call(&self, args: &[ExprId], slot: usize, seen: &mut Seen, depth: usize) -> TypeSet {
        let Some((&callee, rest)) = args.split_first() else {
            return TypeSet::new();
        };
        if let Some(types) = self.resolve_builtin_call(callee, rest, slot, seen, depth) {
            return types;
        }

        let callee_types = self.resolve_types(callee, seen, depth);
        let Some(function) = callee_types.single_function() else {
            return TypeSet::new();
        };
        let Some(info) = self.functions.get(&function) else {
            return TypeSet::new();
        };

        if let Some(class) = info.constructs {
            if slot == 0 {
                return [TypeTag::TableRef(class), TypeTag::Instance].into_iter().collect();
            }
        }

        let mut types = TypeSet::new();
        if let Some(returns) = info.returns.get(slot) {
            for &expr in returns {
                types.extend(&self.resolve_types(expr, seen, depth));
            }
        }
        types
    }

    /// Standard functions, unless the project defines its own
    fn resolve_builtin_call(
        &self,
        callee: ExprId,
        args: &[ExprId],
        slot: usize,
        seen: &mut Seen,
        depth: usize,
    ) -> Option<TypeSet> {
        let Expression::Reference(ident @ Ident::Global(name)) = self.exprs.get(callee) else {
            return None;
        };
        if !self.definitions(ident).is_empty() || slot != 0 {
            return None;
        }
        match name.as_str() {
            "tonumber" => Some([TypeTag::Number, TypeTag::Nil].into_iter().collect()),
            "tostring" | "type" => Some(TypeSet::single(TypeTag::String)),
            "setmetatable" => Some(
                args.first()
                    .map(|&a| self.resolve_types(a, seen, depth))
                    .unwrap_or_default(),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Ident;

    fn read(source: &str) -> AnalysisContext {
        let chunk = luastub_parser::parse(source).expect("parse failed");
        let mut ctx = AnalysisContext::new(vec!["shared".into()]);
        crate::reader::read_module(&mut ctx, "shared/test", &chunk);
        ctx
    }

    /// First expression returned from the module in `slot`
    fn returned(ctx: &AnalysisContext, slot: usize) -> ExprId {
        ctx.modules[0].returns[slot][0].expr
    }

    fn set(tags: &[TypeTag]) -> TypeSet {
        tags.iter().copied().collect()
    }

    #[test]
    fn test_self_reference_terminates() {
        let ctx = read("local t = {}\nt.self = t\nreturn t.self");
        let types = ctx.resolve(returned(&ctx, 0));
        assert!(types.single_table().is_some());
    }

    #[test]
    fn test_field_cycle_resolves_to_empty() {
        let ctx = read("local t = {}\nt.loop = t.loop\nreturn t.loop");
        assert!(ctx.resolve(returned(&ctx, 0)).is_empty());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let ctx = read("local x = 1\nif c then x = 'a' end\nreturn x");
        let expr = returned(&ctx, 0);
        let first = ctx.resolve(expr);
        assert_eq!(first, set(&[TypeTag::Number, TypeTag::String]));
        assert_eq!(ctx.resolve(expr), first);
    }

    #[test]
    fn test_operators() {
        let ctx = read("return 1 .. 2, 1 < 2, #t, -x, not nil, not y");
        assert_eq!(ctx.resolve(returned(&ctx, 0)), set(&[TypeTag::String]));
        assert_eq!(ctx.resolve(returned(&ctx, 1)), set(&[TypeTag::Boolean]));
        assert_eq!(ctx.resolve(returned(&ctx, 2)), set(&[TypeTag::Number]));
        assert_eq!(ctx.resolve(returned(&ctx, 3)), set(&[TypeTag::Number]));
        assert_eq!(ctx.resolve(returned(&ctx, 4)), set(&[TypeTag::True]));
        assert_eq!(ctx.resolve(returned(&ctx, 5)), set(&[TypeTag::Boolean]));
    }

    #[test]
    fn test_ternary_idiom() {
        let ctx = read("return c and 1 or 'x', true and 1 or 'x', d and nil or 'x'");
        assert_eq!(
            ctx.resolve(returned(&ctx, 0)),
            set(&[TypeTag::Number, TypeTag::String])
        );
        assert_eq!(ctx.resolve(returned(&ctx, 1)), set(&[TypeTag::Number]));
        assert_eq!(ctx.resolve(returned(&ctx, 2)), set(&[TypeTag::String]));
    }

    #[test]
    fn test_builtins_unless_redefined() {
        let ctx = read("return tonumber(s), tostring(1)");
        assert_eq!(
            ctx.resolve(returned(&ctx, 0)),
            set(&[TypeTag::Number, TypeTag::Nil])
        );
        assert_eq!(ctx.resolve(returned(&ctx, 1)), set(&[TypeTag::String]));

        let ctx = read("function tostring(x) return 1 end\nreturn tostring(2)");
        assert_eq!(ctx.resolve(returned(&ctx, 0)), set(&[TypeTag::Number]));
    }

    #[test]
    fn test_module_level_local_set_only_in_functions_may_be_nil() {
        let ctx = read("local x\nfunction set() x = 5 end\nreturn x");
        assert_eq!(
            ctx.resolve(returned(&ctx, 0)),
            set(&[TypeTag::Number, TypeTag::Nil])
        );
    }

    #[test]
    fn test_unknown_global_is_empty() {
        let ctx = read("return Unknown");
        assert!(ctx.resolve(returned(&ctx, 0)).is_empty());
        assert!(ctx.definitions(&Ident::Global("Unknown".into())).is_empty());
    }
}
