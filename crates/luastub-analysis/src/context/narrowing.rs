//! Usage-based narrowing
//!
//! Each syntactic use of an expression rules some types out: `a .. b`
//! needs strings or numbers, `t[k]` needs a table or string, `f()` needs a
//! function. Constraints on a reference are shared by every reference to
//! the same name.

use super::AnalysisContext;
use crate::ir::{ExprId, Expression, Ident};
use crate::types::{TypeSet, TypeTag};

/// What a usage constraint is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UsageKey {
    Symbol(Ident),
    Expr(ExprId),
}

impl AnalysisContext {
    pub(crate) fn usage_key(&self, expr: ExprId) -> UsageKey {
        match self.exprs.get(expr) {
            Expression::Reference(ident) => UsageKey::Symbol(ident.clone()),
            _ => UsageKey::Expr(expr),
        }
    }

    /// Record that `expr` is used where only `allowed` makes sense
    pub fn add_usage(&mut self, expr: ExprId, allowed: &[TypeTag]) {
        let key = self.usage_key(expr);
        let constraint = self.usages.entry(key).or_insert_with(TypeSet::usage_domain);
        let remaining: TypeSet = constraint
            .iter()
            .filter(|tag| allowed.contains(tag))
            .collect();
        *constraint = remaining;
    }

    /// Accumulated constraint for a key
    pub fn usage(&self, key: &UsageKey) -> Option<&TypeSet> {
        self.usages.get(key)
    }

    pub(crate) fn narrow(&self, expr: ExprId, types: TypeSet) -> TypeSet {
        let key = self.usage_key(expr);
        self.narrow_with(&key, types)
    }

    /// Drop tags the recorded usage rules out
    ///
    /// A constraint that would leave nothing is unreliable and ignored.
    pub(crate) fn narrow_with(&self, key: &UsageKey, types: TypeSet) -> TypeSet {
        let Some(constraint) = self.usages.get(key) else {
            return types;
        };
        if constraint.is_empty() {
            return types;
        }

        let narrowed: TypeSet = types
            .iter()
            .filter(|tag| *tag == TypeTag::Instance || constraint.contains(tag.basic()))
            .collect();
        if narrowed.without_marker().is_empty() {
            types
        } else {
            narrowed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Literal;
    use crate::symbol::SymbolKind;

    fn context() -> AnalysisContext {
        let mut ctx = AnalysisContext::new(vec!["shared".into()]);
        let scope = ctx.begin_module("shared/test");
        ctx.end_module(scope);
        ctx
    }

    #[test]
    fn test_usage_eliminates_tags() {
        let mut ctx = context();
        let x = ctx.allocator_mut().symbol(SymbolKind::Local, "x");
        let reference = ctx.alloc_expr(Expression::Reference(Ident::Local(x)));

        ctx.add_usage(reference, &[TypeTag::String, TypeTag::Number]);
        ctx.add_usage(reference, &[TypeTag::Number]);

        let key = UsageKey::Symbol(Ident::Local(x));
        assert_eq!(ctx.usage(&key), Some(&TypeSet::single(TypeTag::Number)));
    }

    #[test]
    fn test_narrowing_keeps_consistent_tags() {
        let mut ctx = context();
        let x = ctx.allocator_mut().symbol(SymbolKind::Local, "x");
        let reference = ctx.alloc_expr(Expression::Reference(Ident::Local(x)));
        ctx.add_usage(reference, &[TypeTag::Number]);

        let types: TypeSet = [TypeTag::Number, TypeTag::Nil].into_iter().collect();
        assert_eq!(ctx.narrow(reference, types), TypeSet::single(TypeTag::Number));
    }

    #[test]
    fn test_narrowing_never_empties() {
        let mut ctx = context();
        let literal = ctx.alloc_expr(Expression::Literal(Literal::String("s".into())));
        ctx.add_usage(literal, &[TypeTag::Function]);

        let types = TypeSet::single(TypeTag::String);
        assert_eq!(ctx.narrow(literal, types.clone()), types);
    }

    #[test]
    fn test_contradictory_usage_is_ignored() {
        let mut ctx = context();
        let g = ctx.alloc_expr(Expression::Reference(Ident::Global("g".into())));
        ctx.add_usage(g, &[TypeTag::Function]);
        ctx.add_usage(g, &[TypeTag::Number]);

        let types: TypeSet = [TypeTag::Number, TypeTag::String].into_iter().collect();
        assert_eq!(ctx.narrow(g, types.clone()), types);
    }
}
