//! Class detection idioms
//!
//! Lua has no class syntax, so classes are recognized from conventions.
//! Each convention is a `ClassIdiom`; the context offers every event to
//! the idioms in priority order and the first match handles it.

use super::AnalysisContext;
use crate::ir::{ExprId, Expression, Ident, Literal};
use crate::symbol::{FunctionId, TableId};
use tracing::{debug, trace};

/// Marker field of the UI node framework's class tables
const ATOM_UI_MARKER: &str = "_ATOM_UI_CLASS";

/// Events the reader reports that may reveal a class
#[derive(Debug, Clone)]
pub enum IdiomEvent {
    Assignment {
        target: ExprId,
        value: ExprId,
    },
    MethodDefinition {
        base: ExprId,
        method: String,
        function: FunctionId,
        colon: bool,
    },
    Call {
        call: ExprId,
    },
    FunctionEnd {
        function: FunctionId,
    },
}

/// One way of writing a class in Lua
pub trait ClassIdiom {
    fn name(&self) -> &'static str;

    fn matches(&self, ctx: &AnalysisContext, event: &IdiomEvent) -> bool;

    /// Record the class; for assignments, may return the value the target
    /// should be defined with instead
    fn apply(&self, ctx: &mut AnalysisContext, event: &IdiomEvent) -> Option<ExprId>;
}

/// All idioms, highest priority first
pub fn class_idioms() -> [&'static dyn ClassIdiom; 5] {
    [
        &AtomUiClass,
        &DeriveClass,
        &ConstructorClass,
        &MetatableInstance,
        &ClosureClass,
    ]
}

impl AnalysisContext {
    pub(crate) fn dispatch(&mut self, event: &IdiomEvent) -> Option<ExprId> {
        for idiom in class_idioms() {
            if idiom.matches(self, event) {
                trace!(idiom = idiom.name(), "class idiom matched");
                return idiom.apply(self, event);
            }
        }
        None
    }

    /// Single table an expression resolves to, seen through instances
    fn class_table(&self, expr: ExprId) -> Option<TableId> {
        let table = self.resolve(expr).single_table()?;
        Some(
            self.tables
                .get(&table)
                .and_then(|t| t.instance_of)
                .unwrap_or(table),
        )
    }

    /// Name and locality of an assignment target
    fn target_name(&self, target: ExprId) -> Option<(String, bool)> {
        match self.exprs.get(target) {
            Expression::Reference(Ident::Global(name)) => Some((name.clone(), false)),
            Expression::Reference(Ident::Local(sym)) => {
                self.alloc.name_of(*sym).map(|n| (n.to_string(), true))
            }
            Expression::Member { name, .. } => Some((name.clone(), false)),
            _ => None,
        }
    }

    /// `Base.method(...)` or `Base:method(...)`: the base and the arguments
    /// after the callee
    fn member_call(&self, call: ExprId, method: &str) -> Option<(ExprId, &[ExprId])> {
        let (callee, args) = self.exprs.call_parts(call)?;
        match self.exprs.get(callee) {
            Expression::Member { base, name } if name == method => Some((*base, args)),
            _ => None,
        }
    }

    fn first_string(&self, args: &[ExprId]) -> Option<String> {
        args.iter().find_map(|&a| match self.exprs.get(a) {
            Expression::Literal(Literal::String(s)) => Some(s.clone()),
            _ => None,
        })
    }
}

/// `Node = Base:__call({ _ATOM_UI_CLASS = "Node", ... })`
///
/// The called table becomes a base class and the marker table a class
/// derived from it.
pub struct AtomUiClass;

impl AtomUiClass {
    fn marker_table(ctx: &AnalysisContext, value: ExprId) -> Option<(ExprId, TableId, TableId)> {
        let (base, args) = ctx.member_call(value, "__call")?;
        let (arg, table) = args.iter().find_map(|&a| {
            let t = ctx.literal_table(a)?;
            ctx.tables
                .get(&t)?
                .fields
                .contains_key(ATOM_UI_MARKER)
                .then_some((a, t))
        })?;
        let parent = ctx.class_table(base)?;
        Some((arg, table, parent))
    }
}

impl ClassIdiom for AtomUiClass {
    fn name(&self) -> &'static str {
        "atom-ui"
    }

    fn matches(&self, ctx: &AnalysisContext, event: &IdiomEvent) -> bool {
        match event {
            IdiomEvent::Assignment { value, .. } => Self::marker_table(ctx, *value).is_some(),
            _ => false,
        }
    }

    fn apply(&self, ctx: &mut AnalysisContext, event: &IdiomEvent) -> Option<ExprId> {
        let IdiomEvent::Assignment { target, value } = event else {
            return None;
        };
        let (arg, table, parent) = Self::marker_table(ctx, *value)?;
        let name = ctx.target_name(*target).map(|(n, _)| n);
        let marker = ctx
            .tables
            .get(&table)
            .and_then(|t| t.fields.get(ATOM_UI_MARKER))
            .and_then(|defs| defs.first())
            .and_then(|def| match ctx.exprs.get(def.expr) {
                Expression::Literal(Literal::String(s)) => Some(s.clone()),
                _ => None,
            });

        ctx.promote_class(parent, None).is_atom_ui = true;
        let class = ctx.promote_class(table, name);
        class.is_atom_ui = true;
        class.derive_name = marker;
        if let Some(info) = ctx.tables.get_mut(&table) {
            info.base = Some(parent);
        }
        Some(arg)
    }
}

/// `Child = Base:derive("Child")` with a user-defined `derive`
pub struct DeriveClass;

impl DeriveClass {
    fn parent(ctx: &AnalysisContext, value: ExprId) -> Option<TableId> {
        let (base, _) = ctx.member_call(value, "derive")?;
        let parent = ctx.class_table(base)?;
        ctx.has_field(parent, "derive").then_some(parent)
    }
}

impl ClassIdiom for DeriveClass {
    fn name(&self) -> &'static str {
        "derive"
    }

    fn matches(&self, ctx: &AnalysisContext, event: &IdiomEvent) -> bool {
        match event {
            IdiomEvent::Assignment { value, .. } => Self::parent(ctx, *value).is_some(),
            _ => false,
        }
    }

    fn apply(&self, ctx: &mut AnalysisContext, event: &IdiomEvent) -> Option<ExprId> {
        let IdiomEvent::Assignment { target, value } = event else {
            return None;
        };
        let parent = Self::parent(ctx, *value)?;
        let derive_name = ctx
            .member_call(*value, "derive")
            .and_then(|(_, args)| ctx.first_string(args));
        let name = ctx
            .target_name(*target)
            .map(|(n, _)| n)
            .or_else(|| derive_name.clone())
            .unwrap_or_else(|| format!("{}Derived", ctx.table_name(parent)));

        // An earlier empty placeholder for the same name is superseded
        if let Expression::Reference(ident) = ctx.exprs.get(*target).clone() {
            let placeholders: Vec<TableId> = ctx
                .definitions(&ident)
                .iter()
                .filter_map(|d| ctx.literal_table(d.expr))
                .filter(|t| ctx.tables.get(t).map(|i| i.fields.is_empty()).unwrap_or(false))
                .collect();
            for t in placeholders {
                if let Some(info) = ctx.tables.get_mut(&t) {
                    info.is_empty_class = true;
                }
            }
        }

        ctx.promote_class(parent, None);
        let child = ctx.new_table(&name);
        if let Some(info) = ctx.tables.get_mut(&child) {
            info.base = Some(parent);
        }
        ctx.promote_class(child, Some(name)).derive_name = derive_name;
        Some(ctx.alloc_expr(Expression::Literal(Literal::Table(child))))
    }
}

/// `function Foo:new() ... end` on a table makes it a class
pub struct ConstructorClass;

impl ClassIdiom for ConstructorClass {
    fn name(&self) -> &'static str {
        "constructor"
    }

    fn matches(&self, ctx: &AnalysisContext, event: &IdiomEvent) -> bool {
        match event {
            IdiomEvent::MethodDefinition {
                base,
                method,
                function,
                colon,
            } => {
                *colon
                    && method == "new"
                    && ctx.functions.get(function).map(|f| f.constructs.is_none()).unwrap_or(false)
                    && ctx.class_table(*base).is_some()
            }
            _ => false,
        }
    }

    fn apply(&self, ctx: &mut AnalysisContext, event: &IdiomEvent) -> Option<ExprId> {
        let IdiomEvent::MethodDefinition { base, function, .. } = event else {
            return None;
        };
        let class = ctx.class_table(*base)?;
        ctx.promote_class(class, None);
        if let Some(info) = ctx.functions.get_mut(function) {
            info.constructs = Some(class);
        }
        None
    }
}

/// `setmetatable(obj, Class)` or `setmetatable(obj, { __index = Class })`
///
/// `obj` becomes an instance of `Class`, and what was already assigned to
/// it becomes instance fields of the class.
pub struct MetatableInstance;

impl MetatableInstance {
    fn parts(ctx: &AnalysisContext, call: ExprId) -> Option<(TableId, TableId)> {
        let (callee, args) = ctx.exprs.call_parts(call)?;
        let Expression::Reference(ident @ Ident::Global(name)) = ctx.exprs.get(callee) else {
            return None;
        };
        if name != "setmetatable" || !ctx.definitions(ident).is_empty() {
            return None;
        }
        let (&object, &metatable) = (args.first()?, args.get(1)?);

        let instance = ctx.resolve(object).single_table()?;
        let info = ctx.tables.get(&instance)?;
        if info.is_class() || info.instance_of.is_some() {
            return None;
        }

        let class_expr = ctx
            .literal_table(metatable)
            .and_then(|m| ctx.tables.get(&m)?.fields.get("__index")?.first())
            .map(|def| def.expr)
            .unwrap_or(metatable);
        let class = ctx.class_table(class_expr)?;
        (class != instance).then_some((instance, class))
    }
}

impl ClassIdiom for MetatableInstance {
    fn name(&self) -> &'static str {
        "setmetatable"
    }

    fn matches(&self, ctx: &AnalysisContext, event: &IdiomEvent) -> bool {
        match event {
            IdiomEvent::Call { call } => Self::parts(ctx, *call).is_some(),
            _ => false,
        }
    }

    fn apply(&self, ctx: &mut AnalysisContext, event: &IdiomEvent) -> Option<ExprId> {
        let IdiomEvent::Call { call } = event else {
            return None;
        };
        let (instance, class) = Self::parts(ctx, *call)?;
        ctx.promote_class(class, None);
        ctx.make_instance(instance, class, false);
        None
    }
}

/// A function that builds `local self = {}` (or `Base.new()`) and hangs
/// at least one method on it
pub struct ClosureClass;

impl ClosureClass {
    fn has_method(ctx: &AnalysisContext, table: TableId) -> bool {
        ctx.tables
            .get(&table)
            .map(|t| {
                t.fields
                    .values()
                    .flatten()
                    .any(|d| ctx.literal_function(d.expr).is_some())
            })
            .unwrap_or(false)
    }
}

impl ClassIdiom for ClosureClass {
    fn name(&self) -> &'static str {
        "closure-class"
    }

    fn matches(&self, ctx: &AnalysisContext, event: &IdiomEvent) -> bool {
        let IdiomEvent::FunctionEnd { function } = event else {
            return false;
        };
        let Some(info) = ctx.functions.get(function) else {
            return false;
        };
        match (&info.name, &info.closure_candidate) {
            (Some(_), Some(candidate)) => Self::has_method(ctx, candidate.table),
            _ => false,
        }
    }

    fn apply(&self, ctx: &mut AnalysisContext, event: &IdiomEvent) -> Option<ExprId> {
        let IdiomEvent::FunctionEnd { function } = event else {
            return None;
        };
        let info = ctx.functions.get(function)?;
        let candidate = info.closure_candidate.clone()?;
        let full_name = info.name.clone()?;
        let receiver = info.receiver;

        let stripped = full_name
            .strip_suffix(".new")
            .or_else(|| full_name.strip_suffix(":new"));

        // `function X.new() local self = {} ... end`: X is the class
        let owner = match (stripped, receiver) {
            (Some(_), Some(receiver)) => ctx
                .resolve(receiver)
                .single_table()
                .filter(|&t| t != candidate.table),
            _ => None,
        };

        let base = ctx.tables.get(&candidate.table).and_then(|t| t.base);
        let class_table = match owner {
            Some(owner) => {
                ctx.make_instance(candidate.table, owner, true);
                owner
            }
            None => candidate.table,
        };
        let name = stripped.unwrap_or(&full_name).to_string();
        debug!(class = %name, "closure class");

        if let Some(info) = ctx.tables.get_mut(&class_table) {
            if info.base.is_none() {
                info.base = base;
            }
        }
        ctx.promote_class(class_table, Some(name)).is_closure = true;
        None
    }
}

impl AnalysisContext {
    /// Link an instance table to its class and copy its fields over
    ///
    /// Functions are copied only when `with_functions` is set; the rest
    /// become instance fields.
    pub(crate) fn make_instance(&mut self, instance: TableId, class: TableId, with_functions: bool) {
        let Some(info) = self.tables.get_mut(&instance) else {
            return;
        };
        info.instance_of = Some(class);
        let fields = info.fields.clone();

        for (key, defs) in fields {
            for def in defs {
                let is_function = self.literal_function(def.expr).is_some();
                if is_function && !with_functions {
                    continue;
                }
                if let Some(class_info) = self.tables.get_mut(&class) {
                    let mut def = def;
                    def.instance = !is_function;
                    class_info.fields.entry(key.clone()).or_default().push(def);
                }
            }
        }
    }
}
