//! Type resolution context
//!
//! Collects what the reader sees across every module: candidate
//! definitions per symbol and per table field, function and table
//! metadata, usage constraints and call sites. Types are resolved on
//! demand, and `finalize_modules` turns the accumulated state into one
//! `AnalyzedModule` per file.

mod finalize;
mod idioms;
mod narrowing;
mod resolve;

pub use idioms::{ClassIdiom, IdiomEvent};
pub use narrowing::UsageKey;

use crate::error::AnalysisError;
use crate::ir::{ExprArena, ExprId, Expression, Ident, Literal, Operator};
use crate::scope::ScopeTree;
use crate::symbol::{FunctionId, SymbolAllocator, SymbolId, SymbolKind, TableId};
use crate::types::{TypeSet, TypeTag};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Resolution depth after which a chain is treated as unknown
pub(crate) const MAX_RESOLVE_DEPTH: usize = 200;

/// A type set naming more classes than this reports plain `table`
pub const CLASS_COLLAPSE_THRESHOLD: usize = 2;

/// A candidate value for a symbol or a table field
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub expr: ExprId,
    /// Index of the module the assignment was read in
    pub module: usize,
    /// Assigned inside a function body rather than at load time
    pub in_function: bool,
    /// Assigned through `self` or a closure instance
    pub instance: bool,
    /// Part of a table constructor
    pub from_literal: bool,
}

#[derive(Debug, Clone)]
pub struct ClosureCandidate {
    pub symbol: SymbolId,
    pub table: TableId,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub id: FunctionId,
    pub module: usize,
    /// Readable name such as `Foo.bar` or `Foo:new`
    pub name: Option<String>,
    /// `Foo` in `function Foo.bar()`
    pub receiver: Option<ExprId>,
    pub params: Vec<SymbolId>,
    pub param_names: Vec<String>,
    pub is_vararg: bool,
    /// Has an implicit or explicit leading `self`
    pub is_method: bool,
    /// Return expressions per return slot
    pub returns: Vec<Vec<ExprId>>,
    /// The class this function constructs
    pub constructs: Option<TableId>,
    pub closure_candidate: Option<ClosureCandidate>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassInfo {
    pub name: String,
    pub derive_name: Option<String>,
    pub is_closure: bool,
    pub is_atom_ui: bool,
}

#[derive(Debug, Clone)]
pub struct TableInfo {
    pub id: TableId,
    pub module: usize,
    pub name: Option<String>,
    pub name_is_local: bool,
    /// Keys written in the table constructor, in order
    pub literal_fields: Vec<String>,
    pub fields: IndexMap<String, Vec<Definition>>,
    pub class: Option<ClassInfo>,
    /// Table consulted for keys this table lacks
    pub base: Option<TableId>,
    /// Class this table is an instance of
    pub instance_of: Option<TableId>,
    /// Table and key this table was first assigned to
    pub contained_in: Option<(TableId, String)>,
    /// Empty table replaced by a class created elsewhere
    pub is_empty_class: bool,
}

impl TableInfo {
    fn new(id: TableId, module: usize) -> Self {
        Self {
            id,
            module,
            name: None,
            name_is_local: false,
            literal_fields: Vec::new(),
            fields: IndexMap::new(),
            class: None,
            base: None,
            instance_of: None,
            contained_in: None,
            is_empty_class: false,
        }
    }

    pub fn is_class(&self) -> bool {
        self.class.is_some()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CallSite {
    pub call: ExprId,
    pub module: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct ModuleRecord {
    pub id: String,
    pub bucket: Option<String>,
    pub read: bool,
    pub returns: Vec<Vec<Definition>>,
    /// Global name to required module id
    pub requires: IndexMap<String, String>,
    /// Globals assigned by this module
    pub globals: IndexSet<String>,
    pub scope: Option<ScopeTree>,
}

/// Whole-run inference state
#[derive(Debug)]
pub struct AnalysisContext {
    pub(crate) alloc: SymbolAllocator,
    pub(crate) exprs: ExprArena,
    pub(crate) definitions: HashMap<Ident, Vec<Definition>>,
    pub(crate) functions: IndexMap<FunctionId, FunctionInfo>,
    pub(crate) tables: IndexMap<TableId, TableInfo>,
    pub(crate) usages: HashMap<UsageKey, TypeSet>,
    pub(crate) module_level: HashSet<SymbolId>,
    pub(crate) calls: Vec<CallSite>,
    pub(crate) modules: Vec<ModuleRecord>,
    module_index: HashMap<String, usize>,
    aliases: HashMap<String, Vec<String>>,
    buckets: Vec<String>,
    current: usize,
    arguments_propagated: bool,
    diagnostics: Vec<AnalysisError>,
}

impl AnalysisContext {
    pub fn new(buckets: Vec<String>) -> Self {
        Self {
            alloc: SymbolAllocator::new(),
            exprs: ExprArena::default(),
            definitions: HashMap::new(),
            functions: IndexMap::new(),
            tables: IndexMap::new(),
            usages: HashMap::new(),
            module_level: HashSet::new(),
            calls: Vec::new(),
            modules: Vec::new(),
            module_index: HashMap::new(),
            aliases: HashMap::new(),
            buckets,
            current: 0,
            arguments_propagated: false,
            diagnostics: Vec::new(),
        }
    }

    pub fn allocator(&self) -> &SymbolAllocator {
        &self.alloc
    }

    pub fn allocator_mut(&mut self) -> &mut SymbolAllocator {
        &mut self.alloc
    }

    pub fn expr(&self, id: ExprId) -> &Expression {
        self.exprs.get(id)
    }

    pub fn alloc_expr(&mut self, expr: Expression) -> ExprId {
        self.exprs.alloc(expr)
    }

    pub fn table(&self, id: TableId) -> Option<&TableInfo> {
        self.tables.get(&id)
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionInfo> {
        self.functions.get(&id)
    }

    pub fn definitions(&self, ident: &Ident) -> &[Definition] {
        self.definitions.get(ident).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Advisories collected while reading
    pub fn take_diagnostics(&mut self) -> Vec<AnalysisError> {
        std::mem::take(&mut self.diagnostics)
    }

    // ===== Modules =====

    /// Make a module known so requires can find it before it is read
    pub fn register_module(&mut self, id: &str) -> usize {
        if let Some(&index) = self.module_index.get(id) {
            return index;
        }
        let index = self.modules.len();
        self.modules.push(ModuleRecord {
            id: id.to_string(),
            bucket: luastub_deps::bucket_of(id, &self.buckets).map(str::to_string),
            read: false,
            returns: Vec::new(),
            requires: IndexMap::new(),
            globals: IndexSet::new(),
            scope: None,
        });
        self.module_index.insert(id.to_string(), index);
        for alias in luastub_deps::module_aliases(id) {
            self.aliases.entry(alias).or_default().push(id.to_string());
        }
        index
    }

    /// Start reading a module and create its scope tree
    pub fn begin_module(&mut self, id: &str) -> ScopeTree {
        self.current = self.register_module(id);
        debug!(module = id, "reading module");
        ScopeTree::new(&mut self.alloc, id)
    }

    pub fn end_module(&mut self, scope: ScopeTree) {
        if let Some(module) = self.modules.get_mut(self.current) {
            module.read = true;
            module.scope = Some(scope);
        }
    }

    pub fn current_module_id(&self) -> Option<&str> {
        self.modules.get(self.current).map(|m| m.id.as_str())
    }

    /// Find the module a `require` argument names, as seen from the
    /// module being read
    pub fn resolve_require(&mut self, name: &str) -> Option<String> {
        let name = luastub_deps::normalize_require(name);
        let target = self.lookup_module(&name)?;

        let current = self.modules.get(self.current);
        let is_self = current.map(|m| m.id == target).unwrap_or(false);
        let read = self
            .module_index
            .get(&target)
            .map(|&i| self.modules[i].read)
            .unwrap_or(false);
        if !read && !is_self {
            let from = current.map(|m| m.id.clone()).unwrap_or_default();
            self.diagnostics.push(AnalysisError::RequireBeforeAnalysis {
                from,
                target: target.clone(),
            });
        }
        Some(target)
    }

    fn lookup_module(&self, name: &str) -> Option<String> {
        if self.module_index.contains_key(name) {
            return Some(name.to_string());
        }
        let candidates = self.aliases.get(name)?;
        if let [only] = candidates.as_slice() {
            return Some(only.clone());
        }
        let bucket = self.modules.get(self.current)?.bucket.as_deref()?;
        let same_bucket: Vec<&String> = candidates
            .iter()
            .filter(|id| luastub_deps::bucket_of(id, &self.buckets) == Some(bucket))
            .collect();
        match same_bucket.as_slice() {
            [only] => Some((*only).clone()),
            _ => None,
        }
    }

    pub(crate) fn module_by_id(&self, id: &str) -> Option<&ModuleRecord> {
        self.module_index.get(id).map(|&i| &self.modules[i])
    }

    // ===== Tables and functions =====

    pub fn new_table(&mut self, hint: &str) -> TableId {
        let id = self.alloc.table(hint);
        self.tables.insert(id, TableInfo::new(id, self.current));
        id
    }

    pub fn new_function(&mut self, name: Option<String>) -> FunctionId {
        let id = self.alloc.function(name.as_deref().unwrap_or("<anonymous>"));
        self.functions.insert(
            id,
            FunctionInfo {
                id,
                module: self.current,
                name,
                receiver: None,
                params: Vec::new(),
                param_names: Vec::new(),
                is_vararg: false,
                is_method: false,
                returns: Vec::new(),
                constructs: None,
                closure_candidate: None,
            },
        );
        id
    }

    pub fn set_parameters(
        &mut self,
        function: FunctionId,
        params: Vec<(String, SymbolId)>,
        is_vararg: bool,
        is_method: bool,
    ) {
        if let Some(info) = self.functions.get_mut(&function) {
            info.is_method = is_method || params.first().map(|(n, _)| n == "self").unwrap_or(false);
            info.param_names = params.iter().map(|(n, _)| n.clone()).collect();
            info.params = params.into_iter().map(|(_, id)| id).collect();
            info.is_vararg = is_vararg;
        }
    }

    pub fn set_receiver(&mut self, function: FunctionId, receiver: ExprId) {
        if let Some(info) = self.functions.get_mut(&function) {
            info.receiver = Some(receiver);
        }
    }

    /// Readable name of a table: class name, assigned name or id
    pub fn table_name(&self, id: TableId) -> String {
        self.table_label(id)
            .unwrap_or_else(|| format!("table#{}", id.0))
    }

    /// Class or assigned name; a nested table is named after its container
    pub(crate) fn table_label(&self, id: TableId) -> Option<String> {
        let mut visited = HashSet::new();
        let mut suffix = Vec::new();
        let mut current = id;
        loop {
            if !visited.insert(current) {
                return None;
            }
            let info = self.tables.get(&current)?;
            let name = info
                .class
                .as_ref()
                .map(|c| c.name.clone())
                .or_else(|| info.name.clone());
            if let Some(mut name) = name {
                for key in suffix.iter().rev() {
                    name = format!("{}.{}", name, key);
                }
                return Some(name);
            }
            let (parent, key) = info.contained_in.as_ref()?;
            suffix.push(key.clone());
            current = *parent;
        }
    }

    /// Field key of an index expression with a constant key
    pub(crate) fn field_key(&self, index: ExprId) -> Option<String> {
        match self.exprs.get(index) {
            Expression::Literal(Literal::String(s)) => Some(s.clone()),
            Expression::Literal(Literal::Number(n)) => Some(n.clone()),
            _ => None,
        }
    }

    // ===== Events from the reader =====

    /// Record `target = value`
    pub fn add_assignment(&mut self, target: ExprId, value: ExprId, in_function: bool) {
        let value = self
            .dispatch(&IdiomEvent::Assignment { target, value })
            .unwrap_or(value);

        match self.exprs.get(target).clone() {
            Expression::Reference(ident) => self.define(ident, value, in_function),
            Expression::Member { base, name } => {
                self.add_field(base, &name, value, in_function, false);
            }
            Expression::Index { base, index } => {
                if let Some(key) = self.field_key(index) {
                    self.add_field(base, &key, value, in_function, false);
                }
            }
            _ => {}
        }
    }

    /// Record a definition of a symbol
    pub fn define(&mut self, ident: Ident, value: ExprId, in_function: bool) {
        let (name, is_local, instance) = match &ident {
            Ident::Local(sym) => (
                self.alloc.name_of(*sym).unwrap_or_default().to_string(),
                true,
                self.alloc
                    .kind_of(*sym)
                    .map(SymbolKind::is_instance_binding)
                    .unwrap_or(false),
            ),
            Ident::Global(name) => (name.clone(), false, false),
        };

        self.name_value(value, &name, is_local);
        if let Ident::Global(global) = &ident {
            let target = match self.exprs.get(value) {
                Expression::Require { target, .. } => target.clone(),
                _ => None,
            };
            if let Some(module) = self.modules.get_mut(self.current) {
                module.globals.insert(global.clone());
                if let Some(target) = target {
                    module.requires.insert(global.clone(), target);
                }
            }
        }

        self.definitions.entry(ident).or_default().push(Definition {
            expr: value,
            module: self.current,
            in_function,
            instance,
            from_literal: false,
        });
    }

    /// `self` of a method, defined as the receiver
    pub fn define_self(&mut self, symbol: SymbolId, receiver: ExprId) {
        self.definitions
            .entry(Ident::Local(symbol))
            .or_default()
            .push(Definition {
                expr: receiver,
                module: self.current,
                in_function: true,
                instance: true,
                from_literal: false,
            });
    }

    pub fn mark_module_level(&mut self, symbol: SymbolId) {
        self.module_level.insert(symbol);
    }

    fn name_value(&mut self, value: ExprId, name: &str, is_local: bool) {
        match self.exprs.get(value) {
            Expression::Literal(Literal::Table(t)) => {
                let t = *t;
                if let Some(info) = self.tables.get_mut(&t) {
                    if info.name.is_none() {
                        info.name = Some(name.to_string());
                        info.name_is_local = is_local;
                    }
                }
            }
            Expression::Literal(Literal::Function(f)) => {
                let f = *f;
                if let Some(info) = self.functions.get_mut(&f) {
                    info.name.get_or_insert_with(|| name.to_string());
                }
            }
            _ => {}
        }
    }

    /// Attribute an assignment to a field of whatever table `base` is
    ///
    /// Ambiguous bases are ignored.
    pub(crate) fn add_field(
        &mut self,
        base: ExprId,
        key: &str,
        value: ExprId,
        in_function: bool,
        from_literal: bool,
    ) {
        let base_types = self.resolve(base);
        let Some(mut table) = base_types.single_table() else {
            trace!(key, types = %base_types, "field base is not a single table");
            return;
        };
        let mut instance = base_types.is_instance() || self.is_instance_reference(base);
        if let Some(class) = self.tables.get(&table).and_then(|t| t.instance_of) {
            table = class;
            instance = true;
        }
        self.attach_field(table, key, value, in_function, instance, from_literal);
    }

    /// A field written in a table constructor
    pub fn add_table_field(&mut self, table: TableId, key: &str, value: ExprId, in_function: bool) {
        if let Some(info) = self.tables.get_mut(&table) {
            info.literal_fields.push(key.to_string());
        }
        self.attach_field(table, key, value, in_function, false, true);
    }

    pub(crate) fn attach_field(
        &mut self,
        table: TableId,
        key: &str,
        value: ExprId,
        in_function: bool,
        instance: bool,
        from_literal: bool,
    ) {
        match self.exprs.get(value) {
            Expression::Literal(Literal::Table(inner)) if *inner != table => {
                let inner = *inner;
                if let Some(info) = self.tables.get_mut(&inner) {
                    if info.contained_in.is_none() && info.name.is_none() {
                        info.contained_in = Some((table, key.to_string()));
                    }
                }
            }
            Expression::Literal(Literal::Function(f)) => {
                let f = *f;
                let qualified = format!("{}.{}", self.table_name(table), key);
                if let Some(info) = self.functions.get_mut(&f) {
                    info.name.get_or_insert(qualified);
                }
            }
            _ => {}
        }

        let module = self.current;
        if let Some(info) = self.tables.get_mut(&table) {
            info.fields.entry(key.to_string()).or_default().push(Definition {
                expr: value,
                module,
                in_function,
                instance,
                from_literal,
            });
        }
    }

    pub(crate) fn is_instance_reference(&self, expr: ExprId) -> bool {
        match self.exprs.get(expr) {
            Expression::Reference(Ident::Local(sym)) => self
                .alloc
                .kind_of(*sym)
                .map(SymbolKind::is_instance_binding)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Record a returned value; `None` means the module's own return
    pub fn add_return(&mut self, function: Option<FunctionId>, slot: usize, value: ExprId) {
        match function {
            Some(f) => {
                if let Some(info) = self.functions.get_mut(&f) {
                    if info.returns.len() <= slot {
                        info.returns.resize(slot + 1, Vec::new());
                    }
                    info.returns[slot].push(value);
                }
            }
            None => {
                let module = self.current;
                if let Some(record) = self.modules.get_mut(module) {
                    if record.returns.len() <= slot {
                        record.returns.resize(slot + 1, Vec::new());
                    }
                    record.returns[slot].push(Definition {
                        expr: value,
                        module,
                        in_function: false,
                        instance: false,
                        from_literal: false,
                    });
                }
            }
        }
    }

    /// Record a call for argument propagation and call-based idioms
    pub fn add_call(&mut self, call: ExprId) {
        self.calls.push(CallSite {
            call,
            module: self.current,
        });
        self.dispatch(&IdiomEvent::Call { call });
    }

    /// A `self.m = ...` or `function A:m()` definition has been recorded
    pub fn method_defined(&mut self, base: ExprId, method: &str, function: FunctionId, colon: bool) {
        self.dispatch(&IdiomEvent::MethodDefinition {
            base,
            method: method.to_string(),
            function,
            colon,
        });
    }

    pub fn end_function(&mut self, function: FunctionId) {
        self.dispatch(&IdiomEvent::FunctionEnd { function });
    }

    /// `local self = ...` or `local publ = ...` inside `function`
    ///
    /// Returns the value the binding should be defined with: a fresh table
    /// when the object comes from `Base.new()`.
    pub fn add_closure_candidate(
        &mut self,
        function: FunctionId,
        symbol: SymbolId,
        value: ExprId,
    ) -> Option<ExprId> {
        let (table, replacement) = match self.exprs.get(value).clone() {
            Expression::Literal(Literal::Table(t)) => (t, None),
            Expression::Operation {
                op: Operator::Call { .. },
                args,
            } => {
                let callee = *args.first()?;
                let Expression::Member { base, name } = self.exprs.get(callee).clone() else {
                    return None;
                };
                if name != "new" {
                    return None;
                }
                let parent = self
                    .resolve(base)
                    .single_table()
                    .map(|t| self.tables.get(&t).and_then(|i| i.instance_of).unwrap_or(t));
                let name = self.alloc.name_of(symbol).unwrap_or("self").to_string();
                let table = self.new_table(&name);
                if let Some(info) = self.tables.get_mut(&table) {
                    info.base = parent;
                }
                let literal = self.alloc_expr(Expression::Literal(Literal::Table(table)));
                (table, Some(literal))
            }
            _ => return None,
        };

        if let Some(info) = self.functions.get_mut(&function) {
            info.closure_candidate = Some(ClosureCandidate { symbol, table });
        }
        replacement
    }

    /// Turn a table into a class, or update an existing class
    pub(crate) fn promote_class(&mut self, table: TableId, name: Option<String>) -> &mut ClassInfo {
        let fallback = self.table_name(table);
        let module = self.current;
        let info = self
            .tables
            .entry(table)
            .or_insert_with(|| TableInfo::new(table, module));
        if info.class.is_none() {
            let name = name.unwrap_or(fallback);
            debug!(class = %name, table = table.0, "promoted class");
            info.class = Some(ClassInfo {
                name,
                ..ClassInfo::default()
            });
        }
        info.class.get_or_insert_with(ClassInfo::default)
    }

    pub(crate) fn literal_table(&self, expr: ExprId) -> Option<TableId> {
        match self.exprs.get(expr) {
            Expression::Literal(Literal::Table(t)) => Some(*t),
            _ => None,
        }
    }

    pub(crate) fn literal_function(&self, expr: ExprId) -> Option<FunctionId> {
        match self.exprs.get(expr) {
            Expression::Literal(Literal::Function(f)) => Some(*f),
            _ => None,
        }
    }

    /// Whether a table or one of its bases has a field with this key
    pub(crate) fn has_field(&self, table: TableId, key: &str) -> bool {
        !self.field_definitions(table, key).is_empty()
    }

    /// Definitions of a key on a table, following base links
    pub(crate) fn field_definitions(&self, table: TableId, key: &str) -> Vec<&Definition> {
        let mut visited = HashSet::new();
        let mut current = Some(table);
        while let Some(t) = current {
            if !visited.insert(t) {
                break;
            }
            let Some(info) = self.tables.get(&t) else {
                break;
            };
            if let Some(defs) = info.fields.get(key) {
                if !defs.is_empty() {
                    return defs.iter().collect();
                }
            }
            current = info.base;
        }
        Vec::new()
    }

    /// Number of class tables a type set names
    pub(crate) fn class_tags(&self, types: &TypeSet) -> usize {
        types
            .tables()
            .filter(|t| self.tables.get(t).map(TableInfo::is_class).unwrap_or(false))
            .count()
    }

    /// Final form of a type set handed to consumers
    pub fn finalize_types(&self, types: &TypeSet) -> TypeSet {
        let mut result = types.without_marker();
        result.collapse_booleans();
        if self.class_tags(&result) > CLASS_COLLAPSE_THRESHOLD {
            result = result
                .iter()
                .filter(|t| !matches!(t, TypeTag::TableRef(_)))
                .collect();
            result.insert(TypeTag::Table);
        }
        result
    }
}
