//! Finalization: mutable analysis state to immutable module models

use super::resolve::Seen;
use super::{AnalysisContext, Definition, ModuleRecord, UsageKey};
use crate::ir::{Expression, Ident};
use crate::module::{
    AnalyzedClass, AnalyzedField, AnalyzedFunction, AnalyzedModule, AnalyzedParam,
    AnalyzedRequire, AnalyzedTable, FinalValue,
};
use crate::scope::ScopeKey;
use crate::symbol::{FunctionId, SymbolId, TableId};
use crate::types::{TypeSet, TypeTag};
use indexmap::IndexSet;
use std::collections::HashSet;
use tracing::{debug, info};

/// Members of a class table after collision rules
#[derive(Default)]
struct ClassMembers {
    static_fields: Vec<AnalyzedField>,
    instance_fields: Vec<AnalyzedField>,
    functions: Vec<AnalyzedFunction>,
    methods: Vec<AnalyzedFunction>,
    constructors: Vec<AnalyzedFunction>,
}

impl AnalysisContext {
    /// Produce one model per module that was read, in reading order
    pub fn finalize_modules(&mut self) -> Vec<AnalyzedModule> {
        self.propagate_call_arguments();

        let modules: Vec<AnalyzedModule> = (0..self.modules.len())
            .filter(|&m| self.modules[m].read)
            .map(|m| self.finalize_module(m))
            .collect();
        info!(modules = modules.len(), "finalized modules");
        modules
    }

    /// Turn the arguments of every call with a known callee into
    /// definitions of that callee's parameters
    fn propagate_call_arguments(&mut self) {
        if self.arguments_propagated {
            return;
        }
        self.arguments_propagated = true;

        let mut additions: Vec<(SymbolId, Definition)> = Vec::new();
        for site in &self.calls {
            let Some((callee, args)) = self.exprs.call_parts(site.call) else {
                continue;
            };
            let Some(function) = self.resolve(callee).single_function() else {
                continue;
            };
            let Some(info) = self.functions.get(&function) else {
                continue;
            };
            for (&param, &arg) in info.params.iter().zip(args) {
                additions.push((
                    param,
                    Definition {
                        expr: arg,
                        module: site.module,
                        in_function: true,
                        instance: false,
                        from_literal: false,
                    },
                ));
            }
        }

        debug!(count = additions.len(), "propagated call arguments");
        for (param, def) in additions {
            self.definitions.entry(Ident::Local(param)).or_default().push(def);
        }
    }

    fn finalize_module(&self, m: usize) -> AnalyzedModule {
        let record = &self.modules[m];

        let classes: Vec<AnalyzedClass> = self
            .tables
            .values()
            .filter(|t| {
                t.module == m && t.is_class() && !t.is_empty_class && t.instance_of.is_none()
            })
            .map(|t| self.analyze_class(t.id))
            .collect();

        let tables: Vec<AnalyzedTable> = self
            .relevant_tables(m, record)
            .into_iter()
            .map(|t| self.analyze_table(t, record))
            .collect();

        let mut functions = Vec::new();
        let mut fields = Vec::new();
        for name in &record.globals {
            if record.requires.contains_key(name) {
                continue;
            }
            let ident = Ident::Global(name.clone());
            let defs: Vec<&Definition> = self
                .definitions(&ident)
                .iter()
                .filter(|d| d.module == m)
                .collect();

            if let Some(f) = defs.iter().find_map(|d| self.literal_function(d.expr)) {
                functions.push(self.analyze_function(f, name));
                continue;
            }

            let types = self.ident_types(&ident);
            let names_table = types.single_table().is_some_and(|t| {
                self.tables
                    .get(&t)
                    .map(|info| info.name.as_deref() == Some(name.as_str()) || info.is_class())
                    .unwrap_or(false)
            });
            if names_table {
                continue;
            }
            fields.push(AnalyzedField {
                name: name.clone(),
                value: self.final_value(&defs, &types),
                is_instance: false,
            });
        }

        let requires = record
            .requires
            .iter()
            .map(|(name, module)| AnalyzedRequire {
                name: name.clone(),
                module: module.clone(),
            })
            .collect();

        let returns = record
            .returns
            .iter()
            .map(|defs| {
                let defs: Vec<&Definition> = defs.iter().collect();
                let types = self.definition_types(&defs);
                self.final_value(&defs, &types)
            })
            .collect();

        AnalyzedModule {
            id: record.id.clone(),
            classes,
            tables,
            functions,
            fields,
            requires,
            returns,
            scope: record.scope.clone(),
        }
    }

    /// Resolved, narrowed type of a name
    pub fn ident_types(&self, ident: &Ident) -> TypeSet {
        let mut seen = Seen::new();
        let raw = self.resolve_ident(ident, &mut seen, 0);
        self.narrow_with(&UsageKey::Symbol(ident.clone()), raw)
    }

    fn definition_types(&self, defs: &[&Definition]) -> TypeSet {
        let mut types = TypeSet::new();
        for def in defs {
            if !self.is_replaced_table(def.expr) {
                types.extend(&self.resolve(def.expr));
            }
        }
        types
    }

    /// Keep a lone scalar definition as written, otherwise report types
    fn final_value(&self, defs: &[&Definition], types: &TypeSet) -> FinalValue {
        let literal = match defs {
            [only] => match self.exprs.get(only.expr) {
                Expression::Literal(literal) => literal.source_text(),
                _ => None,
            },
            _ => None,
        };
        FinalValue {
            literal,
            types: self.finalize_types(types),
        }
    }

    /// Plain tables worth emitting for a module: those bound to its
    /// module-level names or returned, plus tables nested in them
    fn relevant_tables(&self, m: usize, record: &ModuleRecord) -> Vec<TableId> {
        let mut seeds: Vec<TableId> = Vec::new();

        for name in &record.globals {
            let ident = Ident::Global(name.clone());
            seeds.extend(
                self.definitions(&ident)
                    .iter()
                    .filter(|d| d.module == m)
                    .filter_map(|d| self.literal_table(d.expr)),
            );
        }
        if let Some(scope) = &record.scope {
            for s in scope.scopes() {
                if !matches!(s.key, ScopeKey::Module(_)) {
                    continue;
                }
                for (_, sym) in &s.locals {
                    seeds.extend(
                        self.definitions(&Ident::Local(*sym))
                            .iter()
                            .filter_map(|d| self.literal_table(d.expr)),
                    );
                }
            }
        }
        for defs in &record.returns {
            for def in defs {
                seeds.extend(self.resolve(def.expr).tables());
            }
        }

        let mut found: IndexSet<TableId> = IndexSet::new();
        let mut queue = seeds;
        while let Some(t) = queue.pop() {
            let Some(info) = self.tables.get(&t) else {
                continue;
            };
            if info.module != m || !found.insert(t) {
                continue;
            }
            for defs in info.fields.values() {
                for def in defs {
                    if let Some(inner) = self.literal_table(def.expr) {
                        queue.push(inner);
                    }
                }
            }
        }

        let mut tables: Vec<TableId> = found
            .into_iter()
            .filter(|t| {
                self.tables
                    .get(t)
                    .map(|i| !i.is_class() && i.instance_of.is_none() && !i.is_empty_class)
                    .unwrap_or(false)
            })
            .collect();
        tables.sort();
        tables
    }

    fn analyze_table(&self, table: TableId, record: &ModuleRecord) -> AnalyzedTable {
        let info = &self.tables[&table];
        let name = self.table_label(table).unwrap_or_else(|| {
            record
                .id
                .rsplit('/')
                .next()
                .unwrap_or(record.id.as_str())
                .to_string()
        });

        let mut fields = Vec::new();
        let mut functions = Vec::new();
        for (key, defs) in &info.fields {
            if let Some(f) = defs.iter().find_map(|d| self.literal_function(d.expr)) {
                functions.push(self.analyze_function(f, key));
                continue;
            }
            let defs: Vec<&Definition> = defs.iter().collect();
            let types = self.definition_types(&defs);
            fields.push(AnalyzedField {
                name: key.clone(),
                value: self.final_value(&defs, &types),
                is_instance: false,
            });
        }

        AnalyzedTable {
            table,
            name,
            is_local: info.name_is_local,
            fields,
            functions,
        }
    }

    fn analyze_class(&self, table: TableId) -> AnalyzedClass {
        let info = &self.tables[&table];
        let class = info.class.clone().unwrap_or_default();
        let extends = info.base.map(|b| self.table_name(b));

        let mut members = self.class_members(table);
        self.drop_inherited_fields(&mut members, extends.clone());

        AnalyzedClass {
            table,
            name: class.name,
            extends,
            derive_name: class.derive_name,
            is_local: info.name_is_local,
            is_closure_class: class.is_closure,
            is_atom_ui: class.is_atom_ui,
            static_fields: members.static_fields,
            instance_fields: members.instance_fields,
            functions: members.functions,
            methods: members.methods,
            constructors: members.constructors,
        }
    }

    /// Split a class's fields into values and functions
    ///
    /// A function owns its name unless the instance values assigned under
    /// the same name include something other than a function or nil.
    fn class_members(&self, table: TableId) -> ClassMembers {
        let mut members = ClassMembers::default();
        let Some(info) = self.tables.get(&table) else {
            return members;
        };

        for (key, defs) in &info.fields {
            if key.starts_with("__") {
                continue;
            }
            let function = defs.iter().find_map(|d| self.literal_function(d.expr));
            let values: Vec<&Definition> = defs
                .iter()
                .filter(|d| self.literal_function(d.expr).is_none())
                .collect();
            let instance_values: Vec<&Definition> =
                values.iter().copied().filter(|d| d.instance).collect();

            if let Some(f) = function {
                let instance_types = self.definition_types(&instance_values);
                let conflicting = instance_types.iter().any(|tag| {
                    !matches!(tag.basic(), TypeTag::Function | TypeTag::Nil)
                        && tag != TypeTag::Instance
                });
                if !conflicting {
                    let analyzed = self.analyze_function(f, key);
                    if analyzed.is_constructor {
                        members.constructors.push(analyzed);
                    } else if analyzed.is_method {
                        members.methods.push(analyzed);
                    } else {
                        members.functions.push(analyzed);
                    }
                    continue;
                }
            }

            if values.is_empty() {
                continue;
            }
            let is_instance = !instance_values.is_empty();
            let types = self.definition_types(&values);
            let field = AnalyzedField {
                name: key.clone(),
                value: self.final_value(&values, &types),
                is_instance,
            };
            if is_instance {
                members.instance_fields.push(field);
            } else {
                members.static_fields.push(field);
            }
        }
        members
    }

    /// Remove fields identical in name and type to one declared by a
    /// named ancestor
    fn drop_inherited_fields(&self, members: &mut ClassMembers, extends: Option<String>) {
        let mut visited = HashSet::new();
        let mut next = extends;

        while let Some(name) = next.take() {
            if !visited.insert(name.clone()) {
                break;
            }
            let Some(ancestor) = self.find_class(&name) else {
                break;
            };
            let inherited = self.class_members(ancestor);
            let same = |field: &AnalyzedField| {
                inherited
                    .static_fields
                    .iter()
                    .chain(&inherited.instance_fields)
                    .any(|f| f.name == field.name && f.value.types == field.value.types)
            };
            members.static_fields.retain(|f| !same(f));
            members.instance_fields.retain(|f| !same(f));

            next = self
                .tables
                .get(&ancestor)
                .and_then(|t| t.base)
                .map(|b| self.table_name(b));
        }
    }

    fn find_class(&self, name: &str) -> Option<TableId> {
        self.tables
            .values()
            .find(|t| {
                !t.is_empty_class && t.class.as_ref().map(|c| c.name == name).unwrap_or(false)
            })
            .map(|t| t.id)
    }

    fn analyze_function(&self, function: FunctionId, name: &str) -> AnalyzedFunction {
        let info = &self.functions[&function];
        let skip = usize::from(info.is_method);

        let params = info
            .param_names
            .iter()
            .zip(&info.params)
            .skip(skip)
            .map(|(param, &sym)| AnalyzedParam {
                name: param.clone(),
                types: self.parameter_types(sym),
            })
            .collect();

        let returns = match info.constructs {
            Some(class) => vec![TypeSet::single(TypeTag::TableRef(class))],
            None => info
                .returns
                .iter()
                .map(|exprs| {
                    let mut types = TypeSet::new();
                    for &expr in exprs {
                        types.extend(&self.resolve(expr));
                    }
                    self.finalize_types(&types)
                })
                .collect(),
        };

        AnalyzedFunction {
            id: function,
            name: name.to_string(),
            params,
            is_vararg: info.is_vararg,
            returns,
            is_method: info.is_method,
            is_constructor: info.constructs.is_some(),
        }
    }

    /// Argument types, or the usage constraint when no call supplies any
    fn parameter_types(&self, param: SymbolId) -> TypeSet {
        let ident = Ident::Local(param);
        let types = self.ident_types(&ident);
        if !types.is_empty() {
            return self.finalize_types(&types);
        }
        match self.usage(&UsageKey::Symbol(ident)) {
            Some(usage) => usage.clone(),
            None => TypeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::{analyze_sources, AnalysisConfig};
    use crate::module::AnalyzedModule;
    use crate::types::{TypeSet, TypeTag};
    use luastub_deps::SourceFile;

    fn analyze(source: &str) -> AnalyzedModule {
        let files = vec![SourceFile::new("shared/test", source)];
        let output = analyze_sources(files, &AnalysisConfig::default());
        output.modules.into_iter().next().expect("module missing")
    }

    fn set(tags: &[TypeTag]) -> TypeSet {
        tags.iter().copied().collect()
    }

    const THREE_CLASSES: &str = "A = {}\nfunction A:new() return self end\n\
        B = {}\nfunction B:new() return self end\n\
        C = {}\nfunction C:new() return self end\n";

    #[test]
    fn test_more_than_two_classes_collapse_to_table() {
        let source = format!(
            "{}local v = A\nif c1 then v = B end\nif c2 then v = C end\nreturn v",
            THREE_CLASSES
        );
        let module = analyze(&source);
        assert_eq!(module.classes.len(), 3);
        assert_eq!(module.returns[0].types, set(&[TypeTag::Table]));
    }

    #[test]
    fn test_two_classes_are_kept() {
        let source = format!("{}local v = A\nif c1 then v = B end\nreturn v", THREE_CLASSES);
        let module = analyze(&source);
        let a = module.class("A").expect("A missing").table;
        let b = module.class("B").expect("B missing").table;
        assert_eq!(
            module.returns[0].types,
            set(&[TypeTag::TableRef(a), TypeTag::TableRef(b)])
        );
    }

    #[test]
    fn test_true_and_false_collapse_to_boolean() {
        let module = analyze("local b = true\nif c then b = false end\nreturn b");
        assert_eq!(module.returns[0].types, set(&[TypeTag::Boolean]));
        assert_eq!(module.returns[0].literal, None);
    }

    #[test]
    fn test_single_literal_is_kept_as_written() {
        let module = analyze("Version = \"1.2\"\nLimit = 0x10");
        let version = module.field("Version").expect("Version missing");
        assert_eq!(version.value.literal.as_deref(), Some("\"1.2\""));
        let limit = module.field("Limit").expect("Limit missing");
        assert_eq!(limit.value.literal.as_deref(), Some("0x10"));
        assert_eq!(limit.value.types, set(&[TypeTag::Number]));
    }

    #[test]
    fn test_module_table_with_function() {
        let module = analyze("local M = {}\nfunction M.f(x) return x + 1 end\nreturn M");
        let table = module.returns[0].types.single_table().expect("not a single table");
        let analyzed = module.table_by_id(table).expect("table not emitted");
        assert_eq!(analyzed.name, "M");
        assert!(analyzed.is_local);

        let f = analyzed.function("f").expect("f missing");
        assert_eq!(f.params.len(), 1);
        assert_eq!(f.params[0].types, set(&[TypeTag::Number]));
        assert_eq!(f.returns, vec![set(&[TypeTag::Number])]);
    }

    #[test]
    fn test_call_arguments_type_parameters() {
        let module = analyze("function add(a, b) return a end\nadd(1, 'x')");
        let add = module.function("add").expect("add missing");
        assert_eq!(add.params[0].types, set(&[TypeTag::Number]));
        assert_eq!(add.params[1].types, set(&[TypeTag::String]));
        assert_eq!(add.returns, vec![set(&[TypeTag::Number])]);
    }

    #[test]
    fn test_nested_tables_are_qualified() {
        let module = analyze("Config = { window = { width = 800 }, title = 'x' }");
        let config = module.table("Config").expect("Config missing");
        assert!(config.field("title").is_some());
        let window = module.table("Config.window").expect("nested table missing");
        assert_eq!(
            window.field("width").map(|f| f.value.types.clone()),
            Some(set(&[TypeTag::Number]))
        );
        assert!(module.fields.is_empty());
    }

    #[test]
    fn test_inherited_identical_fields_are_dropped() {
        let module = analyze(
            "Base = {}\nBase.kind = 'base'\nfunction Base:derive(name) return {} end\n\
             Child = Base:derive(\"Child\")\nChild.kind = 'child'\nChild.extra = 1",
        );
        let child = module.class("Child").expect("Child missing");
        assert!(child.field("kind").is_none());
        assert!(child.field("extra").is_some());
        let base = module.class("Base").expect("Base missing");
        assert!(base.field("kind").is_some());
    }

    #[test]
    fn test_function_field_wins_over_nil_instance_value() {
        let module = analyze(
            "Foo = {}\nfunction Foo:new() local o = {} setmetatable(o, self) return o end\n\
             function Foo:reset() self.callback = nil end\nfunction Foo:callback() end",
        );
        let class = module.class("Foo").expect("Foo missing");
        assert!(class.methods.iter().any(|m| m.name == "callback"));
        assert!(class.field("callback").is_none());
    }

    #[test]
    fn test_instance_value_wins_over_function() {
        let module = analyze(
            "Foo = {}\nfunction Foo:new() local o = {} setmetatable(o, self) return o end\n\
             function Foo:init() self.callback = 5 end\nfunction Foo:callback() end",
        );
        let class = module.class("Foo").expect("Foo missing");
        let callback = class.field("callback").expect("callback field missing");
        assert!(callback.is_instance);
        assert_eq!(callback.value.types, set(&[TypeTag::Number]));
        assert!(class.member_function("callback").is_none());
        assert!(class.methods.iter().any(|m| m.name == "init"));
    }

    #[test]
    fn test_module_local_assigned_in_function_may_be_nil() {
        let module = analyze("local x\nfunction bar() x = 5 end\nfunction bar2() return x end");
        let bar2 = module.function("bar2").expect("bar2 missing");
        assert_eq!(bar2.returns, vec![set(&[TypeTag::Nil, TypeTag::Number])]);
    }
}
