//! Analyzed module model handed to stub emitters

use crate::scope::ScopeTree;
use crate::symbol::{FunctionId, TableId};
use crate::types::TypeSet;
use serde::Serialize;

/// Final value of a field, global or return slot
///
/// `literal` is set when a single scalar definition exists and can be
/// reproduced as written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinalValue {
    pub literal: Option<String>,
    pub types: TypeSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedField {
    pub name: String,
    pub value: FinalValue,
    pub is_instance: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedParam {
    pub name: String,
    pub types: TypeSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedFunction {
    pub id: FunctionId,
    pub name: String,
    /// Parameters, without the implicit `self` of methods
    pub params: Vec<AnalyzedParam>,
    pub is_vararg: bool,
    pub returns: Vec<TypeSet>,
    pub is_method: bool,
    pub is_constructor: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedClass {
    pub table: TableId,
    pub name: String,
    pub extends: Option<String>,
    pub derive_name: Option<String>,
    pub is_local: bool,
    pub is_closure_class: bool,
    pub is_atom_ui: bool,
    pub static_fields: Vec<AnalyzedField>,
    pub instance_fields: Vec<AnalyzedField>,
    pub functions: Vec<AnalyzedFunction>,
    pub methods: Vec<AnalyzedFunction>,
    pub constructors: Vec<AnalyzedFunction>,
}

impl AnalyzedClass {
    pub fn field(&self, name: &str) -> Option<&AnalyzedField> {
        self.static_fields
            .iter()
            .chain(&self.instance_fields)
            .find(|f| f.name == name)
    }

    /// Any function member: constructor, method or plain function
    pub fn member_function(&self, name: &str) -> Option<&AnalyzedFunction> {
        self.constructors
            .iter()
            .chain(&self.methods)
            .chain(&self.functions)
            .find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedTable {
    pub table: TableId,
    pub name: String,
    pub is_local: bool,
    pub fields: Vec<AnalyzedField>,
    pub functions: Vec<AnalyzedFunction>,
}

impl AnalyzedTable {
    pub fn field(&self, name: &str) -> Option<&AnalyzedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&AnalyzedFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A global assigned `require(...)` of another module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzedRequire {
    pub name: String,
    pub module: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedModule {
    pub id: String,
    pub classes: Vec<AnalyzedClass>,
    pub tables: Vec<AnalyzedTable>,
    pub functions: Vec<AnalyzedFunction>,
    /// Global non-function values
    pub fields: Vec<AnalyzedField>,
    pub requires: Vec<AnalyzedRequire>,
    pub returns: Vec<FinalValue>,
    pub scope: Option<ScopeTree>,
}

impl AnalyzedModule {
    pub fn class(&self, name: &str) -> Option<&AnalyzedClass> {
        self.classes.iter().find(|c| c.name == name)
    }

    pub fn class_by_table(&self, table: TableId) -> Option<&AnalyzedClass> {
        self.classes.iter().find(|c| c.table == table)
    }

    pub fn table(&self, name: &str) -> Option<&AnalyzedTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_by_id(&self, table: TableId) -> Option<&AnalyzedTable> {
        self.tables.iter().find(|t| t.table == table)
    }

    pub fn function(&self, name: &str) -> Option<&AnalyzedFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&AnalyzedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}
