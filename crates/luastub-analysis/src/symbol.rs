//! Symbol identifiers and their allocator
//!
//! Every binding, function and table seen during a run gets an id from one
//! `SymbolAllocator`, so ids stay unique across modules and can key the
//! context's tables directly.

use serde::Serialize;
use std::fmt;

/// A local, parameter, `self` or instance binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolId(pub u32);

/// A function literal or function statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FunctionId(pub u32);

/// A table constructor, or a table synthesized for a class idiom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableId(pub u32);

/// The top-level scope of one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleScopeId(pub u32);

/// What an allocated id stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Local,
    Parameter,
    SelfParam,
    Instance,
    Function,
    Table,
    Module,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Local => "local",
            SymbolKind::Parameter => "parameter",
            SymbolKind::SelfParam => "self",
            SymbolKind::Instance => "instance",
            SymbolKind::Function => "function",
            SymbolKind::Table => "table",
            SymbolKind::Module => "module",
        }
    }

    /// Bindings through which assignments produce instance fields
    pub fn is_instance_binding(self) -> bool {
        matches!(self, SymbolKind::SelfParam | SymbolKind::Instance)
    }
}

/// Kind and readable name of an allocated id
#[derive(Debug, Clone, Serialize)]
pub struct SymbolRecord {
    pub index: u32,
    pub kind: SymbolKind,
    pub name: String,
}

impl fmt::Display for SymbolRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}({})[{}]", self.kind.as_str(), self.index, self.name)
    }
}

/// Mints ids for one analysis run
///
/// All id kinds share a single counter, so the raw index alone identifies
/// a record.
#[derive(Debug, Default)]
pub struct SymbolAllocator {
    records: Vec<SymbolRecord>,
}

impl SymbolAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&mut self, kind: SymbolKind, name: &str) -> u32 {
        let index = self.records.len() as u32;
        self.records.push(SymbolRecord {
            index,
            kind,
            name: name.to_string(),
        });
        index
    }

    /// Allocate a binding id; `kind` must be a binding kind
    pub fn symbol(&mut self, kind: SymbolKind, name: &str) -> SymbolId {
        debug_assert!(matches!(
            kind,
            SymbolKind::Local | SymbolKind::Parameter | SymbolKind::SelfParam | SymbolKind::Instance
        ));
        SymbolId(self.mint(kind, name))
    }

    pub fn function(&mut self, name: &str) -> FunctionId {
        FunctionId(self.mint(SymbolKind::Function, name))
    }

    pub fn table(&mut self, name: &str) -> TableId {
        TableId(self.mint(SymbolKind::Table, name))
    }

    pub fn module(&mut self, name: &str) -> ModuleScopeId {
        ModuleScopeId(self.mint(SymbolKind::Module, name))
    }

    pub fn record(&self, index: u32) -> Option<&SymbolRecord> {
        self.records.get(index as usize)
    }

    pub fn kind_of(&self, id: SymbolId) -> Option<SymbolKind> {
        self.record(id.0).map(|r| r.kind)
    }

    pub fn name_of(&self, id: SymbolId) -> Option<&str> {
        self.record(id.0).map(|r| r.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_across_kinds() {
        let mut alloc = SymbolAllocator::new();
        let a = alloc.symbol(SymbolKind::Local, "x");
        let f = alloc.function("Foo.new");
        let t = alloc.table("Foo");
        let b = alloc.symbol(SymbolKind::Parameter, "x");

        assert_ne!(a, b);
        assert_eq!(f.0, 1);
        assert_eq!(t.0, 2);
        assert_eq!(alloc.len(), 4);
    }

    #[test]
    fn test_record_display() {
        let mut alloc = SymbolAllocator::new();
        alloc.module("shared/Foo");
        let id = alloc.symbol(SymbolKind::Local, "x");
        let f = alloc.function("Foo.new");

        assert_eq!(alloc.record(id.0).unwrap().to_string(), "@local(1)[x]");
        assert_eq!(alloc.record(f.0).unwrap().to_string(), "@function(2)[Foo.new]");
        assert_eq!(alloc.kind_of(id), Some(SymbolKind::Local));
    }
}
