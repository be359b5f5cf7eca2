//! Lexical scope tree
//!
//! Mirrors Lua nesting: one module scope per file, a function scope per
//! function body, and block scopes for `do`, loops and branches. Lookups
//! walk outward from the current scope; a miss means the name is global.

use crate::symbol::{FunctionId, ModuleScopeId, SymbolAllocator, SymbolId, SymbolKind};
use serde::Serialize;
use std::collections::HashMap;

/// Index of a scope inside its `ScopeTree`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScopeIndex(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Module,
    Function,
    Block,
}

/// Identity of the code a scope belongs to
///
/// Block scopes share the key of their enclosing function or module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKey {
    Module(ModuleScopeId),
    Function(FunctionId),
}

#[derive(Debug, Clone, Serialize)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeIndex>,
    pub key: ScopeKey,
    /// Bindings in declaration order; later entries shadow earlier ones
    pub locals: Vec<(String, SymbolId)>,
}

/// The scopes of one module
#[derive(Debug, Clone, Serialize)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    #[serde(skip)]
    current: ScopeIndex,
    #[serde(skip)]
    defining: HashMap<SymbolId, ScopeIndex>,
    #[serde(skip)]
    names: HashMap<SymbolId, String>,
}

impl ScopeTree {
    /// Create a tree holding only the module scope
    pub fn new(alloc: &mut SymbolAllocator, module: &str) -> Self {
        let key = ScopeKey::Module(alloc.module(module));
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Module,
                parent: None,
                key,
                locals: Vec::new(),
            }],
            current: ScopeIndex(0),
            defining: HashMap::new(),
            names: HashMap::new(),
        }
    }

    pub fn root(&self) -> ScopeIndex {
        ScopeIndex(0)
    }

    pub fn current(&self) -> ScopeIndex {
        self.current
    }

    pub fn scope(&self, index: ScopeIndex) -> &Scope {
        &self.scopes[index.0 as usize]
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn module_key(&self) -> ScopeKey {
        self.scopes[0].key
    }

    /// Key of the current scope
    pub fn current_key(&self) -> ScopeKey {
        self.scope(self.current).key
    }

    /// Enter the body of a function
    pub fn push_function(&mut self, function: FunctionId) -> ScopeIndex {
        self.push(ScopeKind::Function, ScopeKey::Function(function))
    }

    /// Enter a nested block of the current function or module
    pub fn push_block(&mut self) -> ScopeIndex {
        let key = self.current_key();
        self.push(ScopeKind::Block, key)
    }

    fn push(&mut self, kind: ScopeKind, key: ScopeKey) -> ScopeIndex {
        let index = ScopeIndex(self.scopes.len() as u32);
        self.scopes.push(Scope {
            kind,
            parent: Some(self.current),
            key,
            locals: Vec::new(),
        });
        self.current = index;
        index
    }

    /// Leave the current scope; the module scope is never left
    pub fn pop(&mut self) {
        if let Some(parent) = self.scope(self.current).parent {
            self.current = parent;
        }
    }

    pub fn add_local(&mut self, alloc: &mut SymbolAllocator, name: &str) -> SymbolId {
        self.add(alloc, SymbolKind::Local, name)
    }

    pub fn add_parameter(&mut self, alloc: &mut SymbolAllocator, name: &str) -> SymbolId {
        self.add(alloc, SymbolKind::Parameter, name)
    }

    /// The implicit `self` of a method
    pub fn add_self_parameter(&mut self, alloc: &mut SymbolAllocator) -> SymbolId {
        self.add(alloc, SymbolKind::SelfParam, "self")
    }

    /// A function-local table standing for the object being built
    pub fn add_instance(&mut self, alloc: &mut SymbolAllocator, name: &str) -> SymbolId {
        self.add(alloc, SymbolKind::Instance, name)
    }

    fn add(&mut self, alloc: &mut SymbolAllocator, kind: SymbolKind, name: &str) -> SymbolId {
        let id = alloc.symbol(kind, name);
        let current = self.current;
        self.scopes[current.0 as usize]
            .locals
            .push((name.to_string(), id));
        self.defining.insert(id, current);
        self.names.insert(id, name.to_string());
        id
    }

    /// Resolve a name from the current scope outward
    pub fn get_local_id(&self, name: &str) -> Option<SymbolId> {
        let mut index = Some(self.current);
        while let Some(i) = index {
            let scope = self.scope(i);
            if let Some((_, id)) = scope.locals.iter().rev().find(|(n, _)| n == name) {
                return Some(*id);
            }
            index = scope.parent;
        }
        None
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.get_local_id(name).is_some()
    }

    pub fn local_id_to_name(&self, id: SymbolId) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn get_defining_scope(&self, id: SymbolId) -> Option<ScopeIndex> {
        self.defining.get(&id).copied()
    }

    /// Whether a binding of this tree lives in module-level code
    pub fn is_module_level(&self, id: SymbolId) -> bool {
        self.get_defining_scope(id)
            .map(|scope| matches!(self.scope(scope).key, ScopeKey::Module(_)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (SymbolAllocator, ScopeTree) {
        let mut alloc = SymbolAllocator::new();
        let tree = ScopeTree::new(&mut alloc, "shared/test");
        (alloc, tree)
    }

    #[test]
    fn test_shadowing_and_lookup() {
        let (mut alloc, mut tree) = tree();
        let outer = tree.add_local(&mut alloc, "x");
        tree.push_block();
        let inner = tree.add_local(&mut alloc, "x");

        assert_eq!(tree.get_local_id("x"), Some(inner));
        tree.pop();
        assert_eq!(tree.get_local_id("x"), Some(outer));
        assert_eq!(tree.get_local_id("y"), None);
        assert!(!tree.has_local("print"));
    }

    #[test]
    fn test_block_inherits_key() {
        let (mut alloc, mut tree) = tree();
        let module_key = tree.current_key();
        tree.push_block();
        assert_eq!(tree.current_key(), module_key);
        tree.pop();

        let f = alloc.function("f");
        tree.push_function(f);
        assert_eq!(tree.current_key(), ScopeKey::Function(f));
        tree.push_block();
        assert_eq!(tree.current_key(), ScopeKey::Function(f));
    }

    #[test]
    fn test_defining_scope_and_names() {
        let (mut alloc, mut tree) = tree();
        let top = tree.add_local(&mut alloc, "M");
        let f = alloc.function("M.f");
        tree.push_function(f);
        let param = tree.add_parameter(&mut alloc, "a");
        let me = tree.add_self_parameter(&mut alloc);

        assert!(tree.is_module_level(top));
        assert!(!tree.is_module_level(param));
        assert_eq!(tree.local_id_to_name(me), Some("self"));
        assert_eq!(tree.get_local_id("M"), Some(top));
        assert_eq!(alloc.kind_of(me), Some(SymbolKind::SelfParam));
    }

    #[test]
    fn test_pop_at_root_is_noop() {
        let (_, mut tree) = tree();
        tree.pop();
        assert_eq!(tree.current(), tree.root());
    }
}
