//! Type tags and type sets

use crate::symbol::{FunctionId, TableId};
use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// One possible type of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    Nil,
    Boolean,
    Number,
    String,
    Function,
    Table,
    /// Literal `true`, kept apart for truthiness folding
    True,
    /// Literal `false`
    False,
    TableRef(TableId),
    FunctionRef(FunctionId),
    /// The value is an instance of the classes in the same set
    Instance,
}

impl TypeTag {
    /// The basic tag this tag belongs to
    pub fn basic(self) -> TypeTag {
        match self {
            TypeTag::True | TypeTag::False => TypeTag::Boolean,
            TypeTag::TableRef(_) => TypeTag::Table,
            TypeTag::FunctionRef(_) => TypeTag::Function,
            other => other,
        }
    }

    /// Statically known truthiness, if any
    pub fn truthiness(self) -> Option<bool> {
        match self {
            TypeTag::Nil | TypeTag::False => Some(false),
            TypeTag::Boolean => None,
            _ => Some(true),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Nil => write!(f, "nil"),
            TypeTag::Boolean => write!(f, "boolean"),
            TypeTag::Number => write!(f, "number"),
            TypeTag::String => write!(f, "string"),
            TypeTag::Function => write!(f, "function"),
            TypeTag::Table => write!(f, "table"),
            TypeTag::True => write!(f, "true"),
            TypeTag::False => write!(f, "false"),
            TypeTag::TableRef(id) => write!(f, "table#{}", id.0),
            TypeTag::FunctionRef(id) => write!(f, "function#{}", id.0),
            TypeTag::Instance => write!(f, "@instance"),
        }
    }
}

/// A disjunction of type tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSet(BTreeSet<TypeTag>);

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(tag: TypeTag) -> Self {
        let mut set = Self::new();
        set.insert(tag);
        set
    }

    /// The tags usage constraints start from before elimination
    pub fn usage_domain() -> Self {
        [
            TypeTag::Boolean,
            TypeTag::Number,
            TypeTag::String,
            TypeTag::Function,
            TypeTag::Table,
        ]
        .into_iter()
        .collect()
    }

    pub fn insert(&mut self, tag: TypeTag) -> bool {
        self.0.insert(tag)
    }

    pub fn remove(&mut self, tag: TypeTag) -> bool {
        self.0.remove(&tag)
    }

    pub fn extend(&mut self, other: &TypeSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn contains(&self, tag: TypeTag) -> bool {
        self.0.contains(&tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = TypeTag> + '_ {
        self.0.iter().copied()
    }

    pub fn tables(&self) -> impl Iterator<Item = TableId> + '_ {
        self.iter().filter_map(|tag| match tag {
            TypeTag::TableRef(id) => Some(id),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.iter().filter_map(|tag| match tag {
            TypeTag::FunctionRef(id) => Some(id),
            _ => None,
        })
    }

    /// The table id, when the set names exactly one table
    pub fn single_table(&self) -> Option<TableId> {
        let mut tables = self.tables();
        let first = tables.next()?;
        tables.next().is_none().then_some(first)
    }

    /// The function id, when the set names exactly one function
    pub fn single_function(&self) -> Option<FunctionId> {
        let mut functions = self.functions();
        let first = functions.next()?;
        functions.next().is_none().then_some(first)
    }

    pub fn is_instance(&self) -> bool {
        self.contains(TypeTag::Instance)
    }

    /// Tags other than the instance marker
    pub fn without_marker(&self) -> TypeSet {
        self.iter().filter(|t| *t != TypeTag::Instance).collect()
    }

    /// Truthiness shared by every member, if there is one
    pub fn truthiness(&self) -> Option<bool> {
        let mut result = None;
        for tag in self.iter().filter(|t| *t != TypeTag::Instance) {
            let truthy = tag.truthiness()?;
            match result {
                None => result = Some(truthy),
                Some(prev) if prev != truthy => return None,
                Some(_) => {}
            }
        }
        result
    }

    /// Members that can be falsy, with `boolean` narrowed to `false`
    pub fn falsy_part(&self) -> TypeSet {
        self.iter()
            .filter_map(|tag| match tag {
                TypeTag::Nil | TypeTag::False => Some(tag),
                TypeTag::Boolean => Some(TypeTag::False),
                _ => None,
            })
            .collect()
    }

    /// Members that can be truthy, with `boolean` narrowed to `true`
    pub fn truthy_part(&self) -> TypeSet {
        self.iter()
            .filter_map(|tag| match tag {
                TypeTag::Nil | TypeTag::False => None,
                TypeTag::Boolean => Some(TypeTag::True),
                other => Some(other),
            })
            .collect()
    }

    /// Merge `true` and `false` into `boolean` once both are present
    pub fn collapse_booleans(&mut self) {
        let both = self.contains(TypeTag::True) && self.contains(TypeTag::False);
        if both || self.contains(TypeTag::Boolean) {
            self.remove(TypeTag::True);
            self.remove(TypeTag::False);
        }
        if both {
            self.insert(TypeTag::Boolean);
        }
    }
}

impl FromIterator<TypeTag> for TypeSet {
    fn from_iter<I: IntoIterator<Item = TypeTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "any");
        }
        let parts: Vec<String> = self.iter().map(|t| t.to_string()).collect();
        write!(f, "{}", parts.join("|"))
    }
}

impl Serialize for TypeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(|t| t.to_string()))
    }
}
