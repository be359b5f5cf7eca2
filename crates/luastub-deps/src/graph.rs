//! Dependency graph data structure

use crate::{bucket_of, module_aliases, DependencyError, FileDependencies};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

/// A file participating in ordering
#[derive(Debug, Clone)]
pub struct DependencyFile {
    pub id: String,
    pub bucket: Option<String>,
    pub deps: FileDependencies,
}

/// Outcome of looking up a `require` target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequireTarget<'a> {
    Found(&'a str),
    Ambiguous(Vec<String>),
    Missing,
}

/// All files of a project with their alias and global-setter indexes
#[derive(Debug, Default)]
pub struct DependencyGraph {
    buckets: Vec<String>,

    /// Files in insertion order
    files: IndexMap<String, DependencyFile>,

    /// Path-suffix alias to the files it may name
    aliases: HashMap<String, Vec<String>>,

    /// Global name to the files that assign it at load time
    setters: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new(buckets: Vec<String>) -> Self {
        Self {
            buckets,
            ..Self::default()
        }
    }

    pub fn buckets(&self) -> &[String] {
        &self.buckets
    }

    /// Insert a file, returning an error if its id is taken
    pub fn insert(&mut self, id: String, deps: FileDependencies) -> Result<(), DependencyError> {
        if self.files.contains_key(&id) {
            return Err(DependencyError::DuplicateId { id });
        }

        for alias in module_aliases(&id) {
            self.aliases.entry(alias).or_default().push(id.clone());
        }
        for global in &deps.writes {
            self.setters.entry(global.clone()).or_default().push(id.clone());
        }

        let bucket = bucket_of(&id, &self.buckets).map(str::to_string);
        self.files.insert(id.clone(), DependencyFile { id, bucket, deps });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DependencyFile> {
        self.files.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.files.contains_key(id)
    }

    /// Iterate over all files in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &DependencyFile> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Resolve a normalized `require` target as seen from `from_bucket`
    ///
    /// Exact ids win; otherwise an alias must name one file, or exactly one
    /// of its files must share the requester's bucket.
    pub fn resolve_require(&self, name: &str, from_bucket: Option<&str>) -> RequireTarget<'_> {
        if let Some((id, _)) = self.files.get_key_value(name) {
            return RequireTarget::Found(id.as_str());
        }

        let Some(candidates) = self.aliases.get(name) else {
            return RequireTarget::Missing;
        };
        if let [only] = candidates.as_slice() {
            return RequireTarget::Found(only.as_str());
        }

        let same_bucket: Vec<&String> = candidates
            .iter()
            .filter(|id| {
                from_bucket.is_some()
                    && self.files.get(*id).and_then(|f| f.bucket.as_deref()) == from_bucket
            })
            .collect();
        match same_bucket.as_slice() {
            [only] => RequireTarget::Found(only.as_str()),
            _ => RequireTarget::Ambiguous(candidates.clone()),
        }
    }

    /// Files named by the `require` calls of `id`
    pub fn explicit_dependencies(&self, id: &str) -> (BTreeSet<String>, Vec<DependencyError>) {
        let mut found = BTreeSet::new();
        let mut errors = Vec::new();
        let Some(file) = self.files.get(id) else {
            return (found, errors);
        };

        for name in &file.deps.requires {
            match self.resolve_require(name, file.bucket.as_deref()) {
                RequireTarget::Found(target) => {
                    if target != id {
                        found.insert(target.to_string());
                    }
                }
                RequireTarget::Ambiguous(candidates) => {
                    errors.push(DependencyError::AmbiguousRequire {
                        from: id.to_string(),
                        name: name.clone(),
                        candidates,
                    });
                }
                RequireTarget::Missing => {
                    errors.push(DependencyError::UnresolvedRequire {
                        from: id.to_string(),
                        name: name.clone(),
                    });
                }
            }
        }

        (found, errors)
    }

    /// Files other than `id` that set a global which `id` reads
    ///
    /// A file that both reads and sets a global (`X = X or {}`) still
    /// depends on the other setters; mutual setters are a cycle.
    pub fn implicit_dependencies(&self, id: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let Some(file) = self.files.get(id) else {
            return found;
        };

        for global in &file.deps.reads {
            if let Some(setters) = self.setters.get(global) {
                found.extend(setters.iter().filter(|s| s.as_str() != id).cloned());
            }
        }

        found
    }
}
