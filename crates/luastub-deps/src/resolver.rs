//! Analysis order resolution
//!
//! Orders files so that whatever a file requires, or whatever global it
//! reads at load time, has already been analyzed. Cycles are broken at the
//! first edge that points back into a file still being visited.

use crate::{DependencyError, DependencyGraph};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// The final order plus advisories collected while computing it
#[derive(Debug, Default)]
pub struct ResolvedOrder {
    pub order: Vec<String>,
    pub diagnostics: Vec<DependencyError>,
}

/// Resolves the single-pass analysis order of a `DependencyGraph`
pub struct OrderResolver<'g> {
    graph: &'g DependencyGraph,
    placed: Vec<String>,
    placed_set: HashSet<String>,
    seen: HashSet<String>,
    reported: HashSet<(String, String)>,
    requires_checked: HashSet<String>,
    diagnostics: Vec<DependencyError>,
}

impl<'g> OrderResolver<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            placed: Vec::new(),
            placed_set: HashSet::new(),
            seen: HashSet::new(),
            reported: HashSet::new(),
            requires_checked: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Compute the order: buckets in configured order, then unbucketed files
    pub fn resolve(mut self) -> ResolvedOrder {
        let mut groups: Vec<Vec<String>> = self
            .graph
            .buckets()
            .iter()
            .map(|bucket| {
                self.graph
                    .iter()
                    .filter(|f| f.bucket.as_deref() == Some(bucket.as_str()))
                    .map(|f| f.id.clone())
                    .collect()
            })
            .collect();
        groups.push(
            self.graph
                .iter()
                .filter(|f| f.bucket.is_none())
                .map(|f| f.id.clone())
                .collect(),
        );

        for mut group in groups {
            group.sort();
            self.resolve_group(group);
        }

        debug!(files = self.placed.len(), "resolved analysis order");
        ResolvedOrder {
            order: self.placed,
            diagnostics: self.diagnostics,
        }
    }

    /// Worklist over one bucket; `stack.pop()` yields the greatest id first
    fn resolve_group(&mut self, stack: Vec<String>) {
        let mut stack = stack;

        while let Some(id) = stack.pop() {
            if self.placed_set.contains(&id) {
                continue;
            }
            self.seen.insert(id.clone());

            let mut pending = Vec::new();
            for dep in self.dependencies(&id) {
                if self.placed_set.contains(&dep) {
                    continue;
                }
                if self.seen.contains(&dep) {
                    self.report_cycle(&id, &dep);
                    continue;
                }
                pending.push(dep);
            }

            if pending.is_empty() {
                self.placed_set.insert(id.clone());
                self.placed.push(id);
            } else {
                stack.push(id);
                stack.extend(pending);
            }
        }
    }

    fn dependencies(&mut self, id: &str) -> BTreeSet<String> {
        let (mut deps, errors) = self.graph.explicit_dependencies(id);
        // Requires are re-read when a file is revisited; report them once
        if self.requires_checked.insert(id.to_string()) {
            self.diagnostics.extend(errors);
        }
        deps.extend(self.graph.implicit_dependencies(id));
        deps
    }

    fn report_cycle(&mut self, from: &str, to: &str) {
        let key = (from.to_string(), to.to_string());
        if self.reported.insert(key) {
            debug!(from, to, "breaking dependency cycle");
            self.diagnostics.push(DependencyError::CycleBroken {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileDependencies;

    fn graph(files: &[(&str, &[&str], &[&str], &[&str])]) -> DependencyGraph {
        let mut graph =
            DependencyGraph::new(vec!["shared".into(), "client".into(), "server".into()]);
        for (id, reads, writes, requires) in files {
            let deps = FileDependencies {
                reads: reads.iter().map(|s| s.to_string()).collect(),
                writes: writes.iter().map(|s| s.to_string()).collect(),
                requires: requires.iter().map(|s| s.to_string()).collect(),
            };
            graph.insert(id.to_string(), deps).unwrap();
        }
        graph
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).expect("id missing from order")
    }

    #[test]
    fn test_required_file_comes_first() {
        let g = graph(&[
            ("shared/a", &[], &[], &["b"]),
            ("shared/b", &[], &[], &[]),
        ]);
        let order = OrderResolver::new(&g).resolve().order;
        assert!(position(&order, "shared/b") < position(&order, "shared/a"));
    }

    #[test]
    fn test_independent_files_greatest_first() {
        let g = graph(&[
            ("shared/a", &[], &[], &[]),
            ("shared/b", &[], &[], &[]),
            ("shared/c", &[], &[], &[]),
        ]);
        let order = OrderResolver::new(&g).resolve().order;
        assert_eq!(order, vec!["shared/c", "shared/b", "shared/a"]);
    }

    #[test]
    fn test_buckets_in_configured_order() {
        let g = graph(&[
            ("server/s", &[], &[], &[]),
            ("client/c", &[], &[], &[]),
            ("shared/x", &[], &[], &[]),
            ("other/o", &[], &[], &[]),
        ]);
        let order = OrderResolver::new(&g).resolve().order;
        assert_eq!(order, vec!["shared/x", "client/c", "server/s", "other/o"]);
    }

    #[test]
    fn test_cycle_terminates_with_each_file_once() {
        let g = graph(&[
            ("shared/a", &[], &[], &["b"]),
            ("shared/b", &[], &[], &["a"]),
        ]);
        let resolved = OrderResolver::new(&g).resolve();
        assert_eq!(resolved.order.len(), 2);
        assert!(resolved.order.contains(&"shared/a".to_string()));
        assert!(resolved.order.contains(&"shared/b".to_string()));
        assert!(resolved
            .diagnostics
            .iter()
            .any(|d| matches!(d, DependencyError::CycleBroken { .. })));
    }

    #[test]
    fn test_global_setter_is_implicit_dependency() {
        let g = graph(&[
            ("shared/a_reader", &["Config"], &[], &[]),
            ("shared/z_setter", &[], &["Config"], &[]),
        ]);
        let order = OrderResolver::new(&g).resolve().order;
        assert!(position(&order, "shared/z_setter") < position(&order, "shared/a_reader"));

        let g = graph(&[
            ("shared/z_reader", &["Config"], &[], &[]),
            ("shared/a_setter", &[], &["Config"], &[]),
        ]);
        let order = OrderResolver::new(&g).resolve().order;
        assert!(position(&order, "shared/a_setter") < position(&order, "shared/z_reader"));
    }

    #[test]
    fn test_extending_file_waits_for_defining_file() {
        // shared/z_ext: `Config = Config or {}`
        let g = graph(&[
            ("shared/a_base", &[], &["Config"], &[]),
            ("shared/z_ext", &["Config"], &["Config"], &[]),
        ]);
        let resolved = OrderResolver::new(&g).resolve();
        assert_eq!(resolved.order, vec!["shared/a_base", "shared/z_ext"]);
        assert!(resolved.diagnostics.is_empty());
    }

    #[test]
    fn test_mutual_extenders_terminate() {
        let g = graph(&[
            ("shared/a", &["Config"], &["Config"], &[]),
            ("shared/b", &["Config"], &["Config"], &[]),
        ]);
        let resolved = OrderResolver::new(&g).resolve();
        assert_eq!(resolved.order.len(), 2);
        assert!(resolved
            .diagnostics
            .iter()
            .any(|d| matches!(d, DependencyError::CycleBroken { .. })));
    }

    #[test]
    fn test_cross_bucket_dependency_is_pulled_forward() {
        let g = graph(&[
            ("shared/uses_client", &[], &[], &["client/Thing"]),
            ("client/Thing", &[], &[], &[]),
        ]);
        let order = OrderResolver::new(&g).resolve().order;
        assert_eq!(order, vec!["client/Thing", "shared/uses_client"]);
    }

    #[test]
    fn test_three_file_cycle_terminates() {
        let g = graph(&[
            ("shared/a", &[], &[], &["b"]),
            ("shared/b", &[], &[], &["c"]),
            ("shared/c", &[], &[], &["a"]),
        ]);
        let order = OrderResolver::new(&g).resolve().order;
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn test_unresolved_require_is_soft() {
        let g = graph(&[("shared/a", &[], &[], &["missing"])]);
        let resolved = OrderResolver::new(&g).resolve();
        assert_eq!(resolved.order, vec!["shared/a"]);
        assert!(resolved.diagnostics.iter().all(|d| !d.is_hard_error()));
    }
}
