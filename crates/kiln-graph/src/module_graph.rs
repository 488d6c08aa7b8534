//! Module graph of a single script bundle.
//!
//! Modules are kept in discovery order, dependencies in import order. The
//! script runner emits modules in [`ModuleGraph::emit_order`], so the graph
//! is what makes bundle output deterministic.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use serde::{Deserialize, Serialize};

/// Identifier of a module inside a bundle.
///
/// The path of the module relative to the bundle root, always with forward
/// slashes, so ids are stable across machines and checkouts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id of `path` relative to `root`.
    ///
    /// Paths outside `root` keep their full path.
    pub fn from_path(root: &Path, path: &Path) -> Self {
        match path.strip_prefix(root) {
            Ok(relative) => Self(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            ),
            Err(_) => Self(path.to_string_lossy().replace('\\', "/")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone)]
struct ModuleNode {
    path: PathBuf,
    dependencies: Vec<ModuleId>,
}

/// Directed import graph rooted at one entry module.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    entry: Option<ModuleId>,
    order: Vec<ModuleId>,
    nodes: HashMap<ModuleId, ModuleNode>,
    dependents: HashMap<ModuleId, HashSet<ModuleId>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module. Returns `false` if it was already present.
    pub fn add_module(&mut self, id: ModuleId, path: PathBuf) -> bool {
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.order.push(id.clone());
        self.nodes.insert(
            id,
            ModuleNode {
                path,
                dependencies: Vec::new(),
            },
        );
        true
    }

    /// Record that `from` imports `to`. Repeated imports are kept once.
    pub fn add_dependency(&mut self, from: &ModuleId, to: ModuleId) {
        let Some(node) = self.nodes.get_mut(from) else {
            return;
        };
        if !node.dependencies.contains(&to) {
            node.dependencies.push(to.clone());
        }
        self.dependents.entry(to).or_default().insert(from.clone());
    }

    pub fn set_entry(&mut self, id: ModuleId) {
        self.entry = Some(id);
    }

    pub fn entry(&self) -> Option<&ModuleId> {
        self.entry.as_ref()
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn path(&self, id: &ModuleId) -> Option<&Path> {
        self.nodes.get(id).map(|n| n.path.as_path())
    }

    pub fn dependencies(&self, id: &ModuleId) -> &[ModuleId] {
        self.nodes
            .get(id)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or_default()
    }

    pub fn dependents(&self, id: &ModuleId) -> BTreeSet<ModuleId> {
        self.dependents
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Modules in discovery order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every source file in the graph, sorted.
    pub fn files(&self) -> BTreeSet<PathBuf> {
        self.nodes.values().map(|n| n.path.clone()).collect()
    }

    /// Dependencies before dependents, starting from the entry.
    ///
    /// Cycles are broken at the first revisit. Modules unreachable from the
    /// entry are appended in discovery order.
    pub fn emit_order(&self) -> Vec<ModuleId> {
        let mut visited = HashSet::default();
        let mut ordered = Vec::with_capacity(self.order.len());

        let roots = self.entry.iter().chain(self.order.iter());
        for root in roots {
            if visited.contains(root) {
                continue;
            }
            // Iterative post-order so deep import chains cannot overflow the stack.
            let mut stack: Vec<(ModuleId, usize)> = vec![(root.clone(), 0)];
            visited.insert(root.clone());

            while let Some((current, next_child)) = stack.pop() {
                let deps = self.dependencies(&current);
                if let Some(child) = deps.get(next_child) {
                    stack.push((current.clone(), next_child + 1));
                    if self.contains(child) && visited.insert(child.clone()) {
                        stack.push((child.clone(), 0));
                    }
                } else {
                    ordered.push(current);
                }
            }
        }

        ordered
    }

    /// `changed` plus every module that transitively imports one of them.
    pub fn transitive_dependents<'a, I>(&self, changed: I) -> BTreeSet<ModuleId>
    where
        I: IntoIterator<Item = &'a ModuleId>,
    {
        let mut affected = BTreeSet::new();
        let mut queue: Vec<ModuleId> = changed.into_iter().cloned().collect();

        while let Some(id) = queue.pop() {
            if !affected.insert(id.clone()) {
                continue;
            }
            if let Some(importers) = self.dependents.get(&id) {
                queue.extend(importers.iter().cloned());
            }
        }

        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)]) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for (from, to) in edges {
            graph.add_module(ModuleId::from(*from), PathBuf::from(format!("/p/{from}")));
            graph.add_module(ModuleId::from(*to), PathBuf::from(format!("/p/{to}")));
            graph.add_dependency(&ModuleId::from(*from), ModuleId::from(*to));
        }
        graph.set_entry(ModuleId::from(edges[0].0));
        graph
    }

    fn ids(list: &[ModuleId]) -> Vec<&str> {
        list.iter().map(|m| m.as_str()).collect()
    }

    #[test]
    fn module_id_is_relative_with_forward_slashes() {
        let id = ModuleId::from_path(Path::new("/p"), Path::new("/p/src/lib/a.js"));
        assert_eq!(id.as_str(), "src/lib/a.js");
    }

    #[test]
    fn emit_order_puts_dependencies_first() {
        let graph = graph(&[("main.js", "a.js"), ("main.js", "b.js"), ("a.js", "c.js")]);
        assert_eq!(
            ids(&graph.emit_order()),
            vec!["c.js", "a.js", "b.js", "main.js"]
        );
    }

    #[test]
    fn emit_order_survives_cycles() {
        let graph = graph(&[("main.js", "a.js"), ("a.js", "b.js"), ("b.js", "a.js")]);
        let order = graph.emit_order();
        assert_eq!(order.len(), 3);
        assert_eq!(order.last().unwrap().as_str(), "main.js");
    }

    #[test]
    fn duplicate_imports_are_recorded_once() {
        let mut graph = graph(&[("main.js", "a.js")]);
        graph.add_dependency(&ModuleId::from("main.js"), ModuleId::from("a.js"));
        assert_eq!(graph.dependencies(&ModuleId::from("main.js")).len(), 1);
    }

    #[test]
    fn transitive_dependents_walk_up_to_entry() {
        let graph = graph(&[("main.js", "a.js"), ("a.js", "c.js"), ("main.js", "b.js")]);
        let affected = graph.transitive_dependents([&ModuleId::from("c.js")]);
        let affected: Vec<_> = affected.iter().map(|m| m.as_str()).collect();
        assert_eq!(affected, vec!["a.js", "c.js", "main.js"]);
    }
}
