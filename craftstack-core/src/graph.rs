//! Graph - Dependency analysis between declarations
//!
//! Edges come from `ResourceRef` values found in attributes and from explicit
//! `depends_on` entries. The graph yields the order in which the engine
//! materializes declarations.

use std::collections::{HashMap, HashSet};

use crate::error::ApplyError;
use crate::resource::Value;

/// Attribute name recorded for explicit ordering edges
pub const EXPLICIT_DEPENDENCY: &str = "depends_on";

/// Dependency between declarations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Target binding name
    pub target: String,
    /// Referenced attribute (e.g., "arn"); empty for explicit dependencies
    pub attribute: String,
    /// Where this reference is used (e.g., "role_arn")
    pub used_in: String,
}

impl Dependency {
    /// Returns true if this edge was declared with `depends_on`
    pub fn is_explicit(&self) -> bool {
        self.used_in == EXPLICIT_DEPENDENCY
    }
}

/// Dependency graph over binding names
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Binding names in declaration order
    pub nodes: Vec<String>,
    /// Binding name -> list of dependencies
    pub edges: HashMap<String, Vec<Dependency>>,
    /// Reverse edges: target -> list of bindings that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node; fails on a duplicate binding name
    pub fn add_node(&mut self, name: impl Into<String>) -> Result<(), ApplyError> {
        let name = name.into();
        if self.nodes.contains(&name) {
            return Err(ApplyError::DuplicateBinding(name));
        }
        self.nodes.push(name);
        Ok(())
    }

    /// Add a dependency edge
    pub fn add_edge(&mut self, from: String, dependency: Dependency) {
        let target = dependency.target.clone();
        let deps = self.edges.entry(from.clone()).or_default();
        if deps.contains(&dependency) {
            return;
        }
        deps.push(dependency);
        let dependents = self.reverse_edges.entry(target).or_default();
        if !dependents.contains(&from) {
            dependents.push(from);
        }
    }

    /// Add one edge per reference found in `value`
    pub fn add_references(&mut self, from: &str, used_in: &str, value: &Value) {
        let mut refs = Vec::new();
        collect_references(value, &mut refs);
        for (target, attribute) in refs {
            self.add_edge(
                from.to_string(),
                Dependency {
                    target,
                    attribute,
                    used_in: used_in.to_string(),
                },
            );
        }
    }

    /// Get direct dependencies of a binding
    pub fn dependencies_of(&self, binding: &str) -> &[Dependency] {
        self.edges.get(binding).map_or(&[], |v| v.as_slice())
    }

    /// Get bindings that depend on this binding
    pub fn dependents_of(&self, binding: &str) -> &[String] {
        self.reverse_edges
            .get(binding)
            .map_or(&[], |v| v.as_slice())
    }

    /// Every binding `binding` depends on, directly or not
    pub fn transitive_dependencies(&self, binding: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![binding.to_string()];
        while let Some(current) = stack.pop() {
            for dep in self.dependencies_of(&current) {
                if seen.insert(dep.target.clone()) {
                    stack.push(dep.target.clone());
                }
            }
        }
        seen
    }

    /// Fail if any edge targets a binding that was never declared
    pub fn check_targets(&self) -> Result<(), ApplyError> {
        for from in &self.nodes {
            for dep in self.dependencies_of(from) {
                if !self.nodes.contains(&dep.target) {
                    return Err(ApplyError::UnknownBinding {
                        from: from.clone(),
                        binding: dep.target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Check if the graph has any cycles
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for node in self.edges.keys() {
            if self.has_cycle_util(node, &mut visited, &mut rec_stack) {
                return true;
            }
        }
        false
    }

    fn has_cycle_util(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> bool {
        if rec_stack.contains(node) {
            return true;
        }
        if visited.contains(node) {
            return false;
        }

        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if self.has_cycle_util(&dep.target, visited, rec_stack) {
                    return true;
                }
            }
        }

        rec_stack.remove(node);
        false
    }

    /// Topological order, dependencies first.
    ///
    /// Among bindings that are ready at the same time, the one declared first
    /// comes first, so an acyclic stack always sorts the same way.
    pub fn topological_order(&self) -> Result<Vec<String>, ApplyError> {
        self.check_targets()?;

        let mut done: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(next) = self.nodes.iter().find(|n| {
            !done.contains(n.as_str())
                && self
                    .dependencies_of(n)
                    .iter()
                    .all(|d| done.contains(d.target.as_str()))
        }) {
            done.insert(next.as_str());
            order.push(next.clone());
        }

        if order.len() < self.nodes.len() {
            let blocked = self
                .nodes
                .iter()
                .filter(|n| !done.contains(n.as_str()))
                .cloned()
                .collect();
            return Err(ApplyError::Cycle(blocked));
        }
        Ok(order)
    }

    /// Group bindings into layers: every binding only depends on bindings in
    /// earlier layers, so members of one layer are mutually independent.
    pub fn layers(&self) -> Result<Vec<Vec<String>>, ApplyError> {
        self.check_targets()?;

        let mut remaining: Vec<&String> = self.nodes.iter().collect();
        let mut placed: HashSet<&str> = HashSet::new();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&String>, Vec<&String>) =
                remaining.into_iter().partition(|n| {
                    self.dependencies_of(n)
                        .iter()
                        .all(|d| placed.contains(d.target.as_str()))
                });

            if ready.is_empty() {
                return Err(ApplyError::Cycle(
                    blocked.into_iter().cloned().collect(),
                ));
            }

            placed.extend(ready.iter().map(|n| n.as_str()));
            layers.push(ready.into_iter().cloned().collect());
            remaining = blocked;
        }

        Ok(layers)
    }
}

/// Collect (binding, attribute) pairs referenced anywhere inside `value`
pub fn collect_references(value: &Value, refs: &mut Vec<(String, String)>) {
    match value {
        Value::ResourceRef(binding, attribute) => {
            refs.push((binding.clone(), attribute.clone()));
        }
        Value::List(items) => {
            for item in items {
                collect_references(item, refs);
            }
        }
        Value::Map(map) => {
            for v in map.values() {
                collect_references(v, refs);
            }
        }
        _ => {}
    }
}
