//! # Dependency Graph
//!
//! Adjacency (module → dependencies) and reverse adjacency (module → dependents),
//! maintained incrementally on register/unregister, plus a deterministic
//! topological sort.
//!
//! The sort is an explicit-stack depth-first traversal with three colours
//! (unvisited / visiting / visited). Reaching a node that is still *visiting*
//! means a back edge, i.e. a cycle; the error names that node and the cycle path.
//! Roots are visited in insertion order and edges in declaration order, so the
//! same graph always yields the same order.

use crate::error::RegistryError;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Insertion order of nodes
    nodes: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Add a node with its declared dependency edges. Edges may point at nodes
    /// that are not (yet) present; they are ignored by the sort until they are.
    pub fn add_node(&mut self, name: &str, dependencies: Vec<String>) {
        if self.contains(name) {
            self.remove_node(name);
        }

        for dependency in &dependencies {
            let entry = self.dependents.entry(dependency.clone()).or_default();
            if !entry.iter().any(|d| d == name) {
                entry.push(name.to_string());
            }
        }

        self.dependencies.insert(name.to_string(), dependencies);
        self.nodes.push(name.to_string());
    }

    /// Remove a node and its outgoing edges. Edges from other nodes *to* this
    /// node remain declared (they become dangling) so re-adding restores them.
    pub fn remove_node(&mut self, name: &str) {
        if let Some(dependencies) = self.dependencies.remove(name) {
            for dependency in dependencies {
                if let Some(dependents) = self.dependents.get_mut(&dependency) {
                    dependents.retain(|d| d != name);
                    if dependents.is_empty() {
                        self.dependents.remove(&dependency);
                    }
                }
            }
        }
        self.nodes.retain(|n| n != name);
    }

    /// Declared dependencies of `name`; empty for unknown names.
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.dependencies.get(name).cloned().unwrap_or_default()
    }

    /// Nodes that declare a dependency on `name`; empty for unknown names.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.dependents.get(name).cloned().unwrap_or_default()
    }

    /// Snapshot of the adjacency mapping.
    pub fn adjacency(&self) -> HashMap<String, Vec<String>> {
        self.dependencies.clone()
    }

    /// All present nodes ordered so that each appears after its present dependencies.
    pub fn topological_order(&self) -> Result<Vec<String>, RegistryError> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.nodes.len());
        let mut order: Vec<String> = Vec::with_capacity(self.nodes.len());

        for root in &self.nodes {
            if marks.contains_key(root.as_str()) {
                continue;
            }

            // (node, index of the next dependency edge to follow)
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            marks.insert(root.as_str(), Mark::Visiting);

            while let Some(&(node, next_edge)) = stack.last() {
                let edges = self.present_dependencies(node);

                if next_edge < edges.len() {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    let dependency = edges[next_edge];
                    match marks.get(dependency) {
                        None => {
                            marks.insert(dependency, Mark::Visiting);
                            stack.push((dependency, 0));
                        }
                        Some(Mark::Visiting) => {
                            return Err(Self::cycle_error(&stack, dependency));
                        }
                        Some(Mark::Visited) => {}
                    }
                } else {
                    marks.insert(node, Mark::Visited);
                    order.push(node.to_string());
                    stack.pop();
                }
            }
        }

        Ok(order)
    }

    /// Would adding `name` with these edges close a cycle?
    pub fn would_create_cycle(&self, name: &str, dependencies: &[String]) -> Option<RegistryError> {
        let mut candidate = self.clone();
        candidate.add_node(name, dependencies.to_vec());
        candidate.topological_order().err()
    }

    /// Every node transitively reachable from `name` through dependency edges.
    pub fn transitive_dependencies(&self, name: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut result = Vec::new();
        let mut stack: Vec<&str> = self.present_dependencies(name);

        while let Some(node) = stack.pop() {
            if seen.insert(node) {
                result.push(node.to_string());
                stack.extend(self.present_dependencies(node));
            }
        }
        result
    }

    fn present_dependencies(&self, name: &str) -> Vec<&str> {
        self.dependencies
            .get(name)
            .map(|deps| {
                deps.iter()
                    .filter(|d| self.dependencies.contains_key(d.as_str()))
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn cycle_error(stack: &[(&str, usize)], reentered: &str) -> RegistryError {
        let start = stack
            .iter()
            .position(|(node, _)| *node == reentered)
            .unwrap_or(0);
        let mut cycle: Vec<String> = stack[start..]
            .iter()
            .map(|(node, _)| node.to_string())
            .collect();
        cycle.push(reentered.to_string());

        RegistryError::CircularDependency {
            module: reentered.to_string(),
            cycle,
        }
    }
}
