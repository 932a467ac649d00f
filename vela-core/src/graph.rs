//! Dependency graph between resource declarations
//!
//! Nodes are logical ids. An edge `a -> b` means `a` refers to `b` and must be
//! declared after it.

use std::collections::{HashMap, HashSet};

/// Dependency between resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Target logical id
    pub target: String,
    /// Referenced attribute (e.g., "id"), `None` for an explicit ordering edge
    pub attribute: Option<String>,
}

impl Dependency {
    pub fn reference(target: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            attribute: Some(attribute.into()),
        }
    }

    pub fn ordering(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            attribute: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("'{from}' refers to '{target}', which is not declared")]
    UnknownTarget { from: String, target: String },
}

/// Dependency graph over logical ids
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in declaration order
    nodes: Vec<String>,
    index: HashSet<String>,
    /// Node -> list of dependencies
    edges: HashMap<String, Vec<Dependency>>,
    /// Reverse edges: target -> nodes that depend on it
    reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; returns false if it was already present
    pub fn add_node(&mut self, node: impl Into<String>) -> bool {
        let node = node.into();
        if self.index.insert(node.clone()) {
            self.nodes.push(node);
            true
        } else {
            false
        }
    }

    pub fn add_edge(&mut self, from: impl Into<String>, dependency: Dependency) {
        let from = from.into();
        let target = dependency.target.clone();
        let deps = self.edges.entry(from.clone()).or_default();
        if deps.iter().any(|d| d.target == target) {
            return;
        }
        deps.push(dependency);
        self.reverse_edges.entry(target).or_default().push(from);
    }

    pub fn contains(&self, node: &str) -> bool {
        self.index.contains(node)
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn dependencies_of(&self, node: &str) -> &[Dependency] {
        self.edges.get(node).map_or(&[], |v| v.as_slice())
    }

    pub fn dependents_of(&self, node: &str) -> &[String] {
        self.reverse_edges.get(node).map_or(&[], |v| v.as_slice())
    }

    /// Nodes that depend on nothing, in declaration order
    pub fn root_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| self.dependencies_of(n).is_empty())
            .map(String::as_str)
            .collect()
    }

    /// Every edge must point at a declared node
    pub fn check_targets(&self) -> Result<(), GraphError> {
        for from in &self.nodes {
            for dep in self.dependencies_of(from) {
                if !self.contains(&dep.target) {
                    return Err(GraphError::UnknownTarget {
                        from: from.clone(),
                        target: dep.target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn has_cycle(&self) -> bool {
        matches!(self.topological_order(), Err(GraphError::Cycle(_)))
    }

    /// Order nodes so that every node comes after its dependencies
    ///
    /// Ties keep declaration order. Edges to undeclared nodes are ignored;
    /// use [`check_targets`](Self::check_targets) to reject them.
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let mut sorted = Vec::with_capacity(self.nodes.len());
        let mut visited: HashSet<&str> = HashSet::new();
        let mut visiting: Vec<&str> = Vec::new();

        for node in &self.nodes {
            self.visit(node, &mut visited, &mut visiting, &mut sorted)?;
        }

        Ok(sorted)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        visiting: &mut Vec<&'a str>,
        sorted: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        if visited.contains(node) {
            return Ok(());
        }
        if let Some(pos) = visiting.iter().position(|n| *n == node) {
            let mut cycle: Vec<String> = visiting[pos..].iter().map(|n| n.to_string()).collect();
            cycle.push(node.to_string());
            return Err(GraphError::Cycle(cycle));
        }

        visiting.push(node);
        for dep in self.dependencies_of(node) {
            if self.contains(&dep.target) {
                self.visit(&dep.target, visited, visiting, sorted)?;
            }
        }
        visiting.pop();

        visited.insert(node);
        sorted.push(node.to_string());
        Ok(())
    }
}
