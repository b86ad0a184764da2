//! Dependency graph over derived roles
//!
//! Edges run from a role to the derived roles it depends on through its
//! parent-role list. Cycle detection uses three-color DFS; evaluation order
//! comes from Kahn's algorithm, so roles that depend only on base roles are
//! ordered first.

use std::collections::{HashMap, VecDeque};

use crate::error::{AuthzError, Result};

/// Dependency graph node
#[derive(Debug, Clone, Default)]
struct GraphNode {
    /// Derived roles this node depends on
    dependencies: Vec<String>,
}

/// Dependency graph for derived roles
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    nodes: HashMap<String, GraphNode>,
}

#[derive(Debug, PartialEq, Clone, Copy)]
enum VisitState {
    Visiting,
    Visited,
}

impl RoleGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Adds a node for a derived role
    pub fn add_node(&mut self, role: impl Into<String>) {
        self.nodes.entry(role.into()).or_default();
    }

    /// Records that `role` depends on `depends_on`
    ///
    /// Duplicate edges are ignored.
    pub fn add_dependency(&mut self, role: &str, depends_on: &str) {
        let node = self.nodes.entry(role.to_string()).or_default();
        if !node.dependencies.iter().any(|d| d == depends_on) {
            node.dependencies.push(depends_on.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Detects cycles with three-color DFS
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::CircularDependency` carrying the cycle path.
    pub fn detect_cycles(&self) -> Result<()> {
        let mut state: HashMap<&str, VisitState> = HashMap::new();

        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();

        for name in names {
            if !state.contains_key(name) {
                self.dfs(name, &mut state, &mut Vec::new())?;
            }
        }

        Ok(())
    }

    fn dfs<'a>(
        &'a self,
        node: &'a str,
        state: &mut HashMap<&'a str, VisitState>,
        path: &mut Vec<&'a str>,
    ) -> Result<()> {
        match state.get(node) {
            Some(VisitState::Visiting) => {
                // Back edge: the cycle starts where `node` first appears
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(node.to_string());
                return Err(AuthzError::CircularDependency { cycle });
            }
            Some(VisitState::Visited) => return Ok(()),
            None => {}
        }

        state.insert(node, VisitState::Visiting);
        path.push(node);

        if let Some(graph_node) = self.nodes.get(node) {
            for dep in &graph_node.dependencies {
                if self.nodes.contains_key(dep.as_str()) {
                    self.dfs(dep, state, path)?;
                }
            }
        }

        path.pop();
        state.insert(node, VisitState::Visited);
        Ok(())
    }

    /// Returns the evaluation order via Kahn's algorithm
    ///
    /// Dependencies come before dependents. Ties are broken by name so the
    /// order is deterministic.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        self.detect_cycles()?;

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut reverse_edges: HashMap<&str, Vec<&str>> = HashMap::new();

        for name in self.nodes.keys() {
            in_degree.insert(name, 0);
            reverse_edges.insert(name, Vec::new());
        }

        for (name, node) in &self.nodes {
            let mut degree = 0;
            for dep in &node.dependencies {
                if self.nodes.contains_key(dep.as_str()) {
                    degree += 1;
                    reverse_edges
                        .get_mut(dep.as_str())
                        .expect("node present")
                        .push(name);
                }
            }
            in_degree.insert(name, degree);
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(name, _)| *name)
            .collect();
        ready.sort_unstable();

        let mut queue: VecDeque<&str> = ready.into_iter().collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(current) = queue.pop_front() {
            sorted.push(current.to_string());

            let mut unblocked = Vec::new();
            if let Some(dependents) = reverse_edges.get(current) {
                for dependent in dependents {
                    let degree = in_degree.get_mut(dependent).expect("node present");
                    *degree -= 1;
                    if *degree == 0 {
                        unblocked.push(*dependent);
                    }
                }
            }
            unblocked.sort_unstable();
            queue.extend(unblocked);
        }

        if sorted.len() != self.nodes.len() {
            return Err(AuthzError::CircularDependency {
                cycle: vec!["<unresolved>".to_string()],
            });
        }

        Ok(sorted)
    }
}
