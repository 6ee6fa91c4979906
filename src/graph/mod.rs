//! Dependency graph construction and cycle detection.
//!
//! Aggregates every stack in a request into a directed graph keyed by
//! [`StackId`], with edges from dependents to their dependencies. The
//! invariant is acyclicity: [`DependencyGraph::build`] runs cycle detection
//! and refuses to produce a graph a scheduler could not order. The graph is
//! a derived, disposable artifact - rebuilt per invocation, never mutated
//! after construction.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::{Result, StackctlError};
use crate::resolver::{DependencyEdge, EdgeOrigin};
use crate::stack::StackId;

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently being visited (on the active path).
    Gray,
    /// Node has been fully visited.
    Black,
}

/// Directed dependency graph over stack identities.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<StackId, EdgeOrigin>,
    node_map: HashMap<StackId, NodeIndex>,
}

impl DependencyGraph {
    /// Build a graph from a stack set and its extracted edges.
    ///
    /// Every stack becomes a node whether or not it has edges. Duplicate
    /// edges between the same pair are dropped. Fails with
    /// [`StackctlError::CircularDependency`] if any cycle exists, including
    /// a self-referencing edge (a cycle of length 1).
    pub fn build<I>(stacks: I, edges: &[DependencyEdge]) -> Result<Self>
    where
        I: IntoIterator<Item = StackId>,
    {
        let mut graph = Self { graph: DiGraph::new(), node_map: HashMap::new() };
        for stack in stacks {
            graph.ensure_node(stack);
        }
        for edge in edges {
            graph.add_edge(edge);
        }
        graph.detect_cycles()?;
        Ok(graph)
    }

    fn ensure_node(&mut self, node: StackId) -> NodeIndex {
        if let Some(&index) = self.node_map.get(&node) {
            index
        } else {
            let index = self.graph.add_node(node.clone());
            self.node_map.insert(node, index);
            index
        }
    }

    fn add_edge(&mut self, edge: &DependencyEdge) {
        let from = self.ensure_node(edge.dependent.clone());
        let to = self.ensure_node(edge.dependency.clone());
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, edge.origin);
        }
    }

    /// Detect cycles using DFS with colors, reporting the full ordered
    /// cycle path for diagnosability.
    fn detect_cycles(&self) -> Result<()> {
        let mut colors: HashMap<NodeIndex, Color> = HashMap::new();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            colors.insert(node, Color::White);
        }

        for node in self.graph.node_indices() {
            if matches!(colors.get(&node), Some(Color::White))
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                return Err(StackctlError::CircularDependency {
                    cycle: cycle.iter().map(|idx| self.graph[*idx].to_string()).collect(),
                });
            }
        }

        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        for neighbor in self.graph.neighbors(node) {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    // Found a cycle; slice the active path from where it
                    // starts and close it on its first element.
                    let cycle_start =
                        path.iter().position(|n| *n == neighbor).expect("gray node is on path");
                    let mut cycle = path[cycle_start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// Direct dependencies of `stack` (outgoing edges).
    pub fn dependencies_of(&self, stack: &StackId) -> Vec<StackId> {
        self.neighbors(stack, Direction::Outgoing)
    }

    /// Direct dependents of `stack` (incoming edges).
    pub fn dependents_of(&self, stack: &StackId) -> Vec<StackId> {
        self.neighbors(stack, Direction::Incoming)
    }

    fn neighbors(&self, stack: &StackId, direction: Direction) -> Vec<StackId> {
        match self.node_map.get(stack) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, direction)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Everything `stack` transitively depends on.
    pub fn transitive_dependencies(&self, stack: &StackId) -> HashSet<StackId> {
        self.reachable(stack, Direction::Outgoing)
    }

    /// Everything that transitively depends on `stack`.
    pub fn transitive_dependents(&self, stack: &StackId) -> HashSet<StackId> {
        self.reachable(stack, Direction::Incoming)
    }

    fn reachable(&self, stack: &StackId, direction: Direction) -> HashSet<StackId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(&start) = self.node_map.get(stack) {
            queue.push_back(start);
            while let Some(current) = queue.pop_front() {
                for neighbor in self.graph.neighbors_directed(current, direction) {
                    if seen.insert(self.graph[neighbor].clone()) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        seen
    }

    /// Whether `stack` is a node in this graph.
    pub fn contains(&self, stack: &StackId) -> bool {
        self.node_map.contains_key(stack)
    }

    /// All stack identities in the graph, sorted.
    pub fn stacks(&self) -> Vec<StackId> {
        let mut ids: Vec<StackId> =
            self.graph.node_indices().map(|idx| self.graph[idx].clone()).collect();
        ids.sort();
        ids
    }

    /// All edges, sorted, for diagnostics and the `graph` CLI command.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<DependencyEdge> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (from, to) = self.graph.edge_endpoints(e)?;
                Some(DependencyEdge {
                    dependent: self.graph[from].clone(),
                    dependency: self.graph[to].clone(),
                    origin: self.graph[e],
                })
            })
            .collect();
        edges.sort();
        edges
    }

    /// Number of stacks in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of (deduplicated) dependency edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Human-readable dependency tree rooted at `stack`.
    pub fn to_tree_string(&self, stack: &StackId) -> String {
        let mut result = String::new();
        let mut visited = HashSet::new();
        self.build_tree_string(stack, &mut result, "", true, &mut visited);
        result
    }

    fn build_tree_string(
        &self,
        node: &StackId,
        result: &mut String,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<StackId>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        result.push_str(&format!("{prefix}{connector}{node}\n"));

        if !visited.insert(node.clone()) {
            return;
        }

        let deps = self.dependencies_of(node);
        let child_prefix =
            if is_last { format!("{prefix}    ") } else { format!("{prefix}│   ") };
        for (i, dep) in deps.iter().enumerate() {
            self.build_tree_string(dep, result, &child_prefix, i == deps.len() - 1, visited);
        }
    }
}
