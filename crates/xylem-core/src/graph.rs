//! Dependency graph over node names, backed by petgraph.
//!
//! Edges point from a node to what it depends on. Execution order is the
//! reversed topological sort, so dependencies always run first. Cycles are
//! detected up front and reported with the offending path.

use crate::error::PipelineError;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// Directed acyclic graph of pipeline nodes.
#[derive(Default)]
pub struct DepGraph {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Adding the same name twice is a no-op.
    pub fn add_node(&mut self, name: &str) {
        if !self.indices.contains_key(name) {
            let idx = self.graph.add_node(name.to_string());
            self.indices.insert(name.to_string(), idx);
        }
    }

    /// Add a dependency edge `from → to` ("from depends on to").
    ///
    /// Duplicate edges are idempotent. An unknown `to` is a hard error.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), PipelineError> {
        let Some(&from_idx) = self.indices.get(from) else {
            return Err(PipelineError::UnknownDependency {
                node: from.to_string(),
                dependency: to.to_string(),
            });
        };
        let Some(&to_idx) = self.indices.get(to) else {
            return Err(PipelineError::UnknownDependency {
                node: from.to_string(),
                dependency: to.to_string(),
            });
        };
        self.graph.update_edge(from_idx, to_idx, ());
        Ok(())
    }

    /// Execution order: every dependency before its dependents.
    pub fn execution_order(&self) -> Result<Vec<String>, PipelineError> {
        match toposort(&self.graph, None) {
            Ok(sorted) => Ok(sorted
                .iter()
                .rev()
                .filter_map(|&idx| self.graph.node_weight(idx))
                .cloned()
                .collect()),
            Err(cycle) => Err(PipelineError::Cycle(self.cycle_path(cycle.node_id()))),
        }
    }

    /// Direct dependencies of a node.
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Every node that transitively depends on `name`.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        let mut affected = Vec::new();
        let mut queue: Vec<String> = self.neighbors(name, Direction::Incoming);
        while let Some(node) = queue.pop() {
            if affected.contains(&node) {
                continue;
            }
            queue.extend(self.neighbors(&node, Direction::Incoming));
            affected.push(node);
        }
        affected.sort();
        affected
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn neighbors(&self, name: &str, dir: Direction) -> Vec<String> {
        self.indices
            .get(name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, dir)
                    .filter_map(|n| self.graph.node_weight(n))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names forming the cycle that contains `start`, closed back on the
    /// first element for readability.
    fn cycle_path(&self, start: NodeIndex) -> Vec<String> {
        for scc in tarjan_scc(&self.graph) {
            if scc.len() > 1 && scc.contains(&start) {
                let mut path: Vec<String> = scc
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .cloned()
                    .collect();
                if let Some(first) = path.first().cloned() {
                    path.push(first);
                }
                return path;
            }
        }
        // Self-loop.
        let name = self
            .graph
            .node_weight(start)
            .cloned()
            .unwrap_or_default();
        vec![name.clone(), name]
    }
}
