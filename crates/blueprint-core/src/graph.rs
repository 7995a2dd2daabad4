//! The dependency graph built by the Dependency Analyser and consumed by the
//! wave-partitioning scheduler in `blueprint-engine` (spec §4.2, §9).

use serde::{Deserialize, Serialize};

/// One node in the blueprint's dependency graph: a resource, link, or
/// nested child. Links depend on both of their endpoint resources and are
/// scheduled alongside them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyGraphNode {
    Resource(String),
    Link(String),
    Child(String),
}

impl DependencyGraphNode {
    pub fn name(&self) -> &str {
        match self {
            DependencyGraphNode::Resource(n)
            | DependencyGraphNode::Link(n)
            | DependencyGraphNode::Child(n) => n,
        }
    }
}

/// A dependency graph over [`DependencyGraphNode`]s, stored as forward and
/// reverse adjacency lists over node indices so topological sort and
/// reverse-dependent lookups are both O(1) per edge.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<DependencyGraphNode>,
    /// `forward[i]` = indices of nodes that `nodes[i]` depends on.
    forward: Vec<Vec<usize>>,
    /// `reverse[i]` = indices of nodes that depend on `nodes[i]`.
    reverse: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node if not already present (matched by node identity) and
    /// returns its index.
    pub fn add_node(&mut self, node: DependencyGraphNode) -> usize {
        if let Some(idx) = self.nodes.iter().position(|n| n == &node) {
            return idx;
        }
        self.nodes.push(node);
        self.forward.push(Vec::new());
        self.reverse.push(Vec::new());
        self.nodes.len() - 1
    }

    /// Records that `dependent` depends on `dependency`.
    pub fn add_edge(&mut self, dependent: usize, dependency: usize) {
        if !self.forward[dependent].contains(&dependency) {
            self.forward[dependent].push(dependency);
        }
        if !self.reverse[dependency].contains(&dependent) {
            self.reverse[dependency].push(dependent);
        }
    }

    pub fn node(&self, idx: usize) -> &DependencyGraphNode {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dependencies_of(&self, idx: usize) -> &[usize] {
        &self.forward[idx]
    }

    pub fn dependents_of(&self, idx: usize) -> &[usize] {
        &self.reverse[idx]
    }

    /// Partitions the graph into deployment waves using Kahn's algorithm:
    /// each wave contains every node whose remaining dependencies have all
    /// been placed in an earlier wave. Returns `Err` with the indices still
    /// unplaced (i.e. involved in a cycle) if the graph cannot be fully
    /// ordered.
    pub fn topological_waves(&self) -> Result<Vec<Vec<usize>>, Vec<usize>> {
        let mut remaining: Vec<usize> = (0..self.nodes.len())
            .map(|i| self.forward[i].len())
            .collect();
        let mut placed = vec![false; self.nodes.len()];
        let mut waves = Vec::new();
        let mut placed_count = 0;

        while placed_count < self.nodes.len() {
            let wave: Vec<usize> = (0..self.nodes.len())
                .filter(|&i| !placed[i] && remaining[i] == 0)
                .collect();
            if wave.is_empty() {
                let unplaced: Vec<usize> = (0..self.nodes.len()).filter(|&i| !placed[i]).collect();
                return Err(unplaced);
            }
            for &i in &wave {
                placed[i] = true;
                placed_count += 1;
                for &dependent in &self.reverse[i] {
                    remaining[dependent] -= 1;
                }
            }
            waves.push(wave);
        }
        Ok(waves)
    }

    /// Names of nodes on a cycle, used to build [`crate::error::Error::ReferenceCycle`].
    pub fn names(&self, indices: &[usize]) -> Vec<String> {
        indices.iter().map(|&i| self.nodes[i].name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topological_waves_orders_independent_nodes_together() {
        let mut g = DependencyGraph::new();
        let db = g.add_node(DependencyGraphNode::Resource("ordersDb".into()));
        let queue = g.add_node(DependencyGraphNode::Resource("ordersQueue".into()));
        let api = g.add_node(DependencyGraphNode::Resource("ordersApi".into()));
        g.add_edge(api, db);
        g.add_edge(api, queue);

        let waves = g.topological_waves().unwrap();
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].len(), 2);
        assert_eq!(waves[1], vec![api]);
    }

    #[test]
    fn topological_waves_detects_cycle() {
        let mut g = DependencyGraph::new();
        let a = g.add_node(DependencyGraphNode::Resource("a".into()));
        let b = g.add_node(DependencyGraphNode::Resource("b".into()));
        g.add_edge(a, b);
        g.add_edge(b, a);

        let err = g.topological_waves().unwrap_err();
        assert_eq!(err.len(), 2);
    }
}
