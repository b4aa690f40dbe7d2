//! Compiled task graphs.
//!
//! A [`TaskGraph`] is the executable form of a [`DependencyGraph`]: nodes are
//! dense indices, edges are the covering relation only, and every node knows
//! how many predecessors must finish before it may start.

use std::collections::HashMap;
use std::fmt;

use cadence_foundation::{DependencyGraph, Identity, Result};

/// Precedence-constrained task plan over registered units.
#[derive(Clone, Default)]
pub struct TaskGraph {
    nodes: Vec<Identity>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<usize>,
    roots: Vec<usize>,
}

impl TaskGraph {
    /// Compiles a dependency graph.
    ///
    /// Node `i` of the task graph is node `i` of `graph` in registration
    /// order. Transitive shortcuts are dropped, so independent branches stay
    /// independent.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is cyclic.
    pub fn compile(graph: &DependencyGraph<Identity>) -> Result<Self> {
        let nodes = graph.nodes().to_vec();
        let index: HashMap<Identity, usize> =
            nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut successors = vec![Vec::new(); nodes.len()];
        let mut predecessors = vec![0usize; nodes.len()];
        for (from, to) in graph.covering_edges()? {
            let (from, to) = (index[&from], index[&to]);
            successors[from].push(to);
            predecessors[to] += 1;
        }

        let roots = (0..nodes.len()).filter(|&i| predecessors[i] == 0).collect();
        Ok(Self {
            nodes,
            successors,
            predecessors,
            roots,
        })
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if there are no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Identity of task `i`.
    #[must_use]
    pub fn node(&self, i: usize) -> Identity {
        self.nodes[i]
    }

    /// Every task identity, by index.
    #[must_use]
    pub fn nodes(&self) -> &[Identity] {
        &self.nodes
    }

    /// Tasks with no predecessors.
    #[must_use]
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Tasks that wait on task `i`.
    #[must_use]
    pub fn successors(&self, i: usize) -> &[usize] {
        &self.successors[i]
    }

    /// Number of tasks task `i` waits on.
    #[must_use]
    pub fn predecessor_count(&self, i: usize) -> usize {
        self.predecessors[i]
    }

    /// Number of edges kept after reduction.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(Vec::len).sum()
    }

    /// Edges as identity pairs.
    #[must_use]
    pub fn edges(&self) -> Vec<(Identity, Identity)> {
        self.successors
            .iter()
            .enumerate()
            .flat_map(|(from, succ)| succ.iter().map(move |&to| (from, to)))
            .map(|(from, to)| (self.nodes[from], self.nodes[to]))
            .collect()
    }

    /// Length of the longest chain of tasks, in tasks.
    ///
    /// With unlimited workers a tick takes at least this many sequential steps.
    #[must_use]
    pub fn critical_path_len(&self) -> usize {
        let mut depth = vec![1usize; self.nodes.len()];
        let mut remaining = self.predecessors.clone();
        let mut ready: Vec<usize> = self.roots.clone();
        while let Some(i) = ready.pop() {
            for &next in &self.successors[i] {
                depth[next] = depth[next].max(depth[i] + 1);
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push(next);
                }
            }
        }
        depth.into_iter().max().unwrap_or(0)
    }
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edges: Vec<String> = self
            .edges()
            .iter()
            .map(|(from, to)| format!("{from} -> {to}"))
            .collect();
        f.debug_struct("TaskGraph")
            .field("tasks", &self.nodes)
            .field("edges", &edges)
            .finish()
    }
}
