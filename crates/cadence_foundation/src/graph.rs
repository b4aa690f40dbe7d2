//! Dependency graphs with cycle-safe topological sorting.
//!
//! A [`DependencyGraph`] knows nothing about components: it stores opaque
//! nodes and "A must complete before B starts" edges. Both runtimes build one
//! per phase and discard it once the order is resolved.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Directed precedence graph over opaque nodes.
///
/// Nodes are numbered in the order they were added. That registration order is
/// the tie-break whenever several nodes are ready at once, so sorting is fully
/// deterministic for a given build sequence.
#[derive(Clone)]
pub struct DependencyGraph<N> {
    nodes: Vec<N>,
    index: HashMap<N, usize>,
    successors: Vec<BTreeSet<usize>>,
}

impl<N> DependencyGraph<N>
where
    N: Copy + Eq + Hash + fmt::Display,
{
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            successors: Vec::new(),
        }
    }

    /// Creates an empty graph with room for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            successors: Vec::with_capacity(capacity),
        }
    }

    /// Adds a node, returning its registration index.
    ///
    /// Adding a node that is already present is a no-op and returns the
    /// existing index.
    pub fn add_node(&mut self, node: N) -> usize {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.index.insert(node, idx);
        self.successors.push(BTreeSet::new());
        idx
    }

    /// Adds the edge "`from` must complete before `to` starts".
    ///
    /// Duplicate edges collapse into one.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint was never added or if
    /// `from == to`.
    pub fn add_edge(&mut self, from: N, to: N) -> Result<()> {
        if from == to {
            return Err(Error::self_dependency(from));
        }
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;
        self.successors[from_idx].insert(to_idx);
        Ok(())
    }

    /// Returns true if the node was added.
    #[must_use]
    pub fn contains(&self, node: N) -> bool {
        self.index.contains_key(&node)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(BTreeSet::len).sum()
    }

    /// Nodes in registration order.
    #[must_use]
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Direct successors of `node`, in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the node was never added.
    pub fn successors(&self, node: N) -> Result<Vec<N>> {
        let idx = self.index_of(node)?;
        Ok(self.successors[idx].iter().map(|&s| self.nodes[s]).collect())
    }

    /// Every edge, ordered by source then target registration index.
    #[must_use]
    pub fn edges(&self) -> Vec<(N, N)> {
        self.successors
            .iter()
            .enumerate()
            .flat_map(|(from, succ)| succ.iter().map(move |&to| (from, to)))
            .map(|(from, to)| (self.nodes[from], self.nodes[to]))
            .collect()
    }

    /// Produces a linear order that respects every edge.
    ///
    /// Kahn's algorithm: nodes with no unsatisfied predecessors are emitted
    /// lowest registration index first.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::DependencyCycle`](crate::ErrorKind::DependencyCycle)
    /// naming every node that could not be ordered, in registration order.
    pub fn sort(&self) -> Result<Vec<N>> {
        self.sort_indices()
            .map(|order| order.into_iter().map(|idx| self.nodes[idx]).collect())
    }

    /// Returns the transitive reduction of the edge set.
    ///
    /// An edge `A → C` is dropped when some other path `A → B → … → C`
    /// already implies it. The remaining edges are exactly the covering
    /// relation of the partial order, which is what a task graph needs.
    ///
    /// # Errors
    ///
    /// Fails with a dependency cycle error like [`sort`](Self::sort).
    pub fn covering_edges(&self) -> Result<Vec<(N, N)>> {
        let order = self.sort_indices()?;
        let n = self.nodes.len();

        // reach[v] = every node reachable from v through one or more edges.
        let mut reach: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for &v in order.iter().rev() {
            let mut acc = BTreeSet::new();
            for &s in &self.successors[v] {
                acc.insert(s);
                acc.extend(reach[s].iter().copied());
            }
            reach[v] = acc;
        }

        let mut covering = Vec::with_capacity(self.edge_count());
        for (from, succ) in self.successors.iter().enumerate() {
            for &to in succ {
                let implied = succ
                    .iter()
                    .any(|&other| other != to && reach[other].contains(&to));
                if !implied {
                    covering.push((self.nodes[from], self.nodes[to]));
                }
            }
        }
        Ok(covering)
    }

    fn index_of(&self, node: N) -> Result<usize> {
        self.index
            .get(&node)
            .copied()
            .ok_or_else(|| Error::unknown_node(node))
    }

    fn sort_indices(&self) -> Result<Vec<usize>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        for succ in &self.successors {
            for &to in succ {
                in_degree[to] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(idx) = ready.pop_first() {
            order.push(idx);
            for &to in &self.successors[idx] {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    ready.insert(to);
                }
            }
        }

        if order.len() < n {
            let residual = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.nodes[i]);
            return Err(Error::dependency_cycle(residual));
        }
        Ok(order)
    }
}

impl<N> Default for DependencyGraph<N>
where
    N: Copy + Eq + Hash + fmt::Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N: fmt::Display> fmt::Debug for DependencyGraph<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (from, succ) in self.successors.iter().enumerate() {
            for &to in succ {
                list.entry(&format_args!("{} -> {}", self.nodes[from], self.nodes[to]));
            }
        }
        list.finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
