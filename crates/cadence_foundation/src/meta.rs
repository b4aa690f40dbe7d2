//! Declared metadata: capability domains and ordering constraints.
//!
//! Every component kind declares a [`MetaInfo`] once, before any runtime is
//! built. The [`MetaRegistry`] holds those declarations and turns them into a
//! [`DependencyGraph`] for a given set of registered identities.

use std::collections::HashMap;

use crate::domain::Domain;
use crate::error::{Error, ErrorKind, Result};
use crate::graph::DependencyGraph;
use crate::identity::Identity;

/// Which ordering pair a graph is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The main update pass (`update_after` / `update_before`).
    Update,
    /// The post-update pass (`post_update_after` / `post_update_before`).
    PostUpdate,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Update => f.write_str("update"),
            Phase::PostUpdate => f.write_str("post-update"),
        }
    }
}

/// Declared metadata for one component kind.
///
/// Built with chained calls:
///
/// ```
/// use cadence_foundation::{Domain, MetaInfo};
///
/// struct WindowService;
/// struct ImguiService;
///
/// let meta = MetaInfo::new()
///     .domain(Domain::UI)
///     .update_after::<WindowService>()
///     .update_before::<ImguiService>();
/// assert_eq!(meta.update_after_set().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MetaInfo {
    domain: Domain,
    update_after: Vec<Identity>,
    update_before: Vec<Identity>,
    post_update_after: Vec<Identity>,
    post_update_before: Vec<Identity>,
}

impl MetaInfo {
    /// Metadata with domain `ALL` and no ordering constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capability domain mask.
    #[must_use]
    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    /// This kind must run after `T` in the update pass.
    #[must_use]
    pub fn update_after<T: ?Sized + 'static>(self) -> Self {
        self.update_after_id(Identity::of::<T>())
    }

    /// This kind must run before `T` in the update pass.
    #[must_use]
    pub fn update_before<T: ?Sized + 'static>(self) -> Self {
        self.update_before_id(Identity::of::<T>())
    }

    /// This kind must run after `T` in the post-update pass.
    #[must_use]
    pub fn post_update_after<T: ?Sized + 'static>(self) -> Self {
        self.post_update_after_id(Identity::of::<T>())
    }

    /// This kind must run before `T` in the post-update pass.
    #[must_use]
    pub fn post_update_before<T: ?Sized + 'static>(self) -> Self {
        self.post_update_before_id(Identity::of::<T>())
    }

    /// [`update_after`](Self::update_after) taking an identity value.
    #[must_use]
    pub fn update_after_id(mut self, id: Identity) -> Self {
        push_unique(&mut self.update_after, id);
        self
    }

    /// [`update_before`](Self::update_before) taking an identity value.
    #[must_use]
    pub fn update_before_id(mut self, id: Identity) -> Self {
        push_unique(&mut self.update_before, id);
        self
    }

    /// [`post_update_after`](Self::post_update_after) taking an identity value.
    #[must_use]
    pub fn post_update_after_id(mut self, id: Identity) -> Self {
        push_unique(&mut self.post_update_after, id);
        self
    }

    /// [`post_update_before`](Self::post_update_before) taking an identity value.
    #[must_use]
    pub fn post_update_before_id(mut self, id: Identity) -> Self {
        push_unique(&mut self.post_update_before, id);
        self
    }

    /// The declared capability domain mask.
    #[must_use]
    pub fn domain_mask(&self) -> Domain {
        self.domain
    }

    /// Identities this kind runs after, in the update pass.
    #[must_use]
    pub fn update_after_set(&self) -> &[Identity] {
        &self.update_after
    }

    /// Identities this kind runs before, in the update pass.
    #[must_use]
    pub fn update_before_set(&self) -> &[Identity] {
        &self.update_before
    }

    /// Identities this kind runs after, in the post-update pass.
    #[must_use]
    pub fn post_update_after_set(&self) -> &[Identity] {
        &self.post_update_after
    }

    /// Identities this kind runs before, in the post-update pass.
    #[must_use]
    pub fn post_update_before_set(&self) -> &[Identity] {
        &self.post_update_before
    }

    /// The `(after, before)` pair for a phase.
    #[must_use]
    pub fn edges(&self, phase: Phase) -> (&[Identity], &[Identity]) {
        match phase {
            Phase::Update => (&self.update_after, &self.update_before),
            Phase::PostUpdate => (&self.post_update_after, &self.post_update_before),
        }
    }

    fn references(&self, id: Identity) -> bool {
        [
            &self.update_after,
            &self.update_before,
            &self.post_update_after,
            &self.post_update_before,
        ]
        .iter()
        .any(|set| set.contains(&id))
    }
}

fn push_unique(set: &mut Vec<Identity>, id: Identity) {
    if !set.contains(&id) {
        set.push(id);
    }
}

/// Registry of declared metadata, keyed by identity.
///
/// There is no global registry: one is built at startup and shared (usually
/// behind an `Arc`) by every runtime that needs it.
#[derive(Clone, Debug, Default)]
pub struct MetaRegistry {
    entries: HashMap<Identity, MetaInfo>,
    order: Vec<Identity>,
}

impl MetaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares metadata for `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` names itself in any ordering set, or if
    /// metadata for `T` was already declared.
    pub fn declare<T: ?Sized + 'static>(&mut self, meta: MetaInfo) -> Result<()> {
        self.declare_id(Identity::of::<T>(), meta)
    }

    /// [`declare`](Self::declare) taking an identity value.
    ///
    /// # Errors
    ///
    /// Same as [`declare`](Self::declare).
    pub fn declare_id(&mut self, id: Identity, meta: MetaInfo) -> Result<()> {
        if meta.references(id) {
            return Err(Error::self_dependency(id));
        }
        if self.entries.contains_key(&id) {
            return Err(Error::new(ErrorKind::AlreadyDeclared(id.to_string())));
        }
        self.entries.insert(id, meta);
        self.order.push(id);
        Ok(())
    }

    /// Metadata declared for `id`.
    #[must_use]
    pub fn get(&self, id: Identity) -> Option<&MetaInfo> {
        self.entries.get(&id)
    }

    /// Metadata declared for `id`, or an `Undeclared` error.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing was declared for `id`.
    pub fn require(&self, id: Identity) -> Result<&MetaInfo> {
        self.get(id).ok_or_else(|| Error::undeclared(id))
    }

    /// Returns true if metadata was declared for `id`.
    #[must_use]
    pub fn is_declared(&self, id: Identity) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of declared identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declarations in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Identity, &MetaInfo)> {
        self.order.iter().map(|id| (*id, &self.entries[id]))
    }

    /// Builds the precedence graph of one phase over `nodes`.
    ///
    /// Nodes are added in the given order, which becomes the sort tie-break.
    /// Each node contributes its *before* set as direct edges and its *after*
    /// set as reversed edges. A constraint naming an identity that is declared
    /// but absent from `nodes` is treated as already satisfied.
    ///
    /// # Errors
    ///
    /// Returns an error if a node or any identity it references was never
    /// declared.
    pub fn dependency_graph(
        &self,
        nodes: &[Identity],
        phase: Phase,
    ) -> Result<DependencyGraph<Identity>> {
        let mut graph = DependencyGraph::with_capacity(nodes.len());
        for &node in nodes {
            graph.add_node(node);
        }

        for &node in nodes {
            let (after, before) = self.require(node)?.edges(phase);
            for &next in before {
                self.require(next)
                    .map_err(|e| e.with_context(format!("resolving {phase} order of {node}")))?;
                if graph.contains(next) {
                    graph.add_edge(node, next)?;
                }
            }
            for &prev in after {
                self.require(prev)
                    .map_err(|e| e.with_context(format!("resolving {phase} order of {node}")))?;
                if graph.contains(prev) {
                    graph.add_edge(prev, node)?;
                }
            }
        }
        Ok(graph)
    }
}
