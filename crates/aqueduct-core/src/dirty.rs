use crate::id::{NetworkId, NodeId};
use std::collections::BTreeSet;

/// Topology work queued since the last rebuild.
///
/// Mutations only record what changed; the manager drains the queue once at
/// the start of [`advance`](crate::manager::NetworkManager::advance), so any
/// number of changes within a tick coalesce into a single rebuild.
#[derive(Debug, Clone, Default)]
pub struct PendingWork {
    dirty_nodes: BTreeSet<NodeId>,
    orphaned: BTreeSet<NetworkId>,
    full_rebuild: bool,
    /// Tanks that crossed empty/non-empty outside the resolver.
    lock_refresh: BTreeSet<NetworkId>,
}

/// A drained queue, ready for the graph builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildRequest {
    pub dirty_nodes: BTreeSet<NodeId>,
    pub orphaned: BTreeSet<NetworkId>,
    pub full: bool,
}

impl RebuildRequest {
    pub fn is_empty(&self) -> bool {
        !self.full && self.dirty_nodes.is_empty() && self.orphaned.is_empty()
    }
}

impl PendingWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node was added, removed, relinked, or changed participation.
    pub fn mark_node(&mut self, node: NodeId) {
        self.dirty_nodes.insert(node);
    }

    /// A network lost a member that no longer exists.
    pub fn mark_orphaned(&mut self, network: NetworkId) {
        self.orphaned.insert(network);
    }

    /// Request a rebuild of every network. Idempotent.
    pub fn request_full(&mut self) {
        self.full_rebuild = true;
    }

    /// A tank in `network` was emptied or filled from outside the resolver.
    pub fn mark_lock_refresh(&mut self, network: NetworkId) {
        self.lock_refresh.insert(network);
    }

    pub fn needs_rebuild(&self) -> bool {
        self.full_rebuild || !self.dirty_nodes.is_empty() || !self.orphaned.is_empty()
    }

    pub fn is_full_rebuild(&self) -> bool {
        self.full_rebuild
    }

    pub fn is_node_dirty(&self, node: NodeId) -> bool {
        self.dirty_nodes.contains(&node)
    }

    pub fn dirty_nodes(&self) -> &BTreeSet<NodeId> {
        &self.dirty_nodes
    }

    /// Networks whose type lock should be re-derived before resolving.
    pub fn lock_refresh(&self) -> &BTreeSet<NetworkId> {
        &self.lock_refresh
    }

    /// Take the topology part of the queue, leaving it empty.
    pub fn take_rebuild(&mut self) -> RebuildRequest {
        RebuildRequest {
            dirty_nodes: std::mem::take(&mut self.dirty_nodes),
            orphaned: std::mem::take(&mut self.orphaned),
            full: std::mem::replace(&mut self.full_rebuild, false),
        }
    }

    pub fn take_lock_refresh(&mut self) -> BTreeSet<NetworkId> {
        std::mem::take(&mut self.lock_refresh)
    }
}
