//! Spatial index and explicit links between facilities.
//!
//! Adjacency has two sources:
//!
//! - **Spatial**: facilities whose cells overlap or touch (per
//!   [`Adjacency`]) are neighbours.
//! - **Links**: explicit connections registered with
//!   [`Topology::link`], used for long pipe runs or off-grid facilities.
//!
//! The topology answers "who could be my neighbour"; whether an edge is
//! valid (both ends alive, participating, layer-compatible) is decided by the
//! graph builder.

use crate::grid::{Adjacency, GridPosition};
use crate::id::NodeId;
use crate::node::Facility;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    /// Which nodes occupy each cell. Pipes may share cells with buildings.
    cells: BTreeMap<GridPosition, Vec<NodeId>>,
    /// Explicit links, stored in both directions.
    links: SecondaryMap<NodeId, BTreeSet<NodeId>>,
    /// Links whose far end never existed. Kept so the builder can report them.
    #[serde(skip)]
    dangling: Vec<(NodeId, NodeId)>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a node's cells.
    pub fn insert(&mut self, node: NodeId, facility: &Facility) {
        for cell in facility.cells() {
            let occupants = self.cells.entry(cell).or_default();
            if !occupants.contains(&node) {
                occupants.push(node);
            }
        }
    }

    /// Drop a node's cells and every link touching it. Returns the nodes it was linked to.
    pub fn remove(&mut self, node: NodeId, facility: &Facility) -> Vec<NodeId> {
        for cell in facility.cells() {
            if let Some(occupants) = self.cells.get_mut(&cell) {
                occupants.retain(|n| *n != node);
                if occupants.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
        let linked: Vec<NodeId> = self
            .links
            .remove(node)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for other in &linked {
            if let Some(set) = self.links.get_mut(*other) {
                set.remove(&node);
            }
        }
        self.dangling.retain(|(a, b)| *a != node && *b != node);
        linked
    }

    /// Register an explicit link. Returns `false` if it already existed.
    ///
    /// `exists` tells whether each end is a live node; a link to a missing
    /// node is remembered as dangling instead of stored.
    pub fn link(&mut self, a: NodeId, b: NodeId, exists: impl Fn(NodeId) -> bool) -> bool {
        if a == b {
            return false;
        }
        if !exists(a) || !exists(b) {
            if !self.dangling.contains(&(a, b)) {
                self.dangling.push((a, b));
            }
            return false;
        }
        let fresh = self
            .links
            .entry(a)
            .map(|e| e.or_default().insert(b))
            .unwrap_or(false);
        if let Some(e) = self.links.entry(b) {
            e.or_default().insert(a);
        }
        fresh
    }

    /// Remove an explicit link. Returns `true` if it existed.
    pub fn unlink(&mut self, a: NodeId, b: NodeId) -> bool {
        let removed = self.links.get_mut(a).is_some_and(|s| s.remove(&b));
        if let Some(s) = self.links.get_mut(b) {
            s.remove(&a);
        }
        removed
    }

    pub fn is_linked(&self, a: NodeId, b: NodeId) -> bool {
        self.links.get(a).is_some_and(|s| s.contains(&b))
    }

    /// Explicit links of a node, in key order.
    pub fn links_of(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.links.get(node).into_iter().flat_map(|s| s.iter().copied())
    }

    /// Links whose far end did not exist when they were requested. Drains the list.
    pub fn take_dangling(&mut self) -> Vec<(NodeId, NodeId)> {
        std::mem::take(&mut self.dangling)
    }

    /// Nodes occupying a cell.
    pub fn occupants(&self, cell: GridPosition) -> &[NodeId] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every node spatially touching `facility`, excluding `node` itself.
    /// Sorted and deduplicated.
    pub fn spatial_neighbors(
        &self,
        node: NodeId,
        facility: &Facility,
        adjacency: Adjacency,
    ) -> Vec<NodeId> {
        let mut found = BTreeSet::new();
        for cell in facility.cells() {
            for &(dx, dy) in adjacency.offsets() {
                for other in self.occupants(cell.offset(dx, dy)) {
                    if *other != node {
                        found.insert(*other);
                    }
                }
            }
        }
        found.into_iter().collect()
    }

    pub fn occupied_cell_count(&self) -> usize {
        self.cells.len()
    }
}
