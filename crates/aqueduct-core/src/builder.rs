//! Network graph builder.
//!
//! Partitions participating facilities into connected components and keeps
//! the node -> network mapping. Rebuilds are incremental: only the region
//! reachable from dirty nodes and the networks they touch is re-flooded.
//! Every other network keeps its id and state untouched.
//!
//! # Edges
//!
//! Two participating nodes are joined when their layers are compatible and
//! they either touch spatially (per [`Adjacency`]) or share an explicit link.
//! Links to nodes that are missing, not participating, or on another layer
//! are excluded and reported as [`Diagnostic::EdgeExcluded`]. Spatial
//! neighbours that fail those checks are simply not neighbours.
//!
//! # Identity
//!
//! A rebuilt component whose membership exactly matches one of the networks
//! it replaced keeps that network, including its id and type lock. Any other
//! component becomes a new network with a fresh id, locked to the type of its
//! first non-empty tank in registration order.

use crate::dirty::RebuildRequest;
use crate::event::{Diagnostic, EventSink, ExclusionReason, FlowEvent};
use crate::grid::Adjacency;
use crate::id::{NetworkId, NodeId};
use crate::network::Network;
use crate::node::{Facility, layers_compatible};
use crate::topology::Topology;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Summary of one rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildOutcome {
    /// Networks created by this rebuild, in id order.
    pub created: Vec<NetworkId>,
    /// Networks that no longer exist.
    pub dissolved: Vec<NetworkId>,
    /// Networks re-flooded but kept because their membership did not change.
    pub kept: Vec<NetworkId>,
    /// Number of nodes visited by the flood fill.
    pub region_size: usize,
}

/// The current partition of nodes into networks.
#[derive(Debug, Clone, Default)]
pub struct NetworkGraph {
    networks: BTreeMap<NetworkId, Network>,
    membership: SecondaryMap<NodeId, NetworkId>,
    next_id: u32,
    rebuilds: u64,
}

impl NetworkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network_of(&self, node: NodeId) -> Option<NetworkId> {
        self.membership.get(node).copied()
    }

    pub fn get(&self, id: NetworkId) -> Option<&Network> {
        self.networks.get(&id)
    }

    pub fn get_mut(&mut self, id: NetworkId) -> Option<&mut Network> {
        self.networks.get_mut(&id)
    }

    /// Networks in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    pub fn ids(&self) -> Vec<NetworkId> {
        self.networks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// How many rebuilds have run since creation.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    pub(crate) fn membership(&self) -> &SecondaryMap<NodeId, NetworkId> {
        &self.membership
    }

    /// Forget a removed node's membership. Returns the network it belonged to.
    pub fn detach(&mut self, node: NodeId) -> Option<NetworkId> {
        self.membership.remove(node)
    }

    // -----------------------------------------------------------------------
    // Rebuild
    // -----------------------------------------------------------------------

    /// Recompute the components covering the requested region.
    pub fn rebuild(
        &mut self,
        nodes: &SlotMap<NodeId, Facility>,
        topology: &mut Topology,
        request: RebuildRequest,
        adjacency: Adjacency,
        sink: &mut EventSink,
    ) -> RebuildOutcome {
        self.rebuilds += 1;

        for (from, to) in topology.take_dangling() {
            sink.diagnose(Diagnostic::EdgeExcluded {
                from,
                to,
                reason: ExclusionReason::MissingNode,
            });
        }

        // Gather the affected networks and the seeds to flood from.
        let mut affected: BTreeSet<NetworkId> = BTreeSet::new();
        let mut seeds: BTreeSet<NodeId> = BTreeSet::new();
        if request.full {
            affected.extend(self.networks.keys().copied());
            seeds.extend(nodes.keys());
        } else {
            affected.extend(
                request
                    .orphaned
                    .iter()
                    .filter(|id| self.networks.contains_key(id)),
            );
            for &node in &request.dirty_nodes {
                if let Some(net) = self.membership.get(node) {
                    affected.insert(*net);
                }
                seeds.insert(node);
            }
            for id in &affected {
                if let Some(net) = self.networks.get(id) {
                    seeds.extend(net.members.iter().copied());
                }
            }
        }

        // Flood fill. Reaching a member of an unaffected network absorbs it.
        let mut visited: BTreeSet<NodeId> = BTreeSet::new();
        let mut reported: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();
        let mut components: Vec<Vec<NodeId>> = Vec::new();
        for &seed in &seeds {
            let Some(facility) = nodes.get(seed) else {
                continue;
            };
            if !facility.participates() || visited.contains(&seed) {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::from([seed]);
            visited.insert(seed);
            while let Some(node) = queue.pop_front() {
                component.push(node);
                if let Some(net) = self.membership.get(node) {
                    affected.insert(*net);
                }
                for next in self.neighbors(node, nodes, topology, adjacency, &mut reported, sink) {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
            components.push(component);
        }

        let region_size = visited.len();

        // Pull out every affected network and clear its memberships.
        let mut old: BTreeMap<NetworkId, Network> = BTreeMap::new();
        for id in &affected {
            if let Some(net) = self.networks.remove(id) {
                for member in &net.members {
                    if self.membership.get(*member) == Some(id) {
                        self.membership.remove(*member);
                    }
                }
                old.insert(*id, net);
            }
        }

        // Deterministic id assignment: order components by their earliest member.
        let mut components: Vec<Network> = components
            .into_iter()
            .map(|members| Network::new(NetworkId(u32::MAX), members, nodes))
            .collect();
        components.sort_by_key(|net| net.members.first().map(|n| nodes[*n].seq));

        let mut outcome = RebuildOutcome {
            region_size,
            ..RebuildOutcome::default()
        };
        for fresh in components {
            let previous = fresh
                .members
                .first()
                .and_then(|first| {
                    old.iter()
                        .find(|(_, net)| net.members.first() == Some(first))
                        .map(|(id, _)| *id)
                })
                .filter(|id| old.get(id).is_some_and(|net| net.members == fresh.members));

            let network = match previous.and_then(|id| old.remove(&id)) {
                Some(mut kept) => {
                    kept.refresh_roles(nodes);
                    outcome.kept.push(kept.id);
                    kept
                }
                None => {
                    let mut network = fresh;
                    network.id = self.allocate_id(&old);
                    self.lock_new_network(&mut network, nodes, sink);
                    outcome.created.push(network.id);
                    network
                }
            };
            for member in &network.members {
                self.membership.insert(*member, network.id);
            }
            self.networks.insert(network.id, network);
        }
        outcome.dissolved = old.into_keys().collect();

        tracing::debug!(
            tick = sink.tick(),
            full = request.full,
            region = outcome.region_size,
            created = outcome.created.len(),
            dissolved = outcome.dissolved.len(),
            kept = outcome.kept.len(),
            "network topology rebuilt"
        );
        sink.push(FlowEvent::Rebuilt {
            created: outcome.created.len(),
            dissolved: outcome.dissolved.len(),
            tick: sink.tick(),
        });
        outcome
    }

    /// Valid neighbours of `node`, in key order.
    fn neighbors(
        &self,
        node: NodeId,
        nodes: &SlotMap<NodeId, Facility>,
        topology: &Topology,
        adjacency: Adjacency,
        reported: &mut BTreeSet<(NodeId, NodeId)>,
        sink: &mut EventSink,
    ) -> BTreeSet<NodeId> {
        let facility = &nodes[node];
        let mut found: BTreeSet<NodeId> = topology
            .spatial_neighbors(node, facility, adjacency)
            .into_iter()
            .filter(|other| {
                nodes.get(*other).is_some_and(|f| {
                    f.participates() && layers_compatible(facility.layer, f.layer)
                })
            })
            .collect();

        for other in topology.links_of(node) {
            let reason = match nodes.get(other) {
                None => Some(ExclusionReason::MissingNode),
                Some(f) if !f.participates() => Some(ExclusionReason::NotParticipating),
                Some(f) if !layers_compatible(facility.layer, f.layer) => {
                    Some(ExclusionReason::LayerMismatch)
                }
                Some(_) => None,
            };
            match reason {
                None => {
                    found.insert(other);
                }
                Some(reason) => {
                    let key = if node < other { (node, other) } else { (other, node) };
                    if reported.insert(key) {
                        sink.diagnose(Diagnostic::EdgeExcluded {
                            from: node,
                            to: other,
                            reason,
                        });
                    }
                }
            }
        }
        found
    }

    /// Next free network id. Skips ids still held by live networks or by
    /// networks awaiting reuse in the current rebuild.
    fn allocate_id(&mut self, pending: &BTreeMap<NetworkId, Network>) -> NetworkId {
        loop {
            let id = NetworkId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1);
            if !self.networks.contains_key(&id) && !pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Lock a new network to its first non-empty tank and report tanks that disagree.
    fn lock_new_network(
        &self,
        network: &mut Network,
        nodes: &SlotMap<NodeId, Facility>,
        sink: &mut EventSink,
    ) {
        let Some(locked) = network.stored_type(nodes) else {
            return;
        };
        network.fluid_type = Some(locked);
        sink.push(FlowEvent::TypeLocked {
            network: network.id,
            fluid: locked,
            tick: sink.tick(),
        });
        for &tank in &network.tanks {
            if let Some(offered) = nodes[tank].stored_type().filter(|t| *t != locked) {
                network.stranded.push(tank);
                sink.diagnose(Diagnostic::TypeConflict {
                    network: network.id,
                    node: tank,
                    offered,
                    locked,
                });
            }
        }
    }
}
