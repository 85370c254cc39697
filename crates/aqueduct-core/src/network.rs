//! A fluid network: a maximal connected set of facilities sharing one fluid type.

use crate::fixed::{Fixed64, Ticks, Volume};
use crate::id::{FluidType, NetworkId, NodeId};
use crate::node::Facility;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

/// What happened in a network during its last resolved tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowReport {
    pub tick: Ticks,
    /// Volume supplied by inputs.
    pub supply: Volume,
    /// Volume handed to outputs, from supply and storage combined.
    pub delivered: Volume,
    /// Volume added to tanks.
    pub stored: Volume,
    /// Volume drained from tanks to cover output demand.
    pub drained: Volume,
    /// Supply nobody could take.
    pub discarded: Volume,
    /// Output satisfaction in `[0, 1]`; 1 when nothing was requested.
    pub satisfaction: Fixed64,
}

/// A single connected network.
///
/// Role lists are sorted by registration order so every pass iterates nodes
/// in the same fixed order.
#[derive(Debug, Clone)]
pub struct Network {
    pub id: NetworkId,
    /// Locked fluid type, `None` while the network is empty.
    pub fluid_type: Option<FluidType>,
    /// All members, sorted by registration order.
    pub members: Vec<NodeId>,
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
    pub tanks: Vec<NodeId>,
    /// Tanks that already held another fluid when the network was formed.
    pub stranded: Vec<NodeId>,
    /// Whether output demand went unmet last tick (for transition events).
    pub was_low_supply: bool,
    /// Tick of the last resolver pass over this network.
    pub last_resolved: Option<Ticks>,
    pub last_report: FlowReport,
}

impl Network {
    /// Build a network over `members`, sorting them and splitting role lists.
    pub fn new(id: NetworkId, mut members: Vec<NodeId>, nodes: &SlotMap<NodeId, Facility>) -> Self {
        members.retain(|n| nodes.contains_key(*n));
        members.sort_by_key(|n| nodes[*n].seq);
        members.dedup();
        let mut network = Self {
            id,
            fluid_type: None,
            members,
            inputs: Vec::new(),
            outputs: Vec::new(),
            tanks: Vec::new(),
            stranded: Vec::new(),
            was_low_supply: false,
            last_resolved: None,
            last_report: FlowReport {
                satisfaction: Fixed64::from_num(1),
                ..FlowReport::default()
            },
        };
        network.refresh_roles(nodes);
        network
    }

    /// Recompute role lists from current node state.
    pub fn refresh_roles(&mut self, nodes: &SlotMap<NodeId, Facility>) {
        self.inputs.clear();
        self.outputs.clear();
        self.tanks.clear();
        for &node in &self.members {
            let Some(f) = nodes.get(node) else { continue };
            if f.input.is_some() {
                self.inputs.push(node);
            }
            if f.output.is_some() {
                self.outputs.push(node);
            }
            if f.tank.is_some() {
                self.tanks.push(node);
            }
        }
    }

    /// The type of the first non-empty tank in registration order.
    pub fn stored_type(&self, nodes: &SlotMap<NodeId, Facility>) -> Option<FluidType> {
        self.tanks
            .iter()
            .filter_map(|n| nodes.get(*n))
            .find_map(|f| f.stored_type())
    }

    /// Total volume held by tanks of the locked type.
    pub fn stored_volume(&self, nodes: &SlotMap<NodeId, Facility>) -> Volume {
        let Some(locked) = self.fluid_type else {
            return Volume::ZERO;
        };
        self.tanks
            .iter()
            .filter_map(|n| nodes.get(*n))
            .filter(|f| f.stored_type() == Some(locked))
            .fold(Volume::ZERO, |acc, f| acc.saturating_add(f.stored_volume()))
    }

    /// Total capacity of member tanks.
    pub fn capacity(&self, nodes: &SlotMap<NodeId, Facility>) -> Volume {
        self.tanks
            .iter()
            .filter_map(|n| nodes.get(*n))
            .fold(Volume::ZERO, |acc, f| {
                acc.saturating_add(f.tank.as_ref().map_or(Volume::ZERO, |t| t.capacity()))
            })
    }

    /// Whether any activated input is present or any tank holds fluid.
    pub fn is_active(&self, nodes: &SlotMap<NodeId, Facility>) -> bool {
        self.inputs
            .iter()
            .filter_map(|n| nodes.get(*n))
            .any(Facility::input_activated)
            || self
                .tanks
                .iter()
                .filter_map(|n| nodes.get(*n))
                .any(|f| f.stored_volume() > Volume::ZERO)
    }

    /// Whether a tank can take part in this network's flow under the current lock.
    pub fn tank_eligible(&self, facility: &Facility) -> bool {
        match (facility.stored_type(), self.fluid_type) {
            (None, _) => true,
            (Some(stored), Some(locked)) => stored == locked,
            (Some(_), None) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
