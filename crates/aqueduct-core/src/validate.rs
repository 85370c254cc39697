//! Invariant checks over a [`NetworkManager`].
//!
//! Used by tests and debug builds of host applications to confirm that a
//! manager's state is internally consistent after a tick.

use crate::fixed::Volume;
use crate::id::{FluidType, NetworkId, NodeId};
use crate::manager::NetworkManager;
use std::collections::BTreeMap;

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A tank holds less than zero or more than its capacity.
    CapacityBound {
        node: NodeId,
        volume: Volume,
        capacity: Volume,
    },
    /// A tank has a type without volume, or volume without a type.
    UntypedVolume { node: NodeId },
    /// The membership map and a network's member list disagree.
    MembershipMismatch { node: NodeId, network: NetworkId },
    /// A node is listed in more than one network.
    DuplicateMember {
        node: NodeId,
        first: NetworkId,
        second: NetworkId,
    },
    /// A network lists a node that no longer participates.
    NonParticipant { node: NodeId, network: NetworkId },
    /// A network holds volume but has no locked type.
    UnlockedVolume { network: NetworkId },
    /// A tank holds a fluid other than its network's lock without having
    /// been stranded when the network formed.
    MixedType {
        node: NodeId,
        network: NetworkId,
        stored: FluidType,
        locked: FluidType,
    },
}

/// Check every invariant. An empty result means the state is consistent.
///
/// Membership checks assume no rebuild is pending; call after `advance`.
pub fn check_invariants(manager: &NetworkManager) -> Vec<Violation> {
    let mut violations = Vec::new();

    // ------------------------------------------------------------------
    // Tanks
    // ------------------------------------------------------------------
    for (node, facility) in manager.facilities() {
        let Some(tank) = &facility.tank else { continue };
        if tank.volume() < Volume::ZERO || tank.volume() > tank.capacity() {
            violations.push(Violation::CapacityBound {
                node,
                volume: tank.volume(),
                capacity: tank.capacity(),
            });
        }
        if tank.fluid().is_some() != (tank.volume() > Volume::ZERO) {
            violations.push(Violation::UntypedVolume { node });
        }
    }

    if manager.has_pending_rebuild() {
        return violations;
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------
    let mut seen: BTreeMap<NodeId, NetworkId> = BTreeMap::new();
    for network in manager.networks() {
        for &node in &network.members {
            if let Some(first) = seen.insert(node, network.id) {
                violations.push(Violation::DuplicateMember {
                    node,
                    first,
                    second: network.id,
                });
            }
            if manager.get_network_id(node) != Some(network.id) {
                violations.push(Violation::MembershipMismatch {
                    node,
                    network: network.id,
                });
            }
            if !manager.facility(node).is_some_and(|f| f.participates()) {
                violations.push(Violation::NonParticipant {
                    node,
                    network: network.id,
                });
            }
        }
    }
    for (node, network) in manager.graph.membership().iter() {
        if !seen.contains_key(&node) {
            violations.push(Violation::MembershipMismatch {
                node,
                network: *network,
            });
        }
    }

    // ------------------------------------------------------------------
    // Type exclusivity
    // ------------------------------------------------------------------
    for network in manager.networks() {
        if let Some(locked) = network.fluid_type {
            for &node in &network.tanks {
                let Some(stored) = manager.facility(node).and_then(|f| f.stored_type()) else {
                    continue;
                };
                if stored != locked && !network.stranded.contains(&node) {
                    violations.push(Violation::MixedType {
                        node,
                        network: network.id,
                        stored,
                        locked,
                    });
                }
            }
            continue;
        }
        let holds_volume = network
            .tanks
            .iter()
            .filter_map(|id| manager.facility(*id))
            .any(|f| f.stored_volume() > Volume::ZERO);
        if holds_volume {
            violations.push(Violation::UnlockedVolume {
                network: network.id,
            });
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridPosition;
    use crate::node::FacilitySpec;
    use crate::tank::Tank;

    fn v(x: f64) -> Volume {
        Volume::from_num(x)
    }

    #[test]
    fn fresh_manager_is_consistent() {
        let m = NetworkManager::default();
        assert!(check_invariants(&m).is_empty());
    }

    #[test]
    fn built_network_is_consistent() {
        let mut m = NetworkManager::default();
        let fresh = m.fluids_mut().register("fresh");
        m.add_facility(FacilitySpec::new().with_tank(Tank::with_contents(v(10.0), v(5.0), fresh)).at(GridPosition::new(0, 0)));
        m.add_facility(FacilitySpec::pipe().at(GridPosition::new(1, 0)));
        m.add_facility(FacilitySpec::pipe().at(GridPosition::new(4, 4)));
        m.advance();
        assert_eq!(check_invariants(&m), vec![]);
    }

    #[test]
    fn merged_tank_of_other_type_is_stranded_not_mixed() {
        let mut m = NetworkManager::default();
        let fresh = m.fluids_mut().register("fresh");
        let salt = m.fluids_mut().register("salt");
        m.add_facility(FacilitySpec::new().with_tank(Tank::with_contents(v(10.0), v(5.0), fresh)).at(GridPosition::new(0, 0)));
        let b = m.add_facility(FacilitySpec::new().with_tank(Tank::with_contents(v(10.0), v(5.0), salt)).at(GridPosition::new(1, 0)));
        m.advance();
        assert_eq!(check_invariants(&m), vec![]);
        let net = m.get_network_id(b).unwrap();
        assert_eq!(m.network(net).unwrap().stranded, vec![b]);
    }

    #[test]
    fn closed_valve_without_rebuild_is_skipped() {
        let mut m = NetworkManager::default();
        let p = m.add_facility(FacilitySpec::pipe().at(GridPosition::new(0, 0)));
        m.advance();
        m.update_status(p, |s| s.valve_open = false).unwrap();
        assert!(check_invariants(&m).is_empty());
        m.advance();
        assert!(check_invariants(&m).is_empty());
        assert_eq!(m.get_network_id(p), None);
    }
}
