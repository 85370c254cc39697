//! Property-based tests for the network core.
//!
//! Uses proptest to generate random layouts and mutation sequences, then
//! checks conservation, capacity, type exclusivity, and partition stability.

use aqueduct_core::fixed::Volume;
use aqueduct_core::id::{FluidType, NodeId};
use aqueduct_core::manager::NetworkManager;
use aqueduct_core::test_utils::*;
use aqueduct_core::validate::check_invariants;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
struct Piece {
    kind: u8,
    x: i32,
    y: i32,
    param: u32,
    fluid: u8,
}

fn arb_piece() -> impl Strategy<Value = Piece> {
    (0..5u8, 0..6i32, 0..6i32, 1..20u32, 0..3u8).prop_map(|(kind, x, y, param, fluid)| Piece {
        kind,
        x,
        y,
        param,
        fluid,
    })
}

fn arb_layout(max_pieces: usize) -> impl Strategy<Value = Vec<Piece>> {
    proptest::collection::vec(arb_piece(), 1..=max_pieces)
}

fn fluid_of(i: u8) -> FluidType {
    match i {
        0 => fresh(),
        1 => salt(),
        _ => grey(),
    }
}

fn place(m: &mut NetworkManager, p: &Piece) -> NodeId {
    let param = f64::from(p.param);
    match p.kind {
        0 => pipe_at(m, p.x, p.y),
        1 => tank_at(m, p.x, p.y, param * 5.0),
        2 => filled_tank_at(m, p.x, p.y, param * 5.0, param * 2.5, fluid_of(p.fluid)),
        3 => pump_at(m, p.x, p.y, param, fluid_of(p.fluid)),
        _ => tap_at(m, p.x, p.y, param / 2.0),
    }
}

fn build(pieces: &[Piece]) -> (NetworkManager, Vec<NodeId>) {
    let mut m = manager();
    let nodes = pieces.iter().map(|p| place(&mut m, p)).collect();
    (m, nodes)
}

/// The partition as a set of sorted member lists.
fn partition(m: &NetworkManager) -> BTreeSet<Vec<NodeId>> {
    m.networks()
        .map(|n| {
            let mut members = n.members.clone();
            members.sort();
            members
        })
        .collect()
}

#[derive(Debug, Clone)]
enum MutOp {
    Step,
    Remove(usize),
    Connect(usize, usize),
    Disconnect(usize, usize),
    ToggleValve(usize),
    Draw(usize, u32),
    Fill(usize, u32, u8),
    Inflow(usize, u32, u8),
}

fn arb_mutation_sequence(max_ops: usize) -> impl Strategy<Value = Vec<MutOp>> {
    proptest::collection::vec(
        prop_oneof![
            3 => Just(MutOp::Step),
            1 => (0..40usize).prop_map(MutOp::Remove),
            1 => (0..40usize, 0..40usize).prop_map(|(a, b)| MutOp::Connect(a, b)),
            1 => (0..40usize, 0..40usize).prop_map(|(a, b)| MutOp::Disconnect(a, b)),
            1 => (0..40usize).prop_map(MutOp::ToggleValve),
            1 => (0..40usize, 1..30u32).prop_map(|(i, a)| MutOp::Draw(i, a)),
            1 => (0..40usize, 1..30u32, 0..3u8).prop_map(|(i, a, f)| MutOp::Fill(i, a, f)),
            1 => (0..40usize, 0..30u32, 0..3u8).prop_map(|(i, a, f)| MutOp::Inflow(i, a, f)),
        ],
        1..=max_ops,
    )
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Stored volume changes by exactly what resolvers stored minus what
    /// they drained, and nothing is stored beyond supply.
    #[test]
    fn volume_is_conserved(pieces in arb_layout(30), ticks in 1..8usize) {
        let (mut m, _) = build(&pieces);
        for _ in 0..ticks {
            let before = total_stored(&m);
            m.advance();
            let tick = m.tick();
            let mut stored = Volume::ZERO;
            let mut drained = Volume::ZERO;
            for net in m.networks().filter(|n| n.last_resolved == Some(tick)) {
                let r = net.last_report;
                prop_assert!(r.stored <= r.supply);
                prop_assert_eq!(r.delivered + r.stored + r.discarded, r.supply + r.drained);
                stored += r.stored;
                drained += r.drained;
            }
            prop_assert_eq!(total_stored(&m), before + stored - drained);
        }
    }

    /// Every tank stays within [0, capacity] and typed iff non-empty.
    #[test]
    fn tanks_stay_within_capacity(pieces in arb_layout(30), ticks in 1..8usize) {
        let (mut m, _) = build(&pieces);
        for _ in 0..ticks {
            m.advance();
            prop_assert_eq!(check_invariants(&m), vec![]);
        }
    }

    /// A tank only gains volume of its network's locked type.
    #[test]
    fn tanks_only_gain_the_locked_type(pieces in arb_layout(30), ticks in 1..8usize) {
        let (mut m, nodes) = build(&pieces);
        for _ in 0..ticks {
            let before: BTreeMap<NodeId, Volume> = nodes
                .iter()
                .filter_map(|n| Some((*n, m.stored_volume(*n).ok()?)))
                .collect();
            m.advance();
            for (node, was) in before {
                let now = m.stored_volume(node).unwrap();
                if now > was {
                    let net = m.get_network_id(node).unwrap();
                    prop_assert_eq!(m.stored_type(node).unwrap(), m.network_stored_type(net));
                }
            }
        }
    }

    /// A rebuild with no topology change yields the same partition and ids.
    #[test]
    fn rebuild_is_idempotent(pieces in arb_layout(30)) {
        let (mut m, nodes) = build(&pieces);
        m.advance();
        let parts = partition(&m);
        let ids: Vec<_> = nodes.iter().map(|n| m.get_network_id(*n)).collect();

        m.request_topology_update();
        m.request_topology_update();
        let rebuilds = m.rebuild_count();
        m.advance();

        prop_assert_eq!(m.rebuild_count(), rebuilds + 1);
        prop_assert_eq!(partition(&m), parts);
        let again: Vec<_> = nodes.iter().map(|n| m.get_network_id(*n)).collect();
        prop_assert_eq!(again, ids);
    }

    /// The partition does not depend on the order nodes were added.
    #[test]
    fn partition_is_order_independent(pieces in arb_layout(25)) {
        let (mut forward, fnodes) = build(&pieces);
        let reversed: Vec<Piece> = pieces.iter().rev().cloned().collect();
        let (mut backward, mut bnodes) = build(&reversed);
        bnodes.reverse();
        forward.advance();
        backward.advance();

        for i in 0..fnodes.len() {
            for j in (i + 1)..fnodes.len() {
                let same_f = forward.get_network_id(fnodes[i]) == forward.get_network_id(fnodes[j]);
                let same_b = backward.get_network_id(bnodes[i]) == backward.get_network_id(bnodes[j]);
                prop_assert_eq!(same_f, same_b, "pieces {} and {}", i, j);
            }
        }
    }

    /// Random mutation sequences never break an invariant.
    #[test]
    fn mutation_safety(pieces in arb_layout(20), ops in arb_mutation_sequence(60)) {
        let (mut m, mut nodes) = build(&pieces);

        for op in ops {
            match op {
                MutOp::Step => {
                    m.advance();
                    prop_assert_eq!(check_invariants(&m), vec![]);
                }
                MutOp::Remove(idx) => {
                    if !nodes.is_empty() {
                        let node = nodes.remove(idx % nodes.len());
                        prop_assert!(m.remove_facility(node).is_ok());
                    }
                }
                MutOp::Connect(a, b) => {
                    if !nodes.is_empty() {
                        let (a, b) = (nodes[a % nodes.len()], nodes[b % nodes.len()]);
                        m.connect(a, b);
                    }
                }
                MutOp::Disconnect(a, b) => {
                    if !nodes.is_empty() {
                        let (a, b) = (nodes[a % nodes.len()], nodes[b % nodes.len()]);
                        m.disconnect(a, b);
                    }
                }
                MutOp::ToggleValve(idx) => {
                    if !nodes.is_empty() {
                        let node = nodes[idx % nodes.len()];
                        m.update_status(node, |s| s.valve_open = !s.valve_open).unwrap();
                    }
                }
                MutOp::Draw(idx, amount) => {
                    if !nodes.is_empty() {
                        let node = nodes[idx % nodes.len()];
                        let _ = m.draw_volume(node, fixed(f64::from(amount)));
                    }
                }
                MutOp::Fill(idx, amount, fluid) => {
                    if !nodes.is_empty() {
                        let node = nodes[idx % nodes.len()];
                        let _ = m.fill_from_external_source(node, fixed(f64::from(amount)), fluid_of(fluid));
                    }
                }
                MutOp::Inflow(idx, amount, fluid) => {
                    if !nodes.is_empty() {
                        let node = nodes[idx % nodes.len()];
                        let _ = m.set_inflow(node, fixed(f64::from(amount)), Some(fluid_of(fluid)));
                    }
                }
            }
        }

        m.advance();
        prop_assert_eq!(check_invariants(&m), vec![]);
    }
}
