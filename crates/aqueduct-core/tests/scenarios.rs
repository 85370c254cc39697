//! End-to-end scenarios for the network core.
//!
//! Each test drives a `NetworkManager` through several ticks and checks
//! volumes, types, partitions, and events.

use aqueduct_core::event::{Diagnostic, FlowEvent};
use aqueduct_core::fixed::Volume;
use aqueduct_core::node::NodeStatus;
use aqueduct_core::test_utils::*;
use aqueduct_core::validate::check_invariants;

// ===========================================================================
// Two tanks sharing one input
// ===========================================================================
//
//   [tank A] -- [pipe] -- [tank B]
//                  |
//               [pump]

#[test]
fn two_tanks_split_inflow_evenly() {
    let mut m = manager();
    let a = tank_at(&mut m, 0, 0, 50.0);
    pipe_at(&mut m, 1, 0);
    let b = tank_at(&mut m, 2, 0, 50.0);
    pump_at(&mut m, 1, 1, 10.0, fresh());

    run(&mut m, 5);

    assert_eq!(m.stored_volume(a).unwrap(), fixed(25.0));
    assert_eq!(m.stored_volume(b).unwrap(), fixed(25.0));
    let net = m.get_network_id(a).unwrap();
    assert_eq!(m.get_network_id(b), Some(net));
    assert_eq!(m.network_stored_type(net), Some(fresh()));
    assert!(check_invariants(&m).is_empty());
}

#[test]
fn removing_pipe_splits_into_singletons_that_keep_contents() {
    let mut m = manager();
    let a = tank_at(&mut m, 0, 0, 50.0);
    let pipe = pipe_at(&mut m, 1, 0);
    let b = tank_at(&mut m, 2, 0, 50.0);
    pump_at(&mut m, 1, 1, 10.0, fresh());
    run(&mut m, 5);
    let joined = m.get_network_id(a).unwrap();

    m.remove_facility(pipe).unwrap();
    m.advance();

    let na = m.get_network_id(a).unwrap();
    let nb = m.get_network_id(b).unwrap();
    assert_ne!(na, nb);
    assert_ne!(na, joined);
    assert_eq!(m.network(na).unwrap().members, vec![a]);
    assert_eq!(m.network(nb).unwrap().members, vec![b]);
    assert_eq!(m.network_stored_type(na), Some(fresh()));
    assert_eq!(m.network_stored_type(nb), Some(fresh()));
    assert_eq!(m.stored_volume(a).unwrap(), fixed(25.0));
    assert_eq!(m.stored_volume(b).unwrap(), fixed(25.0));
}

#[test]
fn unlinking_an_explicit_pipe_run_splits_the_network() {
    let mut m = manager();
    let a = filled_tank_at(&mut m, 0, 0, 50.0, 20.0, fresh());
    let b = tank_at(&mut m, 30, 30, 50.0);
    assert!(m.connect(a, b));
    m.advance();
    assert_eq!(m.get_network_id(a), m.get_network_id(b));

    assert!(m.disconnect(a, b));
    m.advance();
    assert_ne!(m.get_network_id(a), m.get_network_id(b));
    assert_eq!(m.stored_volume(a).unwrap(), fixed(20.0));
}

// ===========================================================================
// Type exclusivity
// ===========================================================================

#[test]
fn full_fresh_tank_rejects_salt_until_drawn_empty() {
    let mut m = manager();
    let t = filled_tank_at(&mut m, 0, 0, 50.0, 50.0, fresh());
    pump_at(&mut m, 1, 0, 10.0, salt());

    let mut conflicts = 0;
    for _ in 0..3 {
        let events = m.advance();
        conflicts += events
            .iter()
            .filter_map(FlowEvent::as_diagnostic)
            .filter(|d| matches!(d, Diagnostic::TypeConflict { .. }))
            .count();
        assert_eq!(m.stored_volume(t).unwrap(), fixed(50.0));
        assert_eq!(m.stored_type(t).unwrap(), Some(fresh()));
    }
    assert_eq!(conflicts, 1);

    assert_eq!(m.draw_volume(t, fixed(50.0)).unwrap(), fixed(50.0));
    run(&mut m, 2);
    assert_eq!(m.stored_type(t).unwrap(), Some(salt()));
    assert!(m.stored_volume(t).unwrap() > Volume::ZERO);
}

#[test]
fn network_type_persists_while_any_tank_holds_volume() {
    let mut m = manager();
    let a = filled_tank_at(&mut m, 0, 0, 10.0, 5.0, fresh());
    tap_at(&mut m, 1, 0, 1.0);
    let net = {
        m.advance();
        m.get_network_id(a).unwrap()
    };
    for _ in 0..3 {
        m.advance();
        assert_eq!(m.network_stored_type(net), Some(fresh()));
    }
    let events = m.advance();
    assert_eq!(m.stored_volume(a).unwrap(), Volume::ZERO);
    assert_eq!(m.network_stored_type(net), None);
    assert!(events.iter().any(|e| matches!(e, FlowEvent::TypeReleased { .. })));
}

#[test]
fn merging_networks_of_different_types_strands_the_later_tank() {
    let mut m = manager();
    let a = filled_tank_at(&mut m, 0, 0, 10.0, 5.0, fresh());
    let b = filled_tank_at(&mut m, 2, 0, 10.0, 5.0, salt());
    pump_at(&mut m, 0, 1, 2.0, fresh());
    m.advance();
    assert_ne!(m.get_network_id(a), m.get_network_id(b));

    pipe_at(&mut m, 1, 0);
    let events = m.advance();
    let net = m.get_network_id(a).unwrap();
    assert_eq!(m.get_network_id(b), Some(net));
    assert_eq!(m.network_stored_type(net), Some(fresh()));
    assert!(events.iter().filter_map(FlowEvent::as_diagnostic).any(|d| matches!(
        d,
        Diagnostic::TypeConflict { node, .. } if *node == b
    )));
    // The stranded tank is neither filled nor drained.
    run(&mut m, 3);
    assert_eq!(m.stored_volume(b).unwrap(), fixed(5.0));
    assert_eq!(m.stored_volume(a).unwrap(), fixed(10.0));
}

// ===========================================================================
// Manager guarantees
// ===========================================================================

#[test]
fn rebuild_runs_at_most_once_per_tick() {
    let mut m = manager();
    let a = tank_at(&mut m, 0, 0, 10.0);
    m.advance();
    let base = m.rebuild_count();

    for _ in 0..10 {
        m.request_topology_update();
    }
    pipe_at(&mut m, 1, 0);
    m.update_status(a, |s| s.switched_on = false).unwrap();
    m.advance();
    assert_eq!(m.rebuild_count(), base + 1);

    m.advance();
    assert_eq!(m.rebuild_count(), base + 1);
}

#[test]
fn every_active_network_resolved_exactly_once() {
    let mut m = manager();
    let mut tanks = Vec::new();
    for i in 0..4 {
        let x = i * 5;
        tanks.push(tank_at(&mut m, x, 0, 100.0));
        pump_at(&mut m, x + 1, 0, 1.0, fresh());
    }
    for tick in 1..=3 {
        m.advance();
        for t in &tanks {
            let net = m.network(m.get_network_id(*t).unwrap()).unwrap();
            assert_eq!(net.last_resolved, Some(tick));
            assert_eq!(net.last_report.supply, fixed(1.0));
        }
    }
}

#[test]
fn powered_input_stops_when_unpowered() {
    let mut m = manager();
    let t = tank_at(&mut m, 0, 0, 100.0);
    let p = pump_at(&mut m, 1, 0, 3.0, fresh());
    m.set_status(
        p,
        NodeStatus {
            needs_power: true,
            ..NodeStatus::default()
        },
    )
    .unwrap();
    run(&mut m, 2);
    assert_eq!(m.stored_volume(t).unwrap(), fixed(6.0));

    m.update_status(p, |s| s.powered = false).unwrap();
    run(&mut m, 2);
    assert_eq!(m.stored_volume(t).unwrap(), fixed(6.0));
}

#[test]
fn output_draws_from_storage_when_supply_stops() {
    let mut m = manager();
    let t = filled_tank_at(&mut m, 0, 0, 20.0, 10.0, fresh());
    let o = tap_at(&mut m, 1, 0, 3.0);
    m.advance();
    assert_eq!(m.delivered(o).unwrap(), fixed(3.0));
    assert_eq!(m.stored_volume(t).unwrap(), fixed(7.0));
    run(&mut m, 3);
    assert_eq!(m.stored_volume(t).unwrap(), Volume::ZERO);
    m.advance();
    assert_eq!(m.delivered(o).unwrap(), Volume::ZERO);
    let net = m.get_network_id(t).unwrap();
    assert_eq!(m.network_stored_type(net), None);
}

#[test]
fn supply_low_fires_once_per_shortage() {
    let mut m = manager();
    pump_at(&mut m, 0, 0, 1.0, fresh());
    tap_at(&mut m, 1, 0, 4.0);
    let lows: usize = (0..5)
        .map(|_| {
            m.advance()
                .iter()
                .filter(|e| matches!(e, FlowEvent::SupplyLow { .. }))
                .count()
        })
        .sum();
    assert_eq!(lows, 1);
}

#[test]
fn forced_inflow_overflow_is_reported() {
    let mut m = manager();
    let t = tank_at(&mut m, 0, 0, 100.0);
    let p = pump_at(&mut m, 1, 0, 2.0, fresh());
    m.force_inflow(p, fixed(5.0), Some(fresh())).unwrap();
    let events = m.advance();
    assert_eq!(m.stored_volume(t).unwrap(), fixed(5.0));
    assert!(events.iter().filter_map(FlowEvent::as_diagnostic).any(|d| matches!(
        d,
        Diagnostic::InflowOverflow { .. }
    )));
    assert!(!m.diagnostics().is_empty());
}

#[test]
fn link_to_removed_node_is_excluded() {
    let mut m = manager();
    let a = pipe_at(&mut m, 0, 0);
    let gone = pipe_at(&mut m, 5, 5);
    m.remove_facility(gone).unwrap();
    assert!(!m.connect(a, gone));
    let events = m.advance();
    assert!(events.iter().filter_map(FlowEvent::as_diagnostic).any(|d| matches!(
        d,
        Diagnostic::EdgeExcluded { .. }
    )));
    assert!(m.get_network_id(a).is_some());
}
