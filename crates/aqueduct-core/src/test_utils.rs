//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::fixed::{Fixed64, Volume};
use crate::grid::GridPosition;
use crate::id::{FluidType, NodeId};
use crate::manager::NetworkManager;
use crate::node::{AcceptedTypes, FacilitySpec, FlowPolicy, InputSpec, OutputSpec};
use crate::tank::Tank;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Fluid types
// ===========================================================================

pub fn fresh() -> FluidType {
    FluidType(0)
}
pub fn salt() -> FluidType {
    FluidType(1)
}
pub fn grey() -> FluidType {
    FluidType(2)
}

/// A manager with `fresh`, `salt`, and `grey` registered in id order.
pub fn manager() -> NetworkManager {
    let mut m = NetworkManager::default();
    for name in ["fresh", "salt", "grey"] {
        m.fluids_mut().register(name);
    }
    m
}

// ===========================================================================
// Spec constructors
// ===========================================================================

pub fn input_spec(rate: f64) -> InputSpec {
    InputSpec {
        max_rate: fixed(rate),
        accepts: AcceptedTypes::Any,
        policy: FlowPolicy::Demand,
    }
}

pub fn output_spec(rate: f64) -> OutputSpec {
    OutputSpec {
        rate: fixed(rate),
        accepts: AcceptedTypes::Any,
    }
}

// ===========================================================================
// Placement helpers
// ===========================================================================

/// Place an empty tank at `(x, y)`.
pub fn tank_at(m: &mut NetworkManager, x: i32, y: i32, capacity: f64) -> NodeId {
    m.add_facility(FacilitySpec::tank(fixed(capacity)).at(GridPosition::new(x, y)))
}

/// Place a tank holding `volume` of `fluid` at `(x, y)`.
pub fn filled_tank_at(
    m: &mut NetworkManager,
    x: i32,
    y: i32,
    capacity: f64,
    volume: f64,
    fluid: FluidType,
) -> NodeId {
    let tank = Tank::with_contents(fixed(capacity), fixed(volume), fluid);
    m.add_facility(FacilitySpec::new().with_tank(tank).at(GridPosition::new(x, y)))
}

/// Place an input offering `rate` of `fluid` every tick.
pub fn pump_at(m: &mut NetworkManager, x: i32, y: i32, rate: f64, fluid: FluidType) -> NodeId {
    let id = m.add_facility(
        FacilitySpec::new()
            .at(GridPosition::new(x, y))
            .with_input(input_spec(rate)),
    );
    // A freshly added input always has the input role.
    let _ = m.set_inflow(id, fixed(rate), Some(fluid));
    id
}

/// Place an output drawing `rate` per tick.
pub fn tap_at(m: &mut NetworkManager, x: i32, y: i32, rate: f64) -> NodeId {
    m.add_facility(
        FacilitySpec::new()
            .at(GridPosition::new(x, y))
            .with_output(output_spec(rate)),
    )
}

pub fn pipe_at(m: &mut NetworkManager, x: i32, y: i32) -> NodeId {
    m.add_facility(FacilitySpec::pipe().at(GridPosition::new(x, y)))
}

/// A straight horizontal pipe run from `x0` to `x1` inclusive on row `y`.
pub fn pipe_run(m: &mut NetworkManager, x0: i32, x1: i32, y: i32) -> Vec<NodeId> {
    (x0.min(x1)..=x0.max(x1)).map(|x| pipe_at(m, x, y)).collect()
}

/// Sum of every tank's stored volume.
pub fn total_stored(m: &NetworkManager) -> Volume {
    m.facilities()
        .fold(Volume::ZERO, |acc, (_, f)| acc.saturating_add(f.stored_volume()))
}

/// Advance `ticks` times, discarding events.
pub fn run(m: &mut NetworkManager, ticks: usize) {
    for _ in 0..ticks {
        m.advance();
    }
}
