//! Node capability set.
//!
//! A [`Facility`] is a plain record with optional role ports. Roles are
//! queried with [`Facility::has_role`] rather than by type, so a single node
//! can be an input and a tank at the same time (a well with its own cistern)
//! or an output with local storage (a faucet with a basin).
//!
//! Everything here is a pure query surface; the flow resolver is the only
//! writer of per-tick port state.

use crate::fixed::Volume;
use crate::grid::{Footprint, GridPosition};
use crate::id::{FluidType, NodeId, PipeLayer};
use crate::tank::Tank;
use serde::{Deserialize, Serialize};

/// Errors raised when addressing a node through the manager.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("node not found: {0:?}")]
    NotFound(NodeId),
    #[error("node {node:?} has no {role:?} role")]
    MissingRole { node: NodeId, role: Role },
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// The network-participating roles a facility can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Input,
    Output,
    Storage,
    Conduit,
}

/// Which fluid types a port accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcceptedTypes {
    #[default]
    Any,
    Only(Vec<FluidType>),
}

impl AcceptedTypes {
    pub fn accepts(&self, fluid: FluidType) -> bool {
        match self {
            AcceptedTypes::Any => true,
            AcceptedTypes::Only(list) => list.contains(&fluid),
        }
    }
}

/// How an input behaves when its local tank is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlowPolicy {
    /// Stops supplying while the paired local tank has no free capacity.
    #[default]
    Demand,
    /// Supplies at its rate regardless of downstream storage.
    Constant,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Activation-relevant flags owned by the surrounding world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub broken: bool,
    pub needs_power: bool,
    pub powered: bool,
    pub switchable: bool,
    pub switched_on: bool,
    /// When closed, the node drops out of the topology entirely.
    pub valve_open: bool,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self {
            broken: false,
            needs_power: false,
            powered: true,
            switchable: false,
            switched_on: true,
            valve_open: true,
        }
    }
}

impl NodeStatus {
    /// Not broken, powered when required, switched on when switchable.
    pub fn is_activated(&self) -> bool {
        !self.broken
            && (!self.needs_power || self.powered)
            && (!self.switchable || self.switched_on)
    }
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Static parameters of an input (a pump, well, or collector feeding the network).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub max_rate: Volume,
    pub accepts: AcceptedTypes,
    pub policy: FlowPolicy,
}

/// An input port: static spec plus the inflow the world currently offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPort {
    pub spec: InputSpec,
    /// Inflow offered per tick. May exceed `max_rate` only when `forced`.
    pub offered: Volume,
    pub offered_type: Option<FluidType>,
    /// Set by `force_inflow`: accepted uncapped, flagged as an overflow.
    pub forced: bool,
    /// Whether the last resolver pass rejected this input (for transition events).
    #[serde(default)]
    pub rejected: bool,
    /// Volume this input contributed during the last resolved tick.
    #[serde(default)]
    pub supplied: Volume,
}

impl InputPort {
    pub fn new(spec: InputSpec) -> Self {
        Self {
            spec,
            offered: Volume::ZERO,
            offered_type: None,
            forced: false,
            rejected: false,
            supplied: Volume::ZERO,
        }
    }

    /// The per-tick contribution before type checks: capped unless forced.
    pub fn candidate_flow(&self) -> Volume {
        let offered = self.offered.max(Volume::ZERO);
        if self.forced {
            offered
        } else {
            offered.min(self.spec.max_rate.max(Volume::ZERO))
        }
    }

    /// Whether the offered inflow exceeds the rated maximum.
    pub fn is_overflowing(&self) -> bool {
        self.offered > self.spec.max_rate
    }

    /// The fluid this input can supply this tick, if its type is accepted.
    pub fn candidate_type(&self) -> Option<FluidType> {
        self.offered_type.filter(|t| self.spec.accepts.accepts(*t))
    }
}

/// Static parameters of an output (a tap or fixture drawing from the network).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub rate: Volume,
    pub accepts: AcceptedTypes,
}

/// An output port with the amount it received last tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPort {
    pub spec: OutputSpec,
    #[serde(default)]
    pub delivered: Volume,
    #[serde(default)]
    pub delivered_type: Option<FluidType>,
}

impl OutputPort {
    pub fn new(spec: OutputSpec) -> Self {
        Self {
            spec,
            delivered: Volume::ZERO,
            delivered_type: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Facility spec (construction parameters)
// ---------------------------------------------------------------------------

/// Where a facility sits on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub origin: GridPosition,
    pub footprint: Footprint,
}

impl Placement {
    pub fn cells(&self) -> impl Iterator<Item = GridPosition> + '_ {
        self.footprint.tiles(self.origin)
    }
}

/// Construction parameters for a facility node.
///
/// ```rust,ignore
/// let pump = FacilitySpec::new()
///     .at(GridPosition::new(0, 0))
///     .with_input(InputSpec { max_rate, accepts: AcceptedTypes::Any, policy: FlowPolicy::Demand });
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilitySpec {
    pub placement: Option<Placement>,
    pub layer: Option<PipeLayer>,
    pub input: Option<InputSpec>,
    pub output: Option<OutputSpec>,
    pub tank: Option<Tank>,
    pub conduit: bool,
    pub status: NodeStatus,
}

impl FacilitySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plain pipe segment.
    pub fn pipe() -> Self {
        Self {
            conduit: true,
            ..Self::default()
        }
    }

    /// An empty tank with the given capacity.
    pub fn tank(capacity: Volume) -> Self {
        Self::new().with_tank(Tank::new(capacity))
    }

    /// A single-cell placement at `origin`.
    pub fn at(self, origin: GridPosition) -> Self {
        self.placed(origin, Footprint::single())
    }

    pub fn placed(mut self, origin: GridPosition, footprint: Footprint) -> Self {
        self.placement = Some(Placement { origin, footprint });
        self
    }

    pub fn on_layer(mut self, layer: PipeLayer) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn with_input(mut self, spec: InputSpec) -> Self {
        self.input = Some(spec);
        self
    }

    pub fn with_output(mut self, spec: OutputSpec) -> Self {
        self.output = Some(spec);
        self
    }

    pub fn with_tank(mut self, tank: Tank) -> Self {
        self.tank = Some(tank);
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }
}

// ---------------------------------------------------------------------------
// Facility (live node record)
// ---------------------------------------------------------------------------

/// A facility's participation record in the network core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    /// Registration order; the fixed iteration order for every tie-break.
    pub seq: u64,
    pub placement: Option<Placement>,
    pub layer: Option<PipeLayer>,
    pub status: NodeStatus,
    pub input: Option<InputPort>,
    pub output: Option<OutputPort>,
    pub tank: Option<Tank>,
    pub conduit: bool,
}

impl Facility {
    pub fn from_spec(seq: u64, spec: FacilitySpec) -> Self {
        Self {
            seq,
            placement: spec.placement,
            layer: spec.layer,
            status: spec.status,
            input: spec.input.map(InputPort::new),
            output: spec.output.map(OutputPort::new),
            tank: spec.tank,
            conduit: spec.conduit,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        match role {
            Role::Input => self.input.is_some(),
            Role::Output => self.output.is_some(),
            Role::Storage => self.tank.is_some(),
            Role::Conduit => self.conduit,
        }
    }

    pub fn roles(&self) -> Vec<Role> {
        [Role::Input, Role::Output, Role::Storage, Role::Conduit]
            .into_iter()
            .filter(|r| self.has_role(*r))
            .collect()
    }

    /// Whether this node takes part in topology: at least one role and an open valve.
    pub fn participates(&self) -> bool {
        self.status.valve_open
            && (self.input.is_some()
                || self.output.is_some()
                || self.tank.is_some()
                || self.conduit)
    }

    pub fn is_activated(&self) -> bool {
        self.status.is_activated()
    }

    /// Input activation: activated, and either no local tank, a local tank
    /// with free capacity, or a constant-rate policy.
    pub fn input_activated(&self) -> bool {
        let Some(input) = &self.input else {
            return false;
        };
        if !self.is_activated() {
            return false;
        }
        match &self.tank {
            None => true,
            Some(tank) => {
                input.spec.policy == FlowPolicy::Constant
                    || tank.amount_can_accept() > Volume::ZERO
            }
        }
    }

    /// Output activation: an output role on an activated node.
    pub fn output_activated(&self) -> bool {
        self.output.is_some() && self.is_activated()
    }

    pub fn stored_volume(&self) -> Volume {
        self.tank.as_ref().map_or(Volume::ZERO, Tank::volume)
    }

    pub fn stored_type(&self) -> Option<FluidType> {
        self.tank.as_ref().and_then(Tank::fluid)
    }

    pub fn amount_can_accept(&self) -> Volume {
        self.tank.as_ref().map_or(Volume::ZERO, Tank::amount_can_accept)
    }

    pub fn cells(&self) -> Vec<GridPosition> {
        self.placement
            .as_ref()
            .map(|p| p.cells().collect())
            .unwrap_or_default()
    }
}

/// Whether two layers may join. `None` joins anything.
pub fn layers_compatible(a: Option<PipeLayer>, b: Option<PipeLayer>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64) -> Volume {
        Volume::from_num(x)
    }

    fn pump_spec(rate: f64) -> InputSpec {
        InputSpec {
            max_rate: v(rate),
            accepts: AcceptedTypes::Any,
            policy: FlowPolicy::Demand,
        }
    }

    #[test]
    fn status_activation_rules() {
        let mut s = NodeStatus::default();
        assert!(s.is_activated());
        s.needs_power = true;
        s.powered = false;
        assert!(!s.is_activated());
        s.powered = true;
        s.switchable = true;
        s.switched_on = false;
        assert!(!s.is_activated());
        s.switched_on = true;
        s.broken = true;
        assert!(!s.is_activated());
    }

    #[test]
    fn mixed_roles_report_each_role() {
        let f = Facility::from_spec(
            0,
            FacilitySpec::tank(v(10.0)).with_input(pump_spec(2.0)),
        );
        assert!(f.has_role(Role::Input));
        assert!(f.has_role(Role::Storage));
        assert!(!f.has_role(Role::Output));
        assert_eq!(f.roles(), vec![Role::Input, Role::Storage]);
    }

    #[test]
    fn roleless_node_does_not_participate() {
        let f = Facility::from_spec(0, FacilitySpec::new());
        assert!(!f.participates());
    }

    #[test]
    fn closed_valve_removes_participation() {
        let mut f = Facility::from_spec(0, FacilitySpec::pipe());
        assert!(f.participates());
        f.status.valve_open = false;
        assert!(!f.participates());
    }

    #[test]
    fn input_with_full_local_tank_is_not_activated() {
        let full = Tank::with_contents(v(10.0), v(10.0), FluidType(0));
        let f = Facility::from_spec(0, FacilitySpec::new().with_tank(full).with_input(pump_spec(2.0)));
        assert!(!f.input_activated());
    }

    #[test]
    fn constant_policy_ignores_full_local_tank() {
        let full = Tank::with_contents(v(10.0), v(10.0), FluidType(0));
        let mut spec = pump_spec(2.0);
        spec.policy = FlowPolicy::Constant;
        let f = Facility::from_spec(0, FacilitySpec::new().with_tank(full).with_input(spec));
        assert!(f.input_activated());
    }

    #[test]
    fn candidate_flow_is_capped_unless_forced() {
        let mut port = InputPort::new(pump_spec(5.0));
        port.offered = v(8.0);
        assert_eq!(port.candidate_flow(), v(5.0));
        assert!(port.is_overflowing());
        port.forced = true;
        assert_eq!(port.candidate_flow(), v(8.0));
    }

    #[test]
    fn candidate_type_respects_accept_list() {
        let mut spec = pump_spec(5.0);
        spec.accepts = AcceptedTypes::Only(vec![FluidType(0)]);
        let mut port = InputPort::new(spec);
        port.offered_type = Some(FluidType(1));
        assert_eq!(port.candidate_type(), None);
        port.offered_type = Some(FluidType(0));
        assert_eq!(port.candidate_type(), Some(FluidType(0)));
    }

    #[test]
    fn layer_compatibility() {
        assert!(layers_compatible(None, Some(PipeLayer(2))));
        assert!(layers_compatible(Some(PipeLayer(1)), Some(PipeLayer(1))));
        assert!(!layers_compatible(Some(PipeLayer(1)), Some(PipeLayer(2))));
    }
}
