//! The network manager: per-map owner of nodes, topology, and networks.
//!
//! The manager is the only writer of the node -> network mapping. Every
//! mutation goes through `&mut self`, which serialises changes to a node
//! within a tick. Topology changes are queued in a [`PendingWork`] and drained
//! once per [`advance`](NetworkManager::advance).
//!
//! ```rust,ignore
//! let mut manager = NetworkManager::new(NetworkConfig::default());
//! let fresh = manager.fluids_mut().register("fresh");
//! let pump = manager.add_facility(FacilitySpec::new().at(GridPosition::new(0, 0)).with_input(spec));
//! let tank = manager.add_facility(FacilitySpec::tank(capacity).at(GridPosition::new(1, 0)));
//! manager.set_inflow(pump, rate, Some(fresh))?;
//! let events = manager.advance();
//! ```

use crate::builder::{NetworkGraph, RebuildOutcome};
use crate::config::NetworkConfig;
use crate::dirty::PendingWork;
use crate::event::{Diagnostic, DiagnosticLog, EventSink, FlowEvent};
use crate::fixed::{Ticks, Volume, sum_volumes};
use crate::fluid::FluidRegistry;
use crate::id::{FluidType, NetworkId, NodeId};
use crate::network::Network;
use crate::node::{Facility, FacilitySpec, NodeError, NodeStatus, Role};
use crate::resolver;
use crate::resolver::fair_share_exact;
use crate::tank::LedgerError;
use crate::topology::Topology;
use slotmap::SlotMap;

pub struct NetworkManager {
    pub(crate) nodes: SlotMap<NodeId, Facility>,
    pub(crate) topology: Topology,
    pub(crate) graph: NetworkGraph,
    pub(crate) pending: PendingWork,
    pub(crate) config: NetworkConfig,
    pub(crate) fluids: FluidRegistry,
    pub(crate) diagnostics: DiagnosticLog,
    /// Events raised between ticks, returned by the next `advance`.
    pub(crate) queued: EventSink,
    pub(crate) tick: Ticks,
    pub(crate) next_seq: u64,
}

impl Default for NetworkManager {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl NetworkManager {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            topology: Topology::new(),
            graph: NetworkGraph::new(),
            pending: PendingWork::new(),
            diagnostics: DiagnosticLog::new(config.diagnostic_capacity),
            config,
            fluids: FluidRegistry::new(),
            queued: EventSink::new(0),
            tick: 0,
            next_seq: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn fluids(&self) -> &FluidRegistry {
        &self.fluids
    }

    pub fn fluids_mut(&mut self) -> &mut FluidRegistry {
        &mut self.fluids
    }

    /// Number of completed `advance` calls.
    pub fn tick(&self) -> Ticks {
        self.tick
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn facility(&self, node: NodeId) -> Option<&Facility> {
        self.nodes.get(node)
    }

    /// All live nodes, in key order.
    pub fn facilities(&self) -> impl Iterator<Item = (NodeId, &Facility)> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.graph.get(id)
    }

    /// All networks, in id order.
    pub fn networks(&self) -> impl Iterator<Item = &Network> {
        self.graph.iter()
    }

    pub fn network_count(&self) -> usize {
        self.graph.len()
    }

    /// How many topology rebuilds have run.
    pub fn rebuild_count(&self) -> u64 {
        self.graph.rebuild_count()
    }

    /// Whether a rebuild is queued for the next `advance`.
    pub fn has_pending_rebuild(&self) -> bool {
        self.pending.needs_rebuild()
    }

    // -----------------------------------------------------------------------
    // Node lifecycle
    // -----------------------------------------------------------------------

    /// Register a facility. It joins a network at the next `advance`.
    pub fn add_facility(&mut self, spec: FacilitySpec) -> NodeId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let node = self.nodes.insert(Facility::from_spec(seq, spec));
        self.topology.insert(node, &self.nodes[node]);
        self.pending.mark_node(node);
        node
    }

    /// Remove a facility, returning its final state.
    pub fn remove_facility(&mut self, node: NodeId) -> Result<Facility, NodeError> {
        let facility = self.nodes.remove(node).ok_or(NodeError::NotFound(node))?;
        for linked in self.topology.remove(node, &facility) {
            self.pending.mark_node(linked);
        }
        if let Some(network) = self.graph.detach(node) {
            self.pending.mark_orphaned(network);
        }
        Ok(facility)
    }

    /// Replace a node's status flags. Activation changes take effect on the
    /// next `advance`.
    pub fn set_status(&mut self, node: NodeId, status: NodeStatus) -> Result<(), NodeError> {
        let facility = self.nodes.get_mut(node).ok_or(NodeError::NotFound(node))?;
        if facility.status != status {
            facility.status = status;
            self.pending.mark_node(node);
        }
        Ok(())
    }

    pub fn update_status(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut NodeStatus),
    ) -> Result<(), NodeError> {
        let mut status = self.nodes.get(node).ok_or(NodeError::NotFound(node))?.status;
        f(&mut status);
        self.set_status(node, status)
    }

    /// Link two nodes explicitly. Returns `true` if the link is new.
    ///
    /// A link to a missing node is not an error: it is reported as an
    /// excluded edge at the next rebuild.
    pub fn connect(&mut self, a: NodeId, b: NodeId) -> bool {
        let nodes = &self.nodes;
        let fresh = self.topology.link(a, b, |n| nodes.contains_key(n));
        for end in [a, b] {
            if self.nodes.contains_key(end) {
                self.pending.mark_node(end);
            }
        }
        fresh
    }

    /// Remove an explicit link. Returns `true` if it existed.
    pub fn disconnect(&mut self, a: NodeId, b: NodeId) -> bool {
        let removed = self.topology.unlink(a, b);
        if removed {
            self.pending.mark_node(a);
            self.pending.mark_node(b);
        }
        removed
    }

    /// Set the inflow an input is offered each tick. Capped at the input's
    /// rated maximum when resolved.
    pub fn set_inflow(
        &mut self,
        node: NodeId,
        amount: Volume,
        fluid: Option<FluidType>,
    ) -> Result<(), NodeError> {
        self.offer_inflow(node, amount, fluid, false)
    }

    /// Force an inflow past the input's rated maximum. Accepted uncapped and
    /// reported as an overflow every tick it exceeds the maximum.
    pub fn force_inflow(
        &mut self,
        node: NodeId,
        amount: Volume,
        fluid: Option<FluidType>,
    ) -> Result<(), NodeError> {
        self.offer_inflow(node, amount, fluid, true)
    }

    fn offer_inflow(
        &mut self,
        node: NodeId,
        amount: Volume,
        fluid: Option<FluidType>,
        forced: bool,
    ) -> Result<(), NodeError> {
        let facility = self.nodes.get_mut(node).ok_or(NodeError::NotFound(node))?;
        let port = facility.input.as_mut().ok_or(NodeError::MissingRole {
            node,
            role: Role::Input,
        })?;
        port.offered = amount.max(Volume::ZERO);
        port.offered_type = fluid;
        port.forced = forced;
        Ok(())
    }

    /// Volume an output received during the last tick.
    pub fn delivered(&self, node: NodeId) -> Result<Volume, NodeError> {
        let facility = self.nodes.get(node).ok_or(NodeError::NotFound(node))?;
        facility
            .output
            .as_ref()
            .map(|port| port.delivered)
            .ok_or(NodeError::MissingRole {
                node,
                role: Role::Output,
            })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The network a node belonged to at the last rebuild.
    pub fn get_network_id(&self, node: NodeId) -> Option<NetworkId> {
        self.graph.network_of(node)
    }

    pub fn stored_volume(&self, node: NodeId) -> Result<Volume, LedgerError> {
        Ok(self.tank(node)?.volume())
    }

    pub fn stored_type(&self, node: NodeId) -> Result<Option<FluidType>, LedgerError> {
        Ok(self.tank(node)?.fluid())
    }

    pub fn capacity(&self, node: NodeId) -> Result<Volume, LedgerError> {
        Ok(self.tank(node)?.capacity())
    }

    pub fn fill_fraction(&self, node: NodeId) -> Result<Volume, LedgerError> {
        Ok(self.tank(node)?.fill_fraction())
    }

    fn tank(&self, node: NodeId) -> Result<&crate::tank::Tank, LedgerError> {
        self.nodes
            .get(node)
            .ok_or(LedgerError::NodeNotFound(node))?
            .tank
            .as_ref()
            .ok_or(LedgerError::NotStorage(node))
    }

    /// The locked fluid type of a network.
    pub fn network_stored_type(&self, network: NetworkId) -> Option<FluidType> {
        self.graph.get(network).and_then(|n| n.fluid_type)
    }

    /// Volume of the locked type held across a network's tanks.
    pub fn network_stored_volume(&self, network: NetworkId) -> Volume {
        self.graph
            .get(network)
            .map_or(Volume::ZERO, |n| n.stored_volume(&self.nodes))
    }

    /// Total tank capacity of a network.
    pub fn network_capacity(&self, network: NetworkId) -> Volume {
        self.graph
            .get(network)
            .map_or(Volume::ZERO, |n| n.capacity(&self.nodes))
    }

    // -----------------------------------------------------------------------
    // Storage ledger
    // -----------------------------------------------------------------------

    /// Remove up to `amount` from a tank. Returns the amount actually removed.
    pub fn draw_volume(&mut self, node: NodeId, amount: Volume) -> Result<Volume, LedgerError> {
        let facility = self.nodes.get_mut(node).ok_or(LedgerError::NodeNotFound(node))?;
        let tank = facility.tank.as_mut().ok_or(LedgerError::NotStorage(node))?;
        let taken = tank.draw(amount);
        if taken > Volume::ZERO && tank.is_empty() {
            self.refresh_lock_of(node);
        }
        Ok(taken)
    }

    /// Add fluid to a tank from outside the network.
    ///
    /// Fails without change when `fluid` conflicts with the tank's stored type
    /// or with its network's locked type. Excess beyond free capacity is
    /// discarded.
    pub fn fill_from_external_source(
        &mut self,
        node: NodeId,
        amount: Volume,
        fluid: FluidType,
    ) -> Result<Volume, LedgerError> {
        // An unlocked network still takes the type of whatever its tanks
        // already hold, including fills earlier in this tick.
        let network_lock = self
            .graph
            .network_of(node)
            .and_then(|id| self.graph.get(id))
            .and_then(|n| n.fluid_type.or_else(|| n.stored_type(&self.nodes)));
        let facility = self.nodes.get_mut(node).ok_or(LedgerError::NodeNotFound(node))?;
        let tank = facility.tank.as_mut().ok_or(LedgerError::NotStorage(node))?;
        let was_empty = tank.is_empty();

        let conflict = match (tank.fluid(), network_lock) {
            (_, Some(locked)) if locked != fluid => Some(locked),
            (Some(stored), _) if stored != fluid => Some(stored),
            _ => None,
        };
        if let Some(stored) = conflict {
            self.queued.diagnose(Diagnostic::FillRejected {
                node,
                offered: fluid,
                stored,
            });
            return Err(LedgerError::TypeLocked {
                stored,
                offered: fluid,
            });
        }

        let accepted = tank.fill(amount, fluid)?;
        if was_empty && accepted > Volume::ZERO {
            self.refresh_lock_of(node);
        }
        Ok(accepted)
    }

    /// Draw up to `amount` from a network, taking from each tank of the
    /// locked type in proportion to its volume. Returns the amount removed.
    pub fn draw_from_network(&mut self, network: NetworkId, amount: Volume) -> Volume {
        let Some(net) = self.graph.get(network) else {
            return Volume::ZERO;
        };
        let Some(locked) = net.fluid_type else {
            return Volume::ZERO;
        };
        let sources: Vec<(NodeId, Volume)> = net
            .tanks
            .iter()
            .filter_map(|&id| {
                let f = self.nodes.get(id)?;
                (f.stored_type() == Some(locked)).then(|| (id, f.stored_volume()))
            })
            .collect();
        let volumes: Vec<Volume> = sources.iter().map(|(_, v)| *v).collect();
        let wanted = amount.max(Volume::ZERO).min(sum_volumes(volumes.iter().copied()));

        let mut taken = Volume::ZERO;
        let mut emptied = false;
        for (&(id, _), share) in sources.iter().zip(fair_share_exact(wanted, &volumes)) {
            if let Some(tank) = self.nodes.get_mut(id).and_then(|f| f.tank.as_mut()) {
                taken = taken.saturating_add(tank.draw(share));
                emptied |= tank.is_empty();
            }
        }
        if emptied {
            self.pending.mark_lock_refresh(network);
        }
        taken
    }

    fn refresh_lock_of(&mut self, node: NodeId) {
        if let Some(network) = self.graph.network_of(node) {
            self.pending.mark_lock_refresh(network);
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Mark the whole topology for rebuild. Any number of calls before the
    /// next `advance` coalesce into one rebuild.
    pub fn request_topology_update(&mut self) {
        self.pending.request_full();
    }

    /// Advance one tick: rebuild at most once, then resolve every network
    /// with an activated input or stored volume exactly once.
    ///
    /// Returns the tick's events, preceded by any raised since the last call.
    pub fn advance(&mut self) -> Vec<FlowEvent> {
        self.tick += 1;
        let mut sink = EventSink::new(self.tick);
        let mut events = self.queued.drain_into(&mut self.diagnostics);

        if self.pending.needs_rebuild() {
            self.rebuild(&mut sink);
        }

        for id in self.pending.take_lock_refresh() {
            if let Some(network) = self.graph.get_mut(id) {
                resolver::refresh_lock(network, &self.nodes, &mut sink);
            }
        }

        for id in self.graph.ids() {
            let Some(network) = self.graph.get_mut(id) else {
                continue;
            };
            if network.is_active(&self.nodes) {
                resolver::resolve(network, &mut self.nodes, &mut sink, &self.config);
            } else {
                resolver::settle_idle(network, &mut self.nodes, &mut sink);
            }
        }

        events.extend(sink.drain_into(&mut self.diagnostics));
        self.queued = EventSink::new(self.tick);
        events
    }

    fn rebuild(&mut self, sink: &mut EventSink) -> RebuildOutcome {
        let request = self.pending.take_rebuild();
        self.graph.rebuild(
            &self.nodes,
            &mut self.topology,
            request,
            self.config.adjacency,
            sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridPosition;
    use crate::node::{AcceptedTypes, FlowPolicy, InputSpec, OutputSpec};
    use crate::tank::Tank;

    fn v(x: f64) -> Volume {
        Volume::from_num(x)
    }

    fn pump(rate: f64) -> InputSpec {
        InputSpec {
            max_rate: v(rate),
            accepts: AcceptedTypes::Any,
            policy: FlowPolicy::Demand,
        }
    }

    fn at(x: i32, y: i32) -> GridPosition {
        GridPosition::new(x, y)
    }

    #[test]
    fn nodes_join_networks_on_advance() {
        let mut m = NetworkManager::default();
        let a = m.add_facility(FacilitySpec::pipe().at(at(0, 0)));
        assert_eq!(m.get_network_id(a), None);
        assert!(m.has_pending_rebuild());
        m.advance();
        assert!(m.get_network_id(a).is_some());
        assert!(!m.has_pending_rebuild());
    }

    #[test]
    fn repeated_update_requests_rebuild_once() {
        let mut m = NetworkManager::default();
        m.add_facility(FacilitySpec::pipe().at(at(0, 0)));
        m.advance();
        let before = m.rebuild_count();
        for _ in 0..5 {
            m.request_topology_update();
        }
        m.advance();
        assert_eq!(m.rebuild_count(), before + 1);
        m.advance();
        assert_eq!(m.rebuild_count(), before + 1);
    }

    #[test]
    fn each_active_network_resolved_once_per_tick() {
        let mut m = NetworkManager::default();
        let fresh = m.fluids_mut().register("fresh");
        let p = m.add_facility(FacilitySpec::new().at(at(0, 0)).with_input(pump(5.0)));
        m.add_facility(FacilitySpec::tank(v(100.0)).at(at(1, 0)));
        let idle = m.add_facility(FacilitySpec::tank(v(100.0)).at(at(9, 9)));
        m.set_inflow(p, v(5.0), Some(fresh)).unwrap();
        m.advance();
        m.advance();
        let active = m.network(m.get_network_id(p).unwrap()).unwrap();
        assert_eq!(active.last_resolved, Some(2));
        let idle = m.network(m.get_network_id(idle).unwrap()).unwrap();
        assert_eq!(idle.last_resolved, None);
    }

    #[test]
    fn draw_volume_returns_actual_amount() {
        let mut m = NetworkManager::default();
        let fresh = m.fluids_mut().register("fresh");
        let t = m.add_facility(FacilitySpec::new().with_tank(Tank::with_contents(v(10.0), v(3.0), fresh)));
        assert_eq!(m.draw_volume(t, v(5.0)).unwrap(), v(3.0));
        assert_eq!(m.stored_type(t).unwrap(), None);
        assert_eq!(m.draw_volume(t, v(5.0)).unwrap(), Volume::ZERO);
    }

    #[test]
    fn ledger_errors_on_missing_or_non_tank() {
        let mut m = NetworkManager::default();
        let p = m.add_facility(FacilitySpec::pipe());
        assert_eq!(m.stored_volume(p), Err(LedgerError::NotStorage(p)));
        m.remove_facility(p).unwrap();
        assert_eq!(m.draw_volume(p, v(1.0)), Err(LedgerError::NodeNotFound(p)));
        assert_eq!(m.remove_facility(p).unwrap_err(), NodeError::NotFound(p));
    }

    #[test]
    fn external_fill_respects_network_lock() {
        let mut m = NetworkManager::default();
        let fresh = m.fluids_mut().register("fresh");
        let salt = m.fluids_mut().register("salt");
        m.add_facility(FacilitySpec::new().with_tank(Tank::with_contents(v(10.0), v(5.0), fresh)).at(at(0, 0)));
        let empty = m.add_facility(FacilitySpec::tank(v(10.0)).at(at(1, 0)));
        m.advance();
        let err = m.fill_from_external_source(empty, v(3.0), salt).unwrap_err();
        assert_eq!(
            err,
            LedgerError::TypeLocked {
                stored: fresh,
                offered: salt
            }
        );
        assert_eq!(m.stored_volume(empty).unwrap(), Volume::ZERO);
        let events = m.advance();
        assert!(events.iter().filter_map(FlowEvent::as_diagnostic).any(|d| matches!(
            d,
            Diagnostic::FillRejected { .. }
        )));
        assert_eq!(m.fill_from_external_source(empty, v(30.0), fresh).unwrap(), v(10.0));
    }

    #[test]
    fn draw_from_network_splits_by_volume() {
        let mut m = NetworkManager::default();
        let fresh = m.fluids_mut().register("fresh");
        let a = m.add_facility(FacilitySpec::new().with_tank(Tank::with_contents(v(50.0), v(30.0), fresh)).at(at(0, 0)));
        let b = m.add_facility(FacilitySpec::new().with_tank(Tank::with_contents(v(50.0), v(10.0), fresh)).at(at(1, 0)));
        m.advance();
        let net = m.get_network_id(a).unwrap();
        assert_eq!(m.network_stored_type(net), Some(fresh));
        assert_eq!(m.draw_from_network(net, v(20.0)), v(20.0));
        assert_eq!(m.stored_volume(a).unwrap(), v(15.0));
        assert_eq!(m.stored_volume(b).unwrap(), v(5.0));
        assert_eq!(m.draw_from_network(net, v(100.0)), v(20.0));
        m.advance();
        assert_eq!(m.network_stored_type(net), None);
    }

    #[test]
    fn same_tick_fills_cannot_mix_types() {
        let mut m = NetworkManager::default();
        let fresh = m.fluids_mut().register("fresh");
        let salt = m.fluids_mut().register("salt");
        let a = m.add_facility(FacilitySpec::tank(v(50.0)).at(at(0, 0)));
        let b = m.add_facility(FacilitySpec::tank(v(50.0)).at(at(1, 0)));
        m.advance();
        let net = m.get_network_id(a).unwrap();
        assert_eq!(m.network_stored_type(net), None);

        assert_eq!(m.fill_from_external_source(a, v(10.0), fresh).unwrap(), v(10.0));
        assert_eq!(
            m.fill_from_external_source(b, v(10.0), salt),
            Err(LedgerError::TypeLocked {
                stored: fresh,
                offered: salt
            })
        );
        assert_eq!(m.fill_from_external_source(b, v(4.0), fresh).unwrap(), v(4.0));
        m.advance();

        assert_eq!(m.network_stored_type(net), Some(fresh));
        assert_eq!(m.stored_type(b).unwrap(), Some(fresh));
        assert_eq!(m.network_stored_volume(net), v(14.0));
        assert_eq!(m.network_capacity(net), v(100.0));
        assert!(crate::validate::check_invariants(&m).is_empty());
    }

    #[test]
    fn stranded_tank_cannot_be_topped_up() {
        let mut m = NetworkManager::default();
        let fresh = m.fluids_mut().register("fresh");
        let salt = m.fluids_mut().register("salt");
        m.add_facility(FacilitySpec::new().with_tank(Tank::with_contents(v(10.0), v(5.0), fresh)).at(at(0, 0)));
        let salty = m.add_facility(FacilitySpec::new().with_tank(Tank::with_contents(v(10.0), v(5.0), salt)).at(at(1, 0)));
        m.advance();
        assert_eq!(
            m.fill_from_external_source(salty, v(1.0), salt),
            Err(LedgerError::TypeLocked {
                stored: fresh,
                offered: salt
            })
        );
        assert_eq!(
            m.fill_from_external_source(salty, v(1.0), fresh),
            Err(LedgerError::TypeLocked {
                stored: salt,
                offered: fresh
            })
        );
        assert_eq!(m.stored_volume(salty).unwrap(), v(5.0));
    }

    #[test]
    fn set_inflow_requires_input_role() {
        let mut m = NetworkManager::default();
        let t = m.add_facility(FacilitySpec::tank(v(1.0)));
        assert_eq!(
            m.set_inflow(t, v(1.0), None),
            Err(NodeError::MissingRole {
                node: t,
                role: Role::Input
            })
        );
    }

    #[test]
    fn broken_input_stops_supply() {
        let mut m = NetworkManager::default();
        let fresh = m.fluids_mut().register("fresh");
        let p = m.add_facility(FacilitySpec::new().at(at(0, 0)).with_input(pump(5.0)));
        let t = m.add_facility(FacilitySpec::tank(v(100.0)).at(at(1, 0)));
        m.set_inflow(p, v(5.0), Some(fresh)).unwrap();
        m.advance();
        m.update_status(p, |s| s.broken = true).unwrap();
        m.advance();
        assert_eq!(m.stored_volume(t).unwrap(), v(5.0));
    }

    #[test]
    fn outputs_report_delivery() {
        let mut m = NetworkManager::default();
        let fresh = m.fluids_mut().register("fresh");
        let p = m.add_facility(FacilitySpec::new().at(at(0, 0)).with_input(pump(5.0)));
        let o = m.add_facility(FacilitySpec::new().at(at(1, 0)).with_output(OutputSpec {
            rate: v(2.0),
            accepts: AcceptedTypes::Any,
        }));
        m.set_inflow(p, v(5.0), Some(fresh)).unwrap();
        m.advance();
        assert_eq!(m.delivered(o).unwrap(), v(2.0));
    }
}
