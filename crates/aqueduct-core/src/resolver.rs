//! Flow resolver: one deterministic pass over one network per tick.
//!
//! # Algorithm
//!
//! 1. **Type resolution.** An unlocked network adopts the type of its first
//!    non-empty tank, or failing that, of the first activated input (in
//!    registration order) offering an accepted type.
//! 2. **Supply.** Sum the capped (or forced) inflow of activated inputs whose
//!    type matches the lock. Mismatched inputs contribute zero.
//! 3. **Demand.** Activated outputs accepting the locked type request their
//!    rate; eligible tanks offer their free capacity.
//! 4. **Allocation.** Outputs are served from supply first, in proportion to
//!    their request when supply is short. The remainder goes to tanks in
//!    proportion to free capacity, or fills every tank with the surplus
//!    discarded. Output demand still unmet is drained from tanks in
//!    proportion to their stored volume.
//! 5. **Type reset.** With nothing stored and nothing supplied, the lock is
//!    released.
//! 6. **Events.** Supply low/restored and storage full/empty fire only on
//!    transitions.
//!
//! Every amount is clamped into its valid range. A clamp is reported as
//! [`Diagnostic::CapacityClamped`]; the tick always completes.

use crate::config::NetworkConfig;
use crate::event::{Diagnostic, EventSink, FlowEvent};
use crate::fixed::{Fixed64, Volume, proportional, ratio, sum_volumes};
use crate::id::{FluidType, NodeId};
use crate::network::{FlowReport, Network};
use crate::node::Facility;
use crate::tank::LedgerError;
use slotmap::SlotMap;

/// Resolve one tick of flow for `network`.
pub fn resolve(
    network: &mut Network,
    nodes: &mut SlotMap<NodeId, Facility>,
    sink: &mut EventSink,
    config: &NetworkConfig,
) -> FlowReport {
    let tick = sink.tick();
    clear_ports(network, nodes);

    // Step 1: type resolution.
    if network.fluid_type.is_none() {
        let adopted = network
            .stored_type(nodes)
            .or_else(|| first_supplier_type(network, nodes));
        if let Some(fluid) = adopted {
            lock(network, fluid, sink);
        }
    }
    let locked = network.fluid_type;

    let tank_states: Vec<(NodeId, bool, bool)> = network
        .tanks
        .iter()
        .filter_map(|&id| {
            let tank = nodes.get(id)?.tank.as_ref()?;
            Some((id, tank.is_full(), tank.is_empty()))
        })
        .collect();

    // Step 2: supply.
    let supply = aggregate_supply(network, nodes, sink);

    // Step 3: demand.
    let requests: Vec<(NodeId, Volume)> = network
        .outputs
        .iter()
        .filter_map(|&id| {
            let f = nodes.get(id)?;
            let port = f.output.as_ref()?;
            let accepted = locked.is_none_or(|l| port.spec.accepts.accepts(l));
            (f.output_activated() && accepted).then(|| (id, port.spec.rate.max(Volume::ZERO)))
        })
        .filter(|(_, rate)| *rate > Volume::ZERO)
        .collect();
    let request_weights: Vec<Volume> = requests.iter().map(|(_, r)| *r).collect();
    let total_request = sum_volumes(request_weights.iter().copied());

    let tank_room: Vec<(NodeId, Volume)> = network
        .tanks
        .iter()
        .filter_map(|&id| {
            let f = nodes.get(id)?;
            network
                .tank_eligible(f)
                .then(|| (id, f.amount_can_accept()))
        })
        .collect();
    let free_weights: Vec<Volume> = tank_room.iter().map(|(_, free)| *free).collect();
    let total_free = sum_volumes(free_weights.iter().copied());

    // Step 4: allocation. Outputs first.
    let mut delivered: Vec<Volume> = if supply >= total_request {
        request_weights.clone()
    } else {
        fair_share(supply, &request_weights)
    };
    let remainder = (supply - sum_volumes(delivered.iter().copied())).max(Volume::ZERO);

    // Then tanks.
    let fills = if remainder >= total_free {
        free_weights.clone()
    } else {
        fair_share(remainder, &free_weights)
    };
    let mut stored = Volume::ZERO;
    if let Some(fluid) = locked {
        for (&(id, _), amount) in tank_room.iter().zip(fills) {
            if amount <= Volume::ZERO {
                continue;
            }
            let Some(tank) = nodes.get_mut(id).and_then(|f| f.tank.as_mut()) else {
                continue;
            };
            match tank.fill(amount, fluid) {
                Ok(accepted) => {
                    stored = stored.saturating_add(accepted);
                    if accepted != amount {
                        sink.diagnose(Diagnostic::CapacityClamped {
                            node: id,
                            attempted: amount,
                            applied: accepted,
                        });
                    }
                }
                Err(LedgerError::TypeLocked { stored: held, .. }) => {
                    sink.diagnose(Diagnostic::TypeConflict {
                        network: network.id,
                        node: id,
                        offered: held,
                        locked: fluid,
                    });
                }
                Err(_) => {}
            }
        }
    }
    let discarded = (remainder - stored).max(Volume::ZERO);

    // Unmet output demand is drained from storage.
    let unmet: Vec<Volume> = request_weights
        .iter()
        .zip(&delivered)
        .map(|(want, got)| (*want - *got).max(Volume::ZERO))
        .collect();
    let unmet_total = sum_volumes(unmet.iter().copied());
    let mut drained = Volume::ZERO;
    if let Some(fluid) = locked.filter(|_| unmet_total > Volume::ZERO) {
        drained = drain_storage(network, nodes, fluid, unmet_total, sink);
        let extras = fair_share_exact(drained, &unmet);
        for (got, extra) in delivered.iter_mut().zip(extras) {
            *got = got.saturating_add(extra);
        }
    }

    for (&(id, _), &amount) in requests.iter().zip(&delivered) {
        if let Some(port) = nodes.get_mut(id).and_then(|f| f.output.as_mut()) {
            port.delivered = amount;
            port.delivered_type = locked.filter(|_| amount > Volume::ZERO);
        }
    }
    let delivered_total = sum_volumes(delivered.iter().copied());
    let satisfaction = if total_request <= Volume::ZERO {
        Fixed64::from_num(1)
    } else {
        ratio(delivered_total, total_request)
    };

    // Step 5: type reset.
    if supply == Volume::ZERO {
        release_if_empty(network, nodes, sink);
    }

    // Step 6: transition events.
    update_supply_state(network, satisfaction, sink);
    for (id, was_full, was_empty) in tank_states {
        let Some(tank) = nodes.get(id).and_then(|f| f.tank.as_ref()) else {
            continue;
        };
        if tank.is_full() && !was_full {
            sink.push(FlowEvent::StorageFull {
                network: network.id,
                node: id,
                tick,
            });
        }
        if tank.is_empty() && !was_empty {
            sink.push(FlowEvent::StorageEmpty {
                network: network.id,
                node: id,
                tick,
            });
        }
    }

    if config.log_surplus && discarded > Volume::ZERO {
        tracing::debug!(tick, network = ?network.id, %discarded, "surplus discarded");
    }

    let report = FlowReport {
        tick,
        supply,
        delivered: delivered_total,
        stored,
        drained,
        discarded,
        satisfaction,
    };
    network.last_report = report;
    network.last_resolved = Some(tick);
    report
}

/// Bookkeeping for a network with nothing to resolve: no activated input
/// and nothing stored. Outputs receive nothing and a lingering lock is released.
pub fn settle_idle(
    network: &mut Network,
    nodes: &mut SlotMap<NodeId, Facility>,
    sink: &mut EventSink,
) {
    clear_ports(network, nodes);
    release_if_empty(network, nodes, sink);
    let requesting = network
        .outputs
        .iter()
        .filter_map(|id| nodes.get(*id))
        .any(|f| f.output_activated() && f.output.as_ref().is_some_and(|p| p.spec.rate > Volume::ZERO));
    let satisfaction = if requesting {
        Fixed64::ZERO
    } else {
        Fixed64::from_num(1)
    };
    update_supply_state(network, satisfaction, sink);
    network.last_report = FlowReport {
        tick: sink.tick(),
        satisfaction,
        ..FlowReport::default()
    };
}

/// Re-derive the lock after storage changed outside the resolver.
pub fn refresh_lock(
    network: &mut Network,
    nodes: &SlotMap<NodeId, Facility>,
    sink: &mut EventSink,
) {
    match network.fluid_type {
        None => {
            if let Some(fluid) = network.stored_type(nodes) {
                lock(network, fluid, sink);
            }
        }
        Some(_) => {
            let supplying = network
                .inputs
                .iter()
                .filter_map(|id| nodes.get(*id))
                .any(Facility::input_activated);
            if !supplying {
                release_if_empty(network, nodes, sink);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn clear_ports(network: &Network, nodes: &mut SlotMap<NodeId, Facility>) {
    for &id in &network.outputs {
        if let Some(port) = nodes.get_mut(id).and_then(|f| f.output.as_mut()) {
            port.delivered = Volume::ZERO;
            port.delivered_type = None;
        }
    }
    for &id in &network.inputs {
        if let Some(port) = nodes.get_mut(id).and_then(|f| f.input.as_mut()) {
            port.supplied = Volume::ZERO;
        }
    }
}

fn lock(network: &mut Network, fluid: FluidType, sink: &mut EventSink) {
    network.fluid_type = Some(fluid);
    sink.push(FlowEvent::TypeLocked {
        network: network.id,
        fluid,
        tick: sink.tick(),
    });
}

/// The type offered by the first activated input able to supply this tick.
fn first_supplier_type(network: &Network, nodes: &SlotMap<NodeId, Facility>) -> Option<FluidType> {
    network.inputs.iter().find_map(|id| {
        let f = nodes.get(*id)?;
        let port = f.input.as_ref()?;
        if !f.input_activated() || port.candidate_flow() <= Volume::ZERO {
            return None;
        }
        port.candidate_type()
    })
}

fn aggregate_supply(
    network: &Network,
    nodes: &mut SlotMap<NodeId, Facility>,
    sink: &mut EventSink,
) -> Volume {
    let mut supply = Volume::ZERO;
    for &id in &network.inputs {
        let Some(f) = nodes.get_mut(id) else { continue };
        let activated = f.input_activated();
        let Some(port) = f.input.as_mut() else { continue };
        let flow = port.candidate_flow();
        let Some(offered) = port.candidate_type().filter(|_| activated && flow > Volume::ZERO)
        else {
            port.rejected = false;
            continue;
        };
        let Some(locked) = network.fluid_type else {
            continue;
        };
        if offered != locked {
            if !port.rejected {
                port.rejected = true;
                sink.diagnose(Diagnostic::TypeConflict {
                    network: network.id,
                    node: id,
                    offered,
                    locked,
                });
            }
            continue;
        }
        port.rejected = false;
        if port.forced && port.is_overflowing() {
            sink.diagnose(Diagnostic::InflowOverflow {
                node: id,
                inflow: port.offered,
                max_rate: port.spec.max_rate,
            });
        }
        port.supplied = flow;
        supply = supply.saturating_add(flow);
    }
    supply
}

/// Draw up to `wanted` from tanks holding `fluid`, in proportion to their volume.
fn drain_storage(
    network: &Network,
    nodes: &mut SlotMap<NodeId, Facility>,
    fluid: FluidType,
    wanted: Volume,
    sink: &mut EventSink,
) -> Volume {
    let sources: Vec<(NodeId, Volume)> = network
        .tanks
        .iter()
        .filter_map(|&id| {
            let f = nodes.get(id)?;
            (f.stored_type() == Some(fluid)).then(|| (id, f.stored_volume()))
        })
        .collect();
    let volumes: Vec<Volume> = sources.iter().map(|(_, v)| *v).collect();
    let target = wanted.min(sum_volumes(volumes.iter().copied()));
    if target <= Volume::ZERO {
        return Volume::ZERO;
    }

    let mut drained = Volume::ZERO;
    for (&(id, _), amount) in sources.iter().zip(fair_share_exact(target, &volumes)) {
        if amount <= Volume::ZERO {
            continue;
        }
        let Some(tank) = nodes.get_mut(id).and_then(|f| f.tank.as_mut()) else {
            continue;
        };
        let taken = tank.draw(amount);
        if taken != amount {
            sink.diagnose(Diagnostic::CapacityClamped {
                node: id,
                attempted: amount,
                applied: taken,
            });
        }
        drained = drained.saturating_add(taken);
    }
    drained
}

/// Release the lock when no tank of the locked type holds anything. A
/// stranded tank of another type, if any, takes over the lock.
fn release_if_empty(network: &mut Network, nodes: &SlotMap<NodeId, Facility>, sink: &mut EventSink) {
    if network.fluid_type.is_none() || network.stored_volume(nodes) > Volume::ZERO {
        return;
    }
    network.fluid_type = None;
    sink.push(FlowEvent::TypeReleased {
        network: network.id,
        tick: sink.tick(),
    });
    if let Some(next) = network.stored_type(nodes) {
        lock(network, next, sink);
        network
            .stranded
            .retain(|id| nodes.get(*id).and_then(Facility::stored_type) != Some(next));
    }
}

fn update_supply_state(network: &mut Network, satisfaction: Fixed64, sink: &mut EventSink) {
    let low = satisfaction < Fixed64::from_num(1);
    if low && !network.was_low_supply {
        sink.push(FlowEvent::SupplyLow {
            network: network.id,
            satisfaction,
            tick: sink.tick(),
        });
    } else if !low && network.was_low_supply {
        sink.push(FlowEvent::SupplyRestored {
            network: network.id,
            tick: sink.tick(),
        });
    }
    network.was_low_supply = low;
}

/// Split `amount` in proportion to `weights`. Truncation dust is left unassigned.
pub fn fair_share(amount: Volume, weights: &[Volume]) -> Vec<Volume> {
    let total = sum_volumes(weights.iter().copied());
    weights
        .iter()
        .map(|w| proportional(amount, *w, total).min(*w))
        .collect()
}

/// Like [`fair_share`], but hands the truncation dust out in order so the
/// shares sum to `min(amount, sum(weights))`. No share exceeds its weight.
pub fn fair_share_exact(amount: Volume, weights: &[Volume]) -> Vec<Volume> {
    let total = sum_volumes(weights.iter().copied());
    let amount = amount.min(total);
    let mut shares = fair_share(amount, weights);
    let mut dust = (amount - sum_volumes(shares.iter().copied())).max(Volume::ZERO);
    for (share, weight) in shares.iter_mut().zip(weights) {
        if dust <= Volume::ZERO {
            break;
        }
        let room = (*weight - *share).max(Volume::ZERO);
        let extra = room.min(dust);
        *share += extra;
        dust -= extra;
    }
    shares
}
