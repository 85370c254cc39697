//! Aqueduct Core -- a tick-based fluid distribution network simulation.
//!
//! Facilities (inputs, outputs, tanks, and pipes) placed on a grid are
//! partitioned into connected networks. Each network carries one fluid type
//! at a time and is resolved once per tick: supply is gathered from inputs,
//! outputs are served, tanks take what remains, and the type lock is released
//! when the network runs dry.
//!
//! # Tick Pipeline
//!
//! Each call to [`manager::NetworkManager::advance`] runs:
//!
//! 1. **Rebuild** -- Drain the pending work queue into at most one
//!    incremental rebuild of the affected region.
//! 2. **Lock refresh** -- Re-derive type locks for networks whose tanks were
//!    emptied or filled from outside.
//! 3. **Resolve** -- Run the flow resolver once over every network with an
//!    activated input or stored volume. Idle networks are settled cheaply.
//! 4. **Report** -- Return the tick's [`event::FlowEvent`]s and record
//!    diagnostics in the bounded log.
//!
//! # Key Types
//!
//! - [`manager::NetworkManager`] -- Per-map owner of nodes, topology, and networks.
//! - [`node::Facility`] -- A node record with optional input, output, and tank roles.
//! - [`tank::Tank`] -- Storage ledger entry upholding the capacity and type invariants.
//! - [`builder::NetworkGraph`] -- Connected-component partition with incremental rebuild.
//! - [`resolver`] -- The per-tick allocation pass.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic volumes.
//! - [`serialize`] -- Versioned snapshots via bitcode.

pub mod builder;
pub mod config;
pub mod dirty;
pub mod event;
pub mod fixed;
pub mod fluid;
pub mod grid;
pub mod id;
pub mod manager;
pub mod network;
pub mod node;
pub mod resolver;
pub mod serialize;
pub mod tank;
pub mod topology;
pub mod validate;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
