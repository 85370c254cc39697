//! Binary snapshots of a [`NetworkManager`] via `bitcode`.
//!
//! A snapshot holds what cannot be recomputed: node records (tank contents,
//! input flags, status), topology, the fluid registry, and counters. Network
//! ids and memberships are never persisted. A restored manager has no
//! networks until its first `advance`, which runs a full rebuild.

use crate::builder::NetworkGraph;
use crate::config::NetworkConfig;
use crate::dirty::PendingWork;
use crate::event::{DiagnosticLog, EventSink};
use crate::fixed::Ticks;
use crate::fluid::FluidRegistry;
use crate::id::NodeId;
use crate::manager::NetworkManager;
use crate::node::Facility;
use crate::topology::Topology;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a network snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xAC0E_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header prepended to every snapshot for format and version checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick at which the snapshot was taken.
    pub tick: Ticks,
}

impl SnapshotHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ManagerSnapshot {
    header: SnapshotHeader,
    config: NetworkConfig,
    fluids: FluidRegistry,
    nodes: SlotMap<NodeId, Facility>,
    topology: Topology,
    next_seq: u64,
}

/// Read the header of a snapshot without validating it.
///
/// `bitcode` has no partial decoding, so the whole snapshot is decoded and
/// everything but the header is dropped.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, SnapshotError> {
    let snapshot: ManagerSnapshot =
        bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

impl NetworkManager {
    pub fn serialize(&self) -> Result<Vec<u8>, SnapshotError> {
        let snapshot = ManagerSnapshot {
            header: SnapshotHeader::new(self.tick),
            config: self.config.clone(),
            fluids: self.fluids.clone(),
            nodes: self.nodes.clone(),
            topology: self.topology.clone(),
            next_seq: self.next_seq,
        };
        bitcode::serialize(&snapshot).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Restore a manager. Networks are recomputed by a full rebuild on the
    /// next `advance`.
    pub fn deserialize(data: &[u8]) -> Result<Self, SnapshotError> {
        let snapshot: ManagerSnapshot =
            bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.header.validate()?;

        let mut pending = PendingWork::new();
        pending.request_full();
        tracing::debug!(
            tick = snapshot.header.tick,
            nodes = snapshot.nodes.len(),
            "network snapshot restored"
        );
        Ok(NetworkManager {
            diagnostics: DiagnosticLog::new(snapshot.config.diagnostic_capacity),
            queued: EventSink::new(snapshot.header.tick),
            nodes: snapshot.nodes,
            topology: snapshot.topology,
            graph: NetworkGraph::new(),
            pending,
            config: snapshot.config,
            fluids: snapshot.fluids,
            tick: snapshot.header.tick,
            next_seq: snapshot.next_seq,
        })
    }
}
