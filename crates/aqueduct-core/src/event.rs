//! Flow events and the diagnostic channel.
//!
//! State changes are reported as [`FlowEvent`]s returned from
//! [`NetworkManager::advance`](crate::manager::NetworkManager::advance).
//! Transition events (supply low/restored, storage full/empty, type
//! locked/released) fire only when the state changes, never every tick.
//!
//! Anomalies are [`Diagnostic`]s. They are never fatal: each one is mirrored
//! to `tracing`, kept in a bounded [`DiagnosticLog`], and returned alongside
//! the tick's other events.

use crate::fixed::{Fixed64, Ticks, Volume};
use crate::id::{FluidType, NetworkId, NodeId};

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Why an adjacency edge was left out of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// The far end does not exist.
    MissingNode,
    /// The far end has no network role or a closed valve.
    NotParticipating,
    /// The two ends sit on different pipe layers.
    LayerMismatch,
}

/// A recoverable inconsistency met while rebuilding or resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// An explicit link was ignored.
    EdgeExcluded {
        from: NodeId,
        to: NodeId,
        reason: ExclusionReason,
    },
    /// A computed allocation left the valid range and was clamped.
    CapacityClamped {
        node: NodeId,
        attempted: Volume,
        applied: Volume,
    },
    /// A node offered or held a fluid that conflicts with its network's lock.
    TypeConflict {
        network: NetworkId,
        node: NodeId,
        offered: FluidType,
        locked: FluidType,
    },
    /// A forced inflow exceeded the input's rated maximum.
    InflowOverflow {
        node: NodeId,
        inflow: Volume,
        max_rate: Volume,
    },
    /// An external fill was refused because the tank holds another fluid.
    FillRejected {
        node: NodeId,
        offered: FluidType,
        stored: FluidType,
    },
}

impl Diagnostic {
    /// Mirror this diagnostic to the host's `tracing` subscriber.
    pub fn log(&self, tick: Ticks) {
        match self {
            Diagnostic::EdgeExcluded { from, to, reason } => {
                tracing::debug!(tick, ?from, ?to, ?reason, "adjacency edge excluded");
            }
            Diagnostic::CapacityClamped {
                node,
                attempted,
                applied,
            } => {
                tracing::warn!(tick, ?node, %attempted, %applied, "allocation clamped");
            }
            Diagnostic::TypeConflict {
                network,
                node,
                offered,
                locked,
            } => {
                tracing::warn!(tick, ?network, ?node, ?offered, ?locked, "fluid type conflict");
            }
            Diagnostic::InflowOverflow {
                node,
                inflow,
                max_rate,
            } => {
                tracing::warn!(tick, ?node, %inflow, %max_rate, "forced inflow above rated maximum");
            }
            Diagnostic::FillRejected {
                node,
                offered,
                stored,
            } => {
                tracing::debug!(tick, ?node, ?offered, ?stored, "external fill rejected");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Flow events
// ---------------------------------------------------------------------------

/// An event produced by the network core. All events carry their tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// A network adopted a fluid type.
    TypeLocked {
        network: NetworkId,
        fluid: FluidType,
        tick: Ticks,
    },
    /// A network emptied and released its type.
    TypeReleased { network: NetworkId, tick: Ticks },
    /// Output demand stopped being fully met.
    SupplyLow {
        network: NetworkId,
        satisfaction: Fixed64,
        tick: Ticks,
    },
    /// Output demand is fully met again.
    SupplyRestored { network: NetworkId, tick: Ticks },
    /// A tank reached capacity.
    StorageFull {
        network: NetworkId,
        node: NodeId,
        tick: Ticks,
    },
    /// A tank was drained to zero.
    StorageEmpty {
        network: NetworkId,
        node: NodeId,
        tick: Ticks,
    },
    /// The topology was rebuilt.
    Rebuilt {
        created: usize,
        dissolved: usize,
        tick: Ticks,
    },
    Diagnostic { diagnostic: Diagnostic, tick: Ticks },
}

impl FlowEvent {
    pub fn tick(&self) -> Ticks {
        match self {
            FlowEvent::TypeLocked { tick, .. }
            | FlowEvent::TypeReleased { tick, .. }
            | FlowEvent::SupplyLow { tick, .. }
            | FlowEvent::SupplyRestored { tick, .. }
            | FlowEvent::StorageFull { tick, .. }
            | FlowEvent::StorageEmpty { tick, .. }
            | FlowEvent::Rebuilt { tick, .. }
            | FlowEvent::Diagnostic { tick, .. } => *tick,
        }
    }

    pub fn as_diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            FlowEvent::Diagnostic { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DiagnosticLog: pre-allocated ring buffer
// ---------------------------------------------------------------------------

/// A bounded history of diagnostics. When full, the oldest entries are dropped.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: Vec<Option<(Ticks, Diagnostic)>>,
    /// Write position (wraps around).
    head: usize,
    len: usize,
    /// Total entries ever written (including dropped).
    total_written: u64,
}

impl DiagnosticLog {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    pub fn push(&mut self, tick: Ticks, diagnostic: Diagnostic) {
        let cap = self.capacity();
        self.entries[self.head] = Some((tick, diagnostic));
        self.head = (self.head + 1) % cap;
        if self.len < cap {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Entries dropped because the log was full.
    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &(Ticks, Diagnostic)> {
        let cap = self.capacity();
        let start = if self.len < cap { 0 } else { self.head };
        (0..self.len).filter_map(move |i| self.entries[(start + i) % cap].as_ref())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.entries {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

/// Collects the events of one tick.
#[derive(Debug, Default)]
pub struct EventSink {
    tick: Ticks,
    events: Vec<FlowEvent>,
}

impl EventSink {
    pub fn new(tick: Ticks) -> Self {
        Self {
            tick,
            events: Vec::new(),
        }
    }

    pub fn tick(&self) -> Ticks {
        self.tick
    }

    pub fn push(&mut self, event: FlowEvent) {
        self.events.push(event);
    }

    /// Mirror a diagnostic to `tracing` and queue it as an event.
    pub fn diagnose(&mut self, diagnostic: Diagnostic) {
        diagnostic.log(self.tick);
        self.events.push(FlowEvent::Diagnostic {
            diagnostic,
            tick: self.tick,
        });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take the queued events, recording every diagnostic in `log`.
    pub fn drain_into(&mut self, log: &mut DiagnosticLog) -> Vec<FlowEvent> {
        for event in &self.events {
            if let FlowEvent::Diagnostic { diagnostic, tick } = event {
                log.push(*tick, diagnostic.clone());
            }
        }
        std::mem::take(&mut self.events)
    }
}
