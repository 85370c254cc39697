//! Flow statistics for the aqueduct network core.
//!
//! Aggregates each tick's [`FlowReport`](aqueduct_core::network::FlowReport)s
//! into rolling per-fluid metrics and keeps a short volume history per tank,
//! using [`Fixed64`] arithmetic throughout.
//!
//! # Usage
//!
//! ```ignore
//! let mut stats = FlowStats::new(StatsConfig::default());
//! manager.advance();
//! stats.observe(&manager);
//! let per_tick = stats.rate(fresh, Metric::Delivered);
//! let per_day = per_period(per_tick, TICKS_PER_DAY);
//! ```

use std::collections::HashMap;

use aqueduct_core::fixed::{Fixed64, Ticks, Volume};
use aqueduct_core::id::{FluidType, NodeId};
use aqueduct_core::manager::NetworkManager;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for flow statistics.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Window size in ticks for rolling averages.
    pub window_size: Ticks,
    /// Number of volume samples retained per tank.
    pub history_capacity: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_size: 60,
            history_capacity: 256,
        }
    }
}

/// Scale a per-tick rate to a longer period, e.g. litres per day.
pub fn per_period(rate: Fixed64, ticks: Ticks) -> Fixed64 {
    rate.saturating_mul_int(i64::try_from(ticks).unwrap_or(i64::MAX))
}

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity ring buffer of [`Fixed64`] samples.
///
/// When full, the oldest entry is overwritten. Iterates oldest-to-newest.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<Fixed64>,
    head: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a ring buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![Fixed64::ZERO; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    /// Push a value, overwriting the oldest entry if at capacity.
    pub fn push(&mut self, value: Fixed64) {
        self.data[self.head] = value;
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The most recently pushed value, if any.
    pub fn latest(&self) -> Option<Fixed64> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.capacity() - 1) % self.capacity();
        Some(self.data[idx])
    }

    /// Iterate values from oldest to newest.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Fixed64> + '_ {
        let start = if self.len < self.capacity() { 0 } else { self.head };
        let cap = self.capacity();
        (0..self.len).map(move |i| self.data[(start + i) % cap])
    }

    /// Collect all stored values (oldest to newest).
    pub fn to_vec(&self) -> Vec<Fixed64> {
        self.iter().collect()
    }

    pub fn clear(&mut self) {
        self.data.fill(Fixed64::ZERO);
        self.head = 0;
        self.len = 0;
    }
}

// ---------------------------------------------------------------------------
// Rolling window
// ---------------------------------------------------------------------------

/// Sum of the most recent `window_size` per-tick samples.
#[derive(Debug, Clone)]
struct RollingWindow {
    samples: RingBuffer,
    total: Volume,
}

impl RollingWindow {
    fn new(window_size: usize) -> Self {
        Self {
            samples: RingBuffer::new(window_size),
            total: Volume::ZERO,
        }
    }

    /// Record one tick's sample, evicting the oldest when the window is full.
    fn record(&mut self, value: Volume) {
        if self.samples.len() == self.samples.capacity() {
            let evicted = self.samples.iter().next().unwrap_or(Volume::ZERO);
            self.total = self.total.saturating_sub(evicted);
        }
        self.samples.push(value);
        self.total = self.total.saturating_add(value);
    }

    fn total(&self) -> Volume {
        self.total
    }

    /// Average per tick over the ticks recorded so far.
    fn rate(&self) -> Fixed64 {
        match self.samples.len() {
            0 => Fixed64::ZERO,
            n => self.total / Fixed64::from_num(n),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-fluid statistics
// ---------------------------------------------------------------------------

/// A per-fluid quantity tracked over the rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Volume supplied by inputs.
    Supply,
    /// Volume handed to outputs.
    Delivered,
    /// Supply nobody could take.
    Discarded,
}

#[derive(Debug, Clone)]
struct FluidStats {
    supply: RollingWindow,
    delivered: RollingWindow,
    discarded: RollingWindow,
}

impl FluidStats {
    fn new(window_size: usize) -> Self {
        Self {
            supply: RollingWindow::new(window_size),
            delivered: RollingWindow::new(window_size),
            discarded: RollingWindow::new(window_size),
        }
    }

    fn window(&self, metric: Metric) -> &RollingWindow {
        match metric {
            Metric::Supply => &self.supply,
            Metric::Delivered => &self.delivered,
            Metric::Discarded => &self.discarded,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TickTotals {
    supply: Volume,
    delivered: Volume,
    discarded: Volume,
}

// ---------------------------------------------------------------------------
// FlowStats
// ---------------------------------------------------------------------------

/// Rolling flow statistics fed from a [`NetworkManager`] once per tick.
#[derive(Debug, Clone)]
pub struct FlowStats {
    config: StatsConfig,
    fluids: HashMap<FluidType, FluidStats>,
    tanks: HashMap<NodeId, RingBuffer>,
    last_observed: Option<Ticks>,
}

impl FlowStats {
    pub fn new(config: StatsConfig) -> Self {
        Self {
            config,
            fluids: HashMap::new(),
            tanks: HashMap::new(),
            last_observed: None,
        }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// The manager tick of the last observation.
    pub fn last_observed(&self) -> Option<Ticks> {
        self.last_observed
    }

    /// Record the tick the manager just completed. Call once after each
    /// `advance`; repeated calls for the same tick are ignored.
    pub fn observe(&mut self, manager: &NetworkManager) {
        let tick = manager.tick();
        if self.last_observed == Some(tick) {
            return;
        }
        self.last_observed = Some(tick);

        let mut totals: HashMap<FluidType, TickTotals> = HashMap::new();
        for network in manager.networks() {
            let Some(fluid) = network.fluid_type else { continue };
            if network.last_resolved != Some(tick) {
                continue;
            }
            let report = &network.last_report;
            let entry = totals.entry(fluid).or_default();
            entry.supply = entry.supply.saturating_add(report.supply);
            entry.delivered = entry.delivered.saturating_add(report.delivered);
            entry.discarded = entry.discarded.saturating_add(report.discarded);
        }

        // Every known fluid gets a sample so idle fluids decay toward zero.
        let window = usize::try_from(self.config.window_size).unwrap_or(usize::MAX);
        for fluid in totals.keys() {
            self.fluids
                .entry(*fluid)
                .or_insert_with(|| FluidStats::new(window));
        }
        for (fluid, stats) in &mut self.fluids {
            let t = totals.get(fluid).copied().unwrap_or_default();
            stats.supply.record(t.supply);
            stats.delivered.record(t.delivered);
            stats.discarded.record(t.discarded);
        }

        let cap = self.config.history_capacity;
        self.tanks.retain(|node, _| manager.facility(*node).is_some_and(|f| f.tank.is_some()));
        for (node, facility) in manager.facilities() {
            if let Some(tank) = &facility.tank {
                self.tanks
                    .entry(node)
                    .or_insert_with(|| RingBuffer::new(cap))
                    .push(tank.volume());
            }
        }
    }

    /// Rolling average per tick of `metric` for `fluid`.
    pub fn rate(&self, fluid: FluidType, metric: Metric) -> Fixed64 {
        self.fluids
            .get(&fluid)
            .map_or(Fixed64::ZERO, |s| s.window(metric).rate())
    }

    /// Sum of `metric` for `fluid` over the window.
    pub fn window_total(&self, fluid: FluidType, metric: Metric) -> Volume {
        self.fluids
            .get(&fluid)
            .map_or(Volume::ZERO, |s| s.window(metric).total())
    }

    /// Stored volume samples for a tank, oldest first.
    pub fn tank_history(&self, node: NodeId) -> Vec<Volume> {
        self.tanks.get(&node).map(RingBuffer::to_vec).unwrap_or_default()
    }

    pub fn latest_volume(&self, node: NodeId) -> Option<Volume> {
        self.tanks.get(&node).and_then(RingBuffer::latest)
    }

    pub fn tracked_fluid_count(&self) -> usize {
        self.fluids.len()
    }

    pub fn tracked_tank_count(&self) -> usize {
        self.tanks.len()
    }

    pub fn clear(&mut self) {
        self.fluids.clear();
        self.tanks.clear();
        self.last_observed = None;
    }
}
