//! Storage ledger: per-tank bookkeeping of stored volume, type, and capacity.
//!
//! A [`Tank`] upholds two invariants at all times:
//!
//! - `0 <= volume <= capacity`
//! - `fluid.is_none()` if and only if `volume == 0`
//!
//! All mutations clamp instead of failing, except a fill with a fluid that
//! conflicts with the tank's locked type, which is rejected outright.

use crate::fixed::{Volume, clamp_volume, ratio};
use crate::id::{FluidType, NodeId};
use serde::{Deserialize, Serialize};

/// Errors raised by storage ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),
    #[error("node {0:?} has no storage")]
    NotStorage(NodeId),
    #[error("tank holds {stored:?}, refusing {offered:?}")]
    TypeLocked {
        stored: FluidType,
        offered: FluidType,
    },
}

/// A storage tank's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tank {
    capacity: Volume,
    volume: Volume,
    fluid: Option<FluidType>,
}

impl Tank {
    /// An empty tank. Negative capacities are treated as zero.
    pub fn new(capacity: Volume) -> Self {
        Self {
            capacity: capacity.max(Volume::ZERO),
            volume: Volume::ZERO,
            fluid: None,
        }
    }

    /// A tank pre-filled with `volume` of `fluid` (clamped to capacity).
    pub fn with_contents(capacity: Volume, volume: Volume, fluid: FluidType) -> Self {
        let mut tank = Self::new(capacity);
        tank.volume = clamp_volume(volume, Volume::ZERO, tank.capacity);
        tank.fluid = (tank.volume > Volume::ZERO).then_some(fluid);
        tank
    }

    pub fn capacity(&self) -> Volume {
        self.capacity
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    /// The stored fluid type, `None` when empty.
    pub fn fluid(&self) -> Option<FluidType> {
        self.fluid
    }

    /// Free capacity: `capacity - volume`.
    pub fn amount_can_accept(&self) -> Volume {
        (self.capacity - self.volume).max(Volume::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.volume <= Volume::ZERO
    }

    pub fn is_full(&self) -> bool {
        self.capacity > Volume::ZERO && self.volume >= self.capacity
    }

    /// Stored volume as a fraction of capacity, in `[0, 1]`.
    pub fn fill_fraction(&self) -> Volume {
        ratio(self.volume, self.capacity)
    }

    /// Whether `amount` can be drawn in full.
    pub fn can_draw(&self, amount: Volume) -> bool {
        !self.is_empty() && self.volume >= amount
    }

    /// Whether `fluid` may enter this tank without breaking the type lock.
    pub fn accepts(&self, fluid: FluidType) -> bool {
        self.fluid.is_none_or(|stored| stored == fluid)
    }

    /// Remove up to `amount`. Returns the amount actually removed (never negative).
    pub fn draw(&mut self, amount: Volume) -> Volume {
        let taken = clamp_volume(amount, Volume::ZERO, self.volume);
        self.volume -= taken;
        self.settle();
        taken
    }

    /// Add up to `amount` of `fluid`, discarding anything beyond free capacity.
    ///
    /// Returns the amount accepted, or [`LedgerError::TypeLocked`] without
    /// touching the tank when `fluid` conflicts with the stored type.
    pub fn fill(&mut self, amount: Volume, fluid: FluidType) -> Result<Volume, LedgerError> {
        if let Some(stored) = self.fluid {
            if stored != fluid && !self.is_empty() {
                return Err(LedgerError::TypeLocked {
                    stored,
                    offered: fluid,
                });
            }
        }
        let accepted = clamp_volume(amount, Volume::ZERO, self.amount_can_accept());
        if accepted > Volume::ZERO {
            self.volume += accepted;
            self.fluid = Some(fluid);
        }
        Ok(accepted)
    }

    /// Overwrite contents directly, clamping into the valid range.
    ///
    /// Returns `true` if clamping changed the requested volume.
    pub fn set_contents(&mut self, volume: Volume, fluid: Option<FluidType>) -> bool {
        let clamped = clamp_volume(volume, Volume::ZERO, self.capacity);
        self.volume = clamped;
        self.fluid = fluid;
        if self.fluid.is_none() && self.volume > Volume::ZERO {
            // Volume without a type cannot be attributed; drop it.
            self.volume = Volume::ZERO;
            return true;
        }
        self.settle();
        clamped != volume
    }

    /// Change capacity, spilling anything above the new capacity. Returns the spill.
    pub fn set_capacity(&mut self, capacity: Volume) -> Volume {
        self.capacity = capacity.max(Volume::ZERO);
        let spill = (self.volume - self.capacity).max(Volume::ZERO);
        self.volume -= spill;
        self.settle();
        spill
    }

    fn settle(&mut self) {
        if self.volume <= Volume::ZERO {
            self.volume = Volume::ZERO;
            self.fluid = None;
        }
    }
}
