//! Grid primitives used for spatial adjacency between facilities.

use serde::{Deserialize, Serialize};

/// A position on the 2D map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Shifted position, saturating at the edges of the grid.
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

/// Largest footprint side, in cells.
pub const MAX_FOOTPRINT_SIDE: u32 = 64;

/// The footprint (size) of a facility on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    pub width: u32,
    pub height: u32,
}

impl Footprint {
    /// A 1x1 facility.
    pub fn single() -> Self {
        Self {
            width: 1,
            height: 1,
        }
    }

    /// Sides are clamped into `1..=MAX_FOOTPRINT_SIDE`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.clamp(1, MAX_FOOTPRINT_SIDE),
            height: height.clamp(1, MAX_FOOTPRINT_SIDE),
        }
    }

    /// Iterate over all tiles occupied by this footprint at the given origin.
    /// Origin is the top-left corner. Tiles past the edge of the grid are
    /// skipped.
    pub fn tiles(&self, origin: GridPosition) -> impl Iterator<Item = GridPosition> + use<> {
        let w = self.width.clamp(1, MAX_FOOTPRINT_SIDE) as i32;
        let h = self.height.clamp(1, MAX_FOOTPRINT_SIDE) as i32;
        let ox = origin.x;
        let oy = origin.y;
        (0..h).flat_map(move |dy| {
            (0..w).filter_map(move |dx| {
                Some(GridPosition::new(ox.checked_add(dx)?, oy.checked_add(dy)?))
            })
        })
    }
}

/// Which neighbouring cells count as touching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Adjacency {
    /// Shared cell or one of the four orthogonal neighbours.
    #[default]
    Orthogonal,
    /// Shared cell or any of the eight surrounding cells.
    Moore,
}

const ORTHOGONAL: [(i32, i32); 5] = [(0, 0), (0, -1), (1, 0), (0, 1), (-1, 0)];
const MOORE: [(i32, i32); 9] = [
    (0, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

impl Adjacency {
    /// Offsets (including the cell itself) that count as touching.
    pub fn offsets(self) -> &'static [(i32, i32)] {
        match self {
            Adjacency::Orthogonal => &ORTHOGONAL,
            Adjacency::Moore => &MOORE,
        }
    }

    /// Whether two cells touch under this rule.
    pub fn touches(self, a: GridPosition, b: GridPosition) -> bool {
        let dx = a.x.abs_diff(b.x);
        let dy = a.y.abs_diff(b.y);
        match self {
            Adjacency::Orthogonal => dx.saturating_add(dy) <= 1,
            Adjacency::Moore => dx <= 1 && dy <= 1,
        }
    }
}
