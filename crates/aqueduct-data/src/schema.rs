//! Serde data file structs for fluid, facility, and layout definitions.
//!
//! These structs define the on-disk format. They are deserialized from RON,
//! JSON, or TOML files and then resolved into core types by the loader.

use serde::Deserialize;

// ===========================================================================
// Fluids
// ===========================================================================

/// A fluid type definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct FluidData {
    pub name: String,
}

// ===========================================================================
// Facilities
// ===========================================================================

/// A facility template definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct FacilityData {
    pub name: String,
    #[serde(default)]
    pub input: Option<InputData>,
    #[serde(default)]
    pub output: Option<OutputData>,
    #[serde(default)]
    pub tank: Option<TankData>,
    /// Plain pipe segment with no other role.
    #[serde(default)]
    pub conduit: bool,
    #[serde(default = "default_footprint")]
    pub footprint: FootprintData,
    #[serde(default)]
    pub layer: Option<u8>,
    #[serde(default)]
    pub status: StatusData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputData {
    pub max_rate: f64,
    /// Fluid names this input may supply. Empty accepts any fluid.
    #[serde(default)]
    pub accepts: Vec<String>,
    #[serde(default)]
    pub policy: PolicyData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputData {
    pub rate: f64,
    #[serde(default)]
    pub accepts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TankData {
    pub capacity: f64,
}

/// How an input behaves when its local tank is full.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyData {
    #[default]
    Demand,
    Constant,
}

/// The footprint (size) of a facility on the grid.
#[derive(Debug, Clone, Deserialize)]
pub struct FootprintData {
    pub width: u32,
    pub height: u32,
}

fn default_footprint() -> FootprintData {
    FootprintData {
        width: 1,
        height: 1,
    }
}

/// Static status flags a template starts with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub needs_power: bool,
    #[serde(default)]
    pub switchable: bool,
}

// ===========================================================================
// Layout
// ===========================================================================

/// Facilities placed on a map and the explicit links between them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayoutData {
    #[serde(default)]
    pub placements: Vec<PlacementData>,
    #[serde(default)]
    pub links: Vec<LinkData>,
}

/// One template instance on the grid.
#[derive(Debug, Clone, Deserialize)]
pub struct PlacementData {
    /// Label used by `links`. Unlabelled placements cannot be linked.
    #[serde(default)]
    pub id: Option<String>,
    pub template: String,
    pub x: i32,
    pub y: i32,
    /// Initial tank contents.
    #[serde(default)]
    pub contents: Option<FluidAmount>,
    /// Initial inflow offered to the input.
    #[serde(default)]
    pub inflow: Option<FluidAmount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FluidAmount {
    pub fluid: String,
    pub volume: f64,
}

/// An explicit pipe link between two labelled placements.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkData {
    pub from: String,
    pub to: String,
}
