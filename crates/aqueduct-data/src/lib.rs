//! Data-driven facility catalog for the aqueduct network core.
//!
//! A map directory holds `fluids`, `facilities`, and optionally `network` and
//! `layout` files in RON, TOML, or JSON. [`load_map`] reads them into a
//! [`Catalog`] of facility templates and a populated `NetworkManager`.

pub mod catalog;
pub mod loader;
pub mod schema;

pub use catalog::{Catalog, SpawnError, Template};
pub use loader::{DataLoadError, load_catalog, load_map};
