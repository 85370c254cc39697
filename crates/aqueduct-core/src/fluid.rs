//! Fluid type registry: maps fluid names to compact [`FluidType`] ids.

use crate::id::FluidType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registry of known fluid types. Ids are dense and assigned in registration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FluidRegistry {
    names: Vec<String>,
    #[serde(skip)]
    by_name: HashMap<String, FluidType>,
}

impl FluidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fluid by name, returning the existing id if already known.
    pub fn register(&mut self, name: &str) -> FluidType {
        if let Some(id) = self.lookup(name) {
            return id;
        }
        let id = FluidType(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Look up a fluid id by name.
    pub fn lookup(&self, name: &str) -> Option<FluidType> {
        if let Some(id) = self.by_name.get(name) {
            return Some(*id);
        }
        // Index is skipped on deserialize; fall back to a scan.
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| FluidType(i as u32))
    }

    /// The name a fluid was registered under.
    pub fn name(&self, id: FluidType) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate `(id, name)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (FluidType, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (FluidType(i as u32), n.as_str()))
    }
}
