//! Facility templates resolved from data files.

use aqueduct_core::grid::{Footprint, GridPosition};
use aqueduct_core::id::NodeId;
use aqueduct_core::manager::NetworkManager;
use aqueduct_core::node::FacilitySpec;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("unknown facility template '{0}'")]
    UnknownTemplate(String),
}

/// A named facility blueprint: construction parameters minus the position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub spec: FacilitySpec,
    pub footprint: Footprint,
}

impl Template {
    /// Construction parameters for an instance with its top-left corner at `origin`.
    pub fn instantiate(&self, origin: GridPosition) -> FacilitySpec {
        self.spec.clone().placed(origin, self.footprint)
    }
}

/// Facility templates by name, in definition order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    templates: HashMap<String, Template>,
    order: Vec<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template. Returns `false` and leaves the catalog unchanged if
    /// the name is taken.
    pub fn insert(&mut self, name: &str, template: Template) -> bool {
        if self.templates.contains_key(name) {
            return false;
        }
        self.templates.insert(name.to_string(), template);
        self.order.push(name.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Template names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Place an instance of `template` on the map. It joins a network at the
    /// manager's next `advance`.
    pub fn spawn(
        &self,
        manager: &mut NetworkManager,
        template: &str,
        position: GridPosition,
    ) -> Result<NodeId, SpawnError> {
        let found = self
            .get(template)
            .ok_or_else(|| SpawnError::UnknownTemplate(template.to_string()))?;
        Ok(manager.add_facility(found.instantiate(position)))
    }
}
