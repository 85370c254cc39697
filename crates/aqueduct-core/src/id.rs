use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a facility node. Never reused while the node is alive.
    pub struct NodeId;
}

/// Identifies a fluid network. Assigned at rebuild time, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

/// Identifies a fluid type in the [`FluidRegistry`](crate::fluid::FluidRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FluidType(pub u32);

/// A pipe layer. Pipes on different layers may share cells without joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PipeLayer(pub u8);
