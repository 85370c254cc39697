use crate::grid::Adjacency;
use serde::{Deserialize, Serialize};

/// Tunables for a [`NetworkManager`](crate::manager::NetworkManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Which cells count as touching for spatial adjacency.
    pub adjacency: Adjacency,
    /// How many diagnostics the manager keeps before dropping the oldest.
    pub diagnostic_capacity: usize,
    /// Log discarded surplus at `debug` level every tick it happens.
    pub log_surplus: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            adjacency: Adjacency::Orthogonal,
            diagnostic_capacity: 256,
            log_surplus: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_orthogonal() {
        let config = NetworkConfig::default();
        assert_eq!(config.adjacency, Adjacency::Orthogonal);
        assert!(config.diagnostic_capacity > 0);
        assert!(!config.log_surplus);
    }

    #[test]
    fn survives_binary_round_trip() {
        let bytes = bitcode::serialize(&NetworkConfig {
            adjacency: Adjacency::Moore,
            ..NetworkConfig::default()
        })
        .unwrap();
        let config: NetworkConfig = bitcode::deserialize(&bytes).unwrap();
        assert_eq!(config.adjacency, Adjacency::Moore);
        assert_eq!(config.diagnostic_capacity, 256);
    }
}
