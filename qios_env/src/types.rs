//! Common types for the QIOS environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a live connection (node or observer).
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnId(pub Uuid);

impl ConnId {
    /// Creates a new random ConnId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic ConnId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.wrapping_mul(0x9e3779b97f4a7c15).to_be_bytes());
        bytes[8..16].copy_from_slice(&seed.to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Returns the truncated form used in telemetry lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", self.short())
    }
}
