//! Error types for the QIOS core.

use qios_env::ConnId;
use thiserror::Error;

/// Registry lookups that have no live connection behind them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Connection not found: {0}")]
    NotFound(ConnId),
}

/// Failures at the coordinator's inbound boundary.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Malformed frame from {conn}: {source}")]
    MalformedFrame {
        conn: ConnId,
        #[source]
        source: serde_json::Error,
    },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
