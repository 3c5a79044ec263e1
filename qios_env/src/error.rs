//! Error types for the QIOS environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The peer's outbound channel has been closed
    #[error("Connection closed")]
    Closed,
}
