//! Outbound delivery abstraction for QIOS connections.

use crate::error::EnvError;
use tokio::sync::mpsc;

/// The write half of one live connection.
///
/// # Implementations
///
/// - **Production**: an unbounded channel drained by the socket writer task
/// - **Simulation**: a recording client that keeps every delivered message
///
/// # Delivery
///
/// `deliver` never blocks. `Ok(())` means the message was queued; the
/// transport may still lose it if the peer disappears afterwards.
pub trait ConnectionSink<M>: Send + Sync + 'static {
    /// Queues a message for the peer.
    ///
    /// # Returns
    /// * `Ok(())` - Message queued for delivery
    /// * `Err(EnvError::Closed)` - The peer's channel is gone
    fn deliver(&self, message: M) -> Result<(), EnvError>;
}

impl<M: Send + 'static> ConnectionSink<M> for mpsc::UnboundedSender<M> {
    fn deliver(&self, message: M) -> Result<(), EnvError> {
        self.send(message).map_err(|_| EnvError::Closed)
    }
}
