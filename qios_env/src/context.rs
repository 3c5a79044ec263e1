//! Core environment context trait for QIOS services.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the QIOS engines can run
/// in both production (tokio) and simulation (virtual clock) environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - a manually advanced virtual clock
///
/// # Determinism
///
/// The orchestrator never reads the wall clock directly. Every delay and
/// every activity timestamp goes through the context, so a simulated run
/// is reproducible down to the millisecond.
#[async_trait]
pub trait QiosContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for the trust engine's activity windows.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    ///
    /// The name is attached to the task's tracing span.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
