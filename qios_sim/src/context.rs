//! Simulation context implementing QiosContext for deterministic testing.

use async_trait::async_trait;
use qios_env::QiosContext;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::Instrument;

/// Simulation context backed by a virtual clock.
///
/// - `now` reads the virtual clock, starting at zero
/// - `sleep` advances the clock instantly, then yields once so other
///   simulated tasks observe the new time
/// - `spawn` runs on the ambient tokio runtime
///
/// Clones share the same clock.
#[derive(Clone)]
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    fn clock(&self) -> MutexGuard<'_, u64> {
        self.virtual_time_ns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        *self.clock() += duration.as_nanos() as u64;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.clock()
    }

    /// Returns the current virtual time in whole milliseconds.
    pub fn time_ms(&self) -> u64 {
        self.time_ns() / 1_000_000
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[async_trait]
impl QiosContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("sim_task", name = %name);
        tokio::spawn(future.instrument(span));
    }
}
