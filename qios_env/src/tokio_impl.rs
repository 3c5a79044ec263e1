//! Production implementation of QiosContext using Tokio.

use crate::QiosContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Production context backed by Tokio.
///
/// Time is measured from the moment the context was created. Because
/// `tokio::time::Instant` is used, a paused test runtime drives it too.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: tokio::time::Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QiosContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("task", name = %name);
        tokio::spawn(future.instrument(span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_tokio_context_spawn_runs_task() {
        let ctx = TokioContext::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        ctx.spawn("probe", async move {
            let _ = tx.send(7u8);
        });

        assert_eq!(rx.await.unwrap(), 7);
    }
}
