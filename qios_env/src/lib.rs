//! QIOS Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the QIOS engines
//! to run in both **Production** (tokio) and **Simulation** (virtual clock)
//! environments.
//!
//! # Core Concept: The Reactor Pattern
//!
//! Everything the orchestrator needs from the outside world is intercepted:
//! - Time (`now()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - Outbound delivery (`ConnectionSink::deliver()`)
//!
//! # Example
//!
//! ```ignore
//! use qios_env::{QiosContext, TokioContext};
//!
//! async fn pace<Ctx: QiosContext>(ctx: &Ctx) {
//!     for step in 0..3 {
//!         dispatch(step);
//!         ctx.sleep(Duration::from_millis(200)).await;
//!     }
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod tokio_impl;

pub use context::QiosContext;
pub use network::ConnectionSink;
pub use types::ConnId;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
