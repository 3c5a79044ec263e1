//! QIOS Deterministic Simulation Testing (DST) Harness
//!
//! Runs the coordination service on a virtual clock with recording clients
//! in place of sockets, so dispatch order, propagation delays and trust
//! arithmetic can be asserted exactly.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   SimWorld                   │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ SimContext (virtual clock)             │  │
//! │  └────────────────────────────────────────┘  │
//! │                      │                       │
//! │  ┌───────────────────▼────────────────────┐  │
//! │  │ Coordinator                            │  │
//! │  │  registry · trust · orchestrator ·     │  │
//! │  │  telemetry                             │  │
//! │  └───────────────────┬────────────────────┘  │
//! │          ┌───────────┼───────────┐           │
//! │     ┌────▼────┐ ┌────▼────┐ ┌────▼─────┐     │
//! │     │SimClient│ │SimClient│ │SimClient │     │
//! │     │ node #1 │ │ node #2 │ │ observer │     │
//! │     └─────────┘ └─────────┘ └──────────┘     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use qios_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::EndToEnd).await;
//! assert!(result.passed);
//! ```

mod context;
mod network;
mod runner;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use network::{ReceivedCommand, SimClient};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimWorld};
