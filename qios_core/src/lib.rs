//! QIOS Core - coordination service for a network of simulated quantum nodes.
//!
//! Nodes and observers connect over a persistent channel. A node submits a
//! program in a tiny line-oriented language; the service parses it, places
//! each declared particle on a registered node, and dispatches per-node
//! commands with simulated propagation delays. Every node carries a trust
//! score that gates entanglement, punishes measurement spam and slowly
//! regenerates.
//!
//! All time-dependent logic runs through [`qios_env::QiosContext`], so the
//! same engines run on tokio in production and on a virtual clock in
//! simulation.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod protocol;
pub mod registry;
pub mod roadmap;
pub mod scheduler;
pub mod telemetry;
pub mod trust;

pub use config::{DispatchConfig, QiosConfig, TelemetryConfig, TrustConfig};
pub use coordinator::Coordinator;
pub use error::{ConfigError, CoordinatorError, RegistryError};
pub use orchestrator::{Orchestrator, RunOutcome, RunReport, RunState};
pub use parser::{parse_program, Instruction, Opcode, Program};
pub use protocol::{CommandOp, Inbound, Outbound, Role, RunId, Severity};
pub use registry::ConnectionRegistry;
pub use roadmap::{default_roadmap, PhaseStatus, RoadmapPhase};
pub use scheduler::{Particle, Placement};
pub use telemetry::{TelemetryBroadcaster, TelemetrySnapshot};
pub use trust::{SharedTrust, TrustAdjustment, TrustEngine, TrustRecord};
