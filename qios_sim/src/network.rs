//! Simulated connections.
//!
//! A `SimClient` stands in for the outbound half of a WebSocket: it records
//! every message the service sends to it so scenarios can assert on them.

use qios_core::{CommandOp, Outbound, Severity};
use qios_env::{ConnId, ConnectionSink, EnvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// One dispatched command, as seen by the receiving node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCommand {
    pub opcode: CommandOp,
    pub target: String,
    pub partner: Option<ConnId>,
    pub bit: Option<String>,
}

/// Recording client. Clones share the same inbox.
#[derive(Clone, Default)]
pub struct SimClient {
    inbox: Arc<Mutex<Vec<Outbound>>>,
    closed: Arc<AtomicBool>,
}

impl SimClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn inbox(&self) -> MutexGuard<'_, Vec<Outbound>> {
        self.inbox.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Simulates the transport going away; further deliveries fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Everything received so far.
    pub fn messages(&self) -> Vec<Outbound> {
        self.inbox().clone()
    }

    pub fn commands(&self) -> Vec<ReceivedCommand> {
        self.inbox()
            .iter()
            .filter_map(|m| match m {
                Outbound::Command {
                    opcode,
                    target,
                    partner,
                    bit,
                    ..
                } => Some(ReceivedCommand {
                    opcode: *opcode,
                    target: target.clone(),
                    partner: *partner,
                    bit: bit.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn trust_updates(&self) -> Vec<f64> {
        self.inbox()
            .iter()
            .filter_map(|m| match m {
                Outbound::TrustUpdate { score } => Some(*score),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<(Severity, String)> {
        self.inbox()
            .iter()
            .filter_map(|m| match m {
                Outbound::Log { severity, text } => Some((*severity, text.clone())),
                _ => None,
            })
            .collect()
    }

    /// Most recent telemetry frame, if any.
    pub fn last_telemetry(&self) -> Option<Outbound> {
        self.inbox()
            .iter()
            .rev()
            .find(|m| matches!(m, Outbound::Telemetry { .. }))
            .cloned()
    }
}

impl ConnectionSink<Outbound> for SimClient {
    fn deliver(&self, message: Outbound) -> Result<(), EnvError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EnvError::Closed);
        }
        self.inbox().push(message);
        Ok(())
    }
}
