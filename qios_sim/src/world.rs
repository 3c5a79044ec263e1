//! SimWorld - the simulation harness container.
//!
//! Wires a [`Coordinator`] onto the virtual clock and attaches recording
//! clients in place of real sockets.

use crate::context::SimContext;
use crate::network::SimClient;

use qios_core::{
    Coordinator, CoordinatorError, Inbound, QiosConfig, RegistryError, Role, RunOutcome,
    TelemetrySnapshot,
};
use qios_env::{ConnId, QiosContext};
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed; connection identifiers derive from it
    pub seed: u64,

    /// Service configuration under test
    pub service: QiosConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            service: QiosConfig::default(),
        }
    }
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    coordinator: Coordinator<SimContext>,

    /// Every client ever attached, by identifier
    clients: HashMap<ConnId, SimClient>,

    next_conn: u64,
}

impl SimWorld {
    pub fn new(config: SimConfig) -> Self {
        let context = SimContext::shared(config.seed);
        let coordinator = Coordinator::new(context.clone(), config.service.clone());
        Self {
            config,
            context,
            coordinator,
            clients: HashMap::new(),
            next_conn: 0,
        }
    }

    pub fn coordinator(&self) -> &Coordinator<SimContext> {
        &self.coordinator
    }

    /// Opens a connection without registering it.
    pub fn connect(&mut self) -> ConnId {
        let id = ConnId::from_seed(self.config.seed.wrapping_mul(1_000).wrapping_add(self.next_conn));
        self.next_conn += 1;

        let client = SimClient::new();
        self.coordinator.on_connect(id, client.clone());
        self.clients.insert(id, client);
        id
    }

    /// Connects and registers `count` nodes, in order.
    pub fn spawn_nodes(&mut self, count: usize) -> Vec<ConnId> {
        (0..count)
            .map(|_| {
                let id = self.connect();
                self.coordinator.handle(id, Inbound::RegisterNode);
                id
            })
            .collect()
    }

    pub fn spawn_observer(&mut self) -> ConnId {
        let id = self.connect();
        self.coordinator.handle(id, Inbound::RegisterObserver);
        id
    }

    pub fn client(&self, id: ConnId) -> Option<&SimClient> {
        self.clients.get(&id)
    }

    /// Feeds a raw text frame, exactly as the gateway would.
    pub fn send_frame(&self, id: ConnId, text: &str) -> Result<(), CoordinatorError> {
        self.coordinator.handle_frame(id, text)
    }

    /// Submits a program and waits for its run to finish.
    pub async fn submit(&self, id: ConnId, code: &str) -> RunOutcome {
        self.coordinator.run_program(id, code).await
    }

    /// Drops a connection: its client stops accepting and the service forgets it.
    pub fn disconnect(&mut self, id: ConnId) -> Result<Option<Role>, RegistryError> {
        if let Some(client) = self.clients.get(&id) {
            client.close();
        }
        self.coordinator.on_disconnect(id)
    }

    pub fn set_score(&self, id: ConnId, score: f64) {
        self.coordinator.trust().with(|t| {
            if let Some(current) = t.score(id) {
                t.adjust(id, score - current, "scenario setup");
            }
        });
    }

    pub fn score(&self, id: ConnId) -> Option<f64> {
        self.coordinator.trust().with(|t| t.score(id))
    }

    /// One telemetry snapshot tick (regeneration + observer broadcast).
    pub fn tick_telemetry(&self) -> TelemetrySnapshot {
        self.coordinator.telemetry().tick()
    }

    /// Commands received across every client.
    pub fn command_count(&self) -> usize {
        self.clients.values().map(|c| c.commands().len()).sum()
    }

    pub fn now_ms(&self) -> u64 {
        self.context.now().as_millis() as u64
    }
}
