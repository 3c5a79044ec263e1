//! Coordinator - routes connection events to the engines.
//!
//! The transport layer (WebSocket gateway, simulation world) only ever talks
//! to this type: `on_connect` at handshake, `handle`/`handle_frame` for each
//! inbound message, `on_disconnect` when the transport reports the peer gone.

use crate::config::QiosConfig;
use crate::error::{CoordinatorError, RegistryError};
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::protocol::{Inbound, Outbound, Role};
use crate::registry::ConnectionRegistry;
use crate::telemetry::TelemetryBroadcaster;
use crate::trust::{SharedTrust, TrustEngine};
use qios_env::{ConnId, ConnectionSink, QiosContext};

use std::sync::Arc;
use tracing::{debug, info};

pub const WELCOME: &str = "Welcome to the QIOS Back Office!";

pub struct Coordinator<Ctx>
where
    Ctx: QiosContext,
{
    context: Arc<Ctx>,
    registry: Arc<ConnectionRegistry>,
    trust: SharedTrust,
    orchestrator: Arc<Orchestrator<Ctx>>,
    telemetry: Arc<TelemetryBroadcaster<Ctx>>,
}

impl<Ctx> Coordinator<Ctx>
where
    Ctx: QiosContext,
{
    /// Wires a fresh registry, trust table, orchestrator and telemetry.
    pub fn new(context: Arc<Ctx>, config: QiosConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let trust = SharedTrust::new(TrustEngine::new(config.trust));
        let orchestrator = Arc::new(Orchestrator::new(
            context.clone(),
            registry.clone(),
            trust.clone(),
            config.dispatch,
        ));
        let telemetry = Arc::new(TelemetryBroadcaster::new(
            context.clone(),
            registry.clone(),
            trust.clone(),
            config.telemetry,
        ));

        Self {
            context,
            registry,
            trust,
            orchestrator,
            telemetry,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn trust(&self) -> &SharedTrust {
        &self.trust
    }

    pub fn telemetry(&self) -> &Arc<TelemetryBroadcaster<Ctx>> {
        &self.telemetry
    }

    /// Handshake: attach the connection and greet it.
    pub fn on_connect(&self, conn: ConnId, sink: impl ConnectionSink<Outbound>) {
        self.registry.connect(conn, sink);
        self.registry.send_to(conn, Outbound::info(WELCOME));
        info!(conn = %conn, "connected");
    }

    /// Transport reported the peer gone. Returns the role it held.
    pub fn on_disconnect(&self, conn: ConnId) -> Result<Option<Role>, RegistryError> {
        let role = self.registry.unregister(conn)?;
        if role == Some(Role::Node) {
            self.trust.with(|t| t.on_disconnect(conn));
        }
        info!(conn = %conn, ?role, "disconnected");
        Ok(role)
    }

    /// Decodes and handles one text frame.
    pub fn handle_frame(&self, conn: ConnId, text: &str) -> Result<(), CoordinatorError> {
        let inbound = Inbound::from_json(text)
            .map_err(|source| CoordinatorError::MalformedFrame { conn, source })?;
        self.handle(conn, inbound);
        Ok(())
    }

    /// Handles one inbound message. Program runs are spawned on the context
    /// so the connection's reader is never blocked by dispatch delays.
    pub fn handle(&self, conn: ConnId, inbound: Inbound) {
        match inbound {
            Inbound::RegisterObserver => {
                if self.registry.register(conn, Role::Observer) {
                    info!(conn = %conn, "observer registered");
                    self.registry.send_to(conn, self.telemetry.snapshot().into());
                }
            }
            Inbound::RegisterNode => {
                if self.registry.register(conn, Role::Node) {
                    let score = self.trust.with(|t| {
                        t.on_connect(conn);
                        t.score(conn)
                    });
                    info!(conn = %conn, "node registered");
                    if let Some(score) = score {
                        self.registry.send_to(conn, Outbound::TrustUpdate { score });
                    }
                }
            }
            Inbound::SubmitProgram { code } => {
                let orchestrator = self.orchestrator.clone();
                self.context.spawn("orchestration-run", async move {
                    orchestrator.submit(conn, &code).await;
                });
            }
            Inbound::HeartbeatAck => {
                debug!(conn = %conn, "heartbeat ack");
            }
        }
    }

    /// Runs a program inline and returns its outcome.
    pub async fn run_program(&self, conn: ConnId, code: &str) -> RunOutcome {
        self.orchestrator.submit(conn, code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qios_env::TokioContext;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn coordinator() -> Coordinator<TokioContext> {
        Coordinator::new(TokioContext::shared(), QiosConfig::default())
    }

    fn join(c: &Coordinator<TokioContext>, seed: u64) -> (ConnId, mpsc::UnboundedReceiver<Outbound>) {
        let id = ConnId::from_seed(seed);
        let (tx, rx) = mpsc::unbounded_channel();
        c.on_connect(id, tx);
        (id, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    #[test]
    fn test_handshake_sends_welcome() {
        let c = coordinator();
        let (_id, mut rx) = join(&c, 1);
        assert_eq!(drain(&mut rx), vec![Outbound::info(WELCOME)]);
    }

    #[test]
    fn test_register_node_initialises_trust() {
        let c = coordinator();
        let (id, mut rx) = join(&c, 1);
        drain(&mut rx);

        c.handle_frame(id, r#"{"type":"register-node"}"#).unwrap();
        c.handle_frame(id, r#"{"type":"register-node"}"#).unwrap();

        assert_eq!(c.trust().with(|t| t.score(id)), Some(100.0));
        assert_eq!(drain(&mut rx), vec![Outbound::TrustUpdate { score: 100.0 }]);
        assert_eq!(c.registry().count(Role::Node), 1);
    }

    #[test]
    fn test_register_observer_gets_snapshot() {
        let c = coordinator();
        let (node, _node_rx) = join(&c, 1);
        c.handle(node, Inbound::RegisterNode);
        let (obs, mut rx) = join(&c, 2);
        drain(&mut rx);

        c.handle(obs, Inbound::RegisterObserver);

        match drain(&mut rx).as_slice() {
            [Outbound::Telemetry { node_count, trust_table, .. }] => {
                assert_eq!(*node_count, 1);
                assert!(trust_table.contains_key(&node));
            }
            other => panic!("unexpected frames {other:?}"),
        }
    }

    #[test]
    fn test_disconnect_drops_trust_record() {
        let c = coordinator();
        let (id, _rx) = join(&c, 1);
        c.handle(id, Inbound::RegisterNode);

        assert_eq!(c.on_disconnect(id), Ok(Some(Role::Node)));
        assert!(c.trust().with(|t| t.score(id)).is_none());
        assert_eq!(c.on_disconnect(id), Err(RegistryError::NotFound(id)));
    }

    #[test]
    fn test_malformed_frame_is_reported() {
        let c = coordinator();
        let (id, _rx) = join(&c, 1);
        let err = c.handle_frame(id, "not json").unwrap_err();
        assert!(matches!(err, CoordinatorError::MalformedFrame { conn, .. } if conn == id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submitted_program_runs_in_background() {
        let c = coordinator();
        let (id, mut rx) = join(&c, 1);
        c.handle(id, Inbound::RegisterNode);
        drain(&mut rx);

        c.handle(
            id,
            Inbound::SubmitProgram {
                code: "particle q;\nx q;".into(),
            },
        );
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        let commands = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, Outbound::Command { .. }))
            .count();
        assert_eq!(commands, 2);
    }
}
