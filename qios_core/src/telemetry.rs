//! Telemetry Broadcaster - periodic observer feed and liveness probes.
//!
//! Two independent cadences:
//! - every snapshot interval (5s): regenerate trust, then push
//!   `{ nodeCount, trustTable, roadmap }` to observers
//! - every heartbeat interval (20s): `heartbeat-probe` to every connection
//!
//! Probes never evict anyone; a connection leaves only when its transport
//! reports the disconnect.

use crate::config::TelemetryConfig;
use crate::protocol::{Outbound, Role};
use crate::registry::ConnectionRegistry;
use crate::roadmap::{default_roadmap, RoadmapPhase};
use crate::trust::SharedTrust;
use qios_env::{ConnId, QiosContext};

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Aggregate state pushed to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub node_count: usize,
    pub trust_table: BTreeMap<ConnId, f64>,
    pub roadmap: Vec<RoadmapPhase>,
}

impl From<TelemetrySnapshot> for Outbound {
    fn from(snapshot: TelemetrySnapshot) -> Self {
        Outbound::Telemetry {
            node_count: snapshot.node_count,
            trust_table: snapshot.trust_table,
            roadmap: snapshot.roadmap,
        }
    }
}

pub struct TelemetryBroadcaster<Ctx>
where
    Ctx: QiosContext,
{
    context: Arc<Ctx>,
    registry: Arc<ConnectionRegistry>,
    trust: SharedTrust,
    config: TelemetryConfig,
    roadmap: Vec<RoadmapPhase>,
}

impl<Ctx> TelemetryBroadcaster<Ctx>
where
    Ctx: QiosContext,
{
    pub fn new(
        context: Arc<Ctx>,
        registry: Arc<ConnectionRegistry>,
        trust: SharedTrust,
        config: TelemetryConfig,
    ) -> Self {
        Self {
            context,
            registry,
            trust,
            config,
            roadmap: default_roadmap(),
        }
    }

    /// Current aggregate state, without side effects.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            node_count: self.registry.count(Role::Node),
            trust_table: self.trust.with(|t| t.table()),
            roadmap: self.roadmap.clone(),
        }
    }

    /// One snapshot tick: regenerate, then broadcast to observers.
    pub fn tick(&self) -> TelemetrySnapshot {
        let regenerated = self.trust.with(|t| t.regenerate());
        let snapshot = self.snapshot();
        let delivered = self
            .registry
            .broadcast(Role::Observer, snapshot.clone().into());
        debug!(
            regenerated,
            nodes = snapshot.node_count,
            observers = delivered,
            "telemetry tick"
        );
        snapshot
    }

    /// One liveness probe to every connection. Returns the delivered count.
    pub fn probe(&self) -> usize {
        let delivered = self.registry.broadcast_all(Outbound::HeartbeatProbe);
        debug!(connections = delivered, "heartbeat probe");
        delivered
    }

    /// Spawns both loops on the context. They run for the process lifetime.
    pub fn start(self: Arc<Self>) {
        let snapshots = self.clone();
        self.context.spawn("telemetry-snapshots", async move {
            loop {
                snapshots.context.sleep(snapshots.config.snapshot_interval()).await;
                snapshots.tick();
            }
        });

        let heartbeats = self.clone();
        self.context.spawn("telemetry-heartbeat", async move {
            loop {
                heartbeats.context.sleep(heartbeats.config.heartbeat_interval()).await;
                heartbeats.probe();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::TrustEngine;
    use approx::assert_relative_eq;
    use qios_env::TokioContext;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Fixture {
        telemetry: Arc<TelemetryBroadcaster<TokioContext>>,
        trust: SharedTrust,
        node: ConnId,
        node_rx: mpsc::UnboundedReceiver<Outbound>,
        observer_rx: mpsc::UnboundedReceiver<Outbound>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(ConnectionRegistry::new());
        let trust = SharedTrust::new(TrustEngine::default());

        let node = ConnId::from_seed(1);
        let (tx, node_rx) = mpsc::unbounded_channel();
        registry.connect(node, tx);
        registry.register(node, Role::Node);
        trust.with(|t| t.on_connect(node));

        let observer = ConnId::from_seed(2);
        let (tx, observer_rx) = mpsc::unbounded_channel();
        registry.connect(observer, tx);
        registry.register(observer, Role::Observer);

        let telemetry = Arc::new(TelemetryBroadcaster::new(
            TokioContext::shared(),
            registry,
            trust.clone(),
            TelemetryConfig::default(),
        ));
        Fixture { telemetry, trust, node, node_rx, observer_rx }
    }

    #[test]
    fn test_tick_regenerates_then_reports() {
        let mut f = fixture();
        f.trust.with(|t| t.adjust(f.node, -60.0, "test"));

        let snapshot = f.telemetry.tick();

        assert_eq!(snapshot.node_count, 1);
        assert_relative_eq!(snapshot.trust_table[&f.node], 40.5);
        assert_eq!(snapshot.roadmap, default_roadmap());

        match f.observer_rx.try_recv().unwrap() {
            Outbound::Telemetry { node_count, trust_table, .. } => {
                assert_eq!(node_count, 1);
                assert_relative_eq!(trust_table[&f.node], 40.5);
            }
            other => panic!("unexpected frame {other:?}"),
        }
        // Nodes do not receive telemetry
        assert!(f.node_rx.try_recv().is_err());
    }

    #[test]
    fn test_probe_reaches_everyone() {
        let mut f = fixture();
        assert_eq!(f.telemetry.probe(), 2);
        assert_eq!(f.node_rx.try_recv().unwrap(), Outbound::HeartbeatProbe);
        assert_eq!(f.observer_rx.try_recv().unwrap(), Outbound::HeartbeatProbe);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loops_follow_their_cadences() {
        let mut f = fixture();
        f.telemetry.clone().start();

        tokio::time::sleep(Duration::from_millis(20_500)).await;

        let mut snapshots = 0;
        let mut probes = 0;
        while let Ok(frame) = f.observer_rx.try_recv() {
            match frame {
                Outbound::Telemetry { .. } => snapshots += 1,
                Outbound::HeartbeatProbe => probes += 1,
                _ => {}
            }
        }
        assert_eq!(snapshots, 4);
        assert_eq!(probes, 1);
    }
}
