//! Scenario runner - executes coordination scenarios on the virtual clock.

use crate::network::{ReceivedCommand, SimClient};
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use qios_core::{CommandOp, Outbound, QiosConfig, RunOutcome, Severity};
use qios_env::ConnId;
use tracing::{debug, info};

const BELL: &str = "particle q1;\nparticle q2;\nhadamard q1;\ncnot q1, q2;\nmeasure q1 -> b;";

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Virtual time elapsed, in milliseconds
    pub virtual_ms: u64,

    /// Commands delivered to nodes
    pub commands: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,
}

type Check = Result<(), String>;

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Check {
    if condition {
        Ok(())
    } else {
        Err(message())
    }
}

fn client(world: &SimWorld, id: ConnId) -> Result<&SimClient, String> {
    world
        .client(id)
        .ok_or_else(|| format!("no client for {}", id))
}

fn cmd(opcode: CommandOp, target: &str, partner: Option<ConnId>, bit: Option<&str>) -> ReceivedCommand {
    ReceivedCommand {
        opcode,
        target: target.to_string(),
        partner,
        bit: bit.map(str::to_string),
    }
}

/// Runs coordination scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Service configuration under test
    service: QiosConfig,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            service: QiosConfig::default(),
        }
    }

    /// Overrides the service configuration.
    pub fn with_config(mut self, service: QiosConfig) -> Self {
        self.service = service;
        self
    }

    /// Runs a scenario in a fresh world and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut world = SimWorld::new(SimConfig {
            seed: self.seed,
            service: self.service.clone(),
        });

        let check = match scenario {
            ScenarioId::EndToEnd => run_end_to_end(&mut world).await,
            ScenarioId::CnotGate => run_cnot_gate(&mut world).await,
            ScenarioId::MeasureSpam => run_measure_spam(&mut world).await,
            ScenarioId::UnknownOpcode => run_unknown_opcode(&mut world).await,
            ScenarioId::Redeclare => run_redeclare(&mut world).await,
            ScenarioId::Regeneration => run_regeneration(&mut world),
        };

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: check.is_ok(),
            virtual_ms: world.now_ms(),
            commands: world.command_count(),
            failure_reason: check.err(),
        };
        debug!(?result, "scenario finished");
        result
    }
}

/// Bell pair across two nodes.
async fn run_end_to_end(world: &mut SimWorld) -> Check {
    let nodes = world.spawn_nodes(2);
    let (a, b) = (nodes[0], nodes[1]);
    let observer = world.spawn_observer();
    world.set_score(a, 80.0);

    let outcome = world.submit(a, BELL).await;
    ensure(outcome.is_complete(), || format!("run did not complete: {outcome:?}"))?;

    let to_a = client(world, a)?.commands();
    let expected_a = vec![
        cmd(CommandOp::Create, "q1", None, None),
        cmd(CommandOp::Hadamard, "q1", None, None),
        cmd(CommandOp::Entangle, "q1", Some(b), None),
        cmd(CommandOp::Measure, "q1", None, Some("b")),
    ];
    ensure(to_a == expected_a, || format!("node A received {to_a:?}"))?;

    let to_b = client(world, b)?.commands();
    let expected_b = vec![
        cmd(CommandOp::Create, "q2", None, None),
        cmd(CommandOp::Entangle, "q2", Some(a), None),
    ];
    ensure(to_b == expected_b, || format!("node B received {to_b:?}"))?;

    ensure(world.now_ms() == 1300, || {
        format!("expected 1300ms virtual, got {}ms", world.now_ms())
    })?;

    // 100 on registration, then 80 + 5 on completion
    let updates = client(world, a)?.trust_updates();
    ensure(updates == vec![100.0, 85.0], || format!("trust updates {updates:?}"))?;

    let success = client(world, observer)?
        .logs()
        .into_iter()
        .any(|(severity, text)| severity == Severity::Success && text.contains(&a.short()));
    ensure(success, || "observers missed the success line".to_string())
}

/// Entanglement gate exactly at the threshold.
async fn run_cnot_gate(world: &mut SimWorld) -> Check {
    let a = world.spawn_nodes(1)[0];
    let code = "particle q;\ncnot q, q;";

    world.set_score(a, 49.0);
    let rejected = world.submit(a, code).await;
    ensure(!rejected.is_complete(), || "run at 49 was not rejected".to_string())?;
    ensure(client(world, a)?.commands().is_empty(), || {
        "rejected run dispatched commands".to_string()
    })?;
    ensure(world.now_ms() == 0, || "rejected run consumed time".to_string())?;
    let last = client(world, a)?.logs().pop();
    ensure(matches!(last, Some((Severity::Error, _))), || {
        format!("requester got {last:?} instead of an error")
    })?;

    world.set_score(a, 50.0);
    let permitted = world.submit(a, code).await;
    ensure(permitted.is_complete(), || "run at 50 was rejected".to_string())?;
    let commands = client(world, a)?.commands().len();
    ensure(commands == 3, || format!("expected 3 commands, got {commands}"))
}

/// Six measurements inside the window.
async fn run_measure_spam(world: &mut SimWorld) -> Check {
    let a = world.spawn_nodes(1)[0];
    let mut code = String::from("particle q;\n");
    for _ in 0..6 {
        code.push_str("measure q -> c;\n");
    }

    let outcome = world.submit(a, &code).await;
    ensure(outcome.is_complete(), || format!("run did not complete: {outcome:?}"))?;

    // One penalty, never two; then the completion reward
    let updates = client(world, a)?.trust_updates();
    ensure(updates == vec![100.0, 25.0, 30.0], || format!("trust updates {updates:?}"))?;
    ensure(world.now_ms() == 1400, || {
        format!("expected 1400ms virtual, got {}ms", world.now_ms())
    })
}

/// Nothing recognisable in the program.
async fn run_unknown_opcode(world: &mut SimWorld) -> Check {
    let a = world.spawn_nodes(1)[0];
    world.set_score(a, 90.0);

    let outcome = world.submit(a, "teleport q1;\nswap q1 q2;").await;
    ensure(outcome.is_complete(), || format!("run did not complete: {outcome:?}"))?;
    ensure(world.command_count() == 0, || "commands were dispatched".to_string())?;
    ensure(world.now_ms() == 0, || format!("{}ms elapsed", world.now_ms()))?;
    ensure(world.score(a) == Some(90.0), || {
        format!("score moved to {:?}", world.score(a))
    })
}

/// Same name declared twice.
async fn run_redeclare(world: &mut SimWorld) -> Check {
    let nodes = world.spawn_nodes(2);
    let (a, b) = (nodes[0], nodes[1]);

    let outcome = world.submit(a, "particle p;\nparticle p;\nx p;").await;
    let report = match outcome {
        RunOutcome::Complete(report) => report,
        other => return Err(format!("run did not complete: {other:?}")),
    };

    ensure(report.particles.len() == 1, || format!("placement {:?}", report.particles))?;
    ensure(report.particles[0].owner == b, || "p is not owned by node B".to_string())?;

    let to_a = client(world, a)?.commands();
    ensure(to_a == vec![cmd(CommandOp::Create, "p", None, None)], || {
        format!("node A received {to_a:?}")
    })?;
    let to_b = client(world, b)?.commands();
    let expected_b = vec![
        cmd(CommandOp::Create, "p", None, None),
        cmd(CommandOp::X, "p", None, None),
    ];
    ensure(to_b == expected_b, || format!("node B received {to_b:?}"))
}

/// Regeneration on a telemetry tick, including the ceiling.
fn run_regeneration(world: &mut SimWorld) -> Check {
    let nodes = world.spawn_nodes(2);
    let (low, high) = (nodes[0], nodes[1]);
    let observer = world.spawn_observer();
    world.set_score(low, 40.0);
    world.set_score(high, 99.8);

    let snapshot = world.tick_telemetry();

    let low_score = snapshot.trust_table.get(&low).copied().unwrap_or_default();
    ensure((low_score - 40.5).abs() < 1e-9, || format!("low node at {low_score}"))?;
    let high_score = snapshot.trust_table.get(&high).copied().unwrap_or_default();
    ensure(high_score == 100.0, || format!("high node at {high_score}"))?;

    match client(world, observer)?.last_telemetry() {
        Some(Outbound::Telemetry { node_count: 2, .. }) => Ok(()),
        other => Err(format!("observer last telemetry {other:?}")),
    }
}
