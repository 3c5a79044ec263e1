//! Orchestrator - drives one submitted program through its nodes.
//!
//! # Run lifecycle
//!
//! ```text
//!  Idle ──► TrustCheck ──► Running ──► Complete
//!                │
//!                └──────► Rejected
//! ```
//!
//! Every instruction is dispatched through the [`ConnectionRegistry`] and
//! followed by a fixed simulated propagation delay, awaited through the
//! [`QiosContext`] before the next instruction starts. Runs are serialized
//! through a FIFO lane, and each run owns a fresh [`Placement`] table.
//!
//! # Usage
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(ctx, registry, trust, DispatchConfig::default());
//! match orchestrator.submit(requester, "particle q1;\nhadamard q1;").await {
//!     RunOutcome::Complete(report) => println!("{} commands", report.commands),
//!     RunOutcome::Rejected { reason, .. } => println!("rejected: {reason}"),
//! }
//! ```

use crate::config::DispatchConfig;
use crate::parser::{parse_program, Instruction, Opcode};
use crate::protocol::{CommandOp, Outbound, Role, RunId, Severity};
use crate::registry::ConnectionRegistry;
use crate::scheduler::{Particle, Placement};
use crate::trust::{SharedTrust, TrustAdjustment};
use qios_env::{ConnId, QiosContext};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Token whose presence in the source triggers the trust gate.
const GATED_TOKEN: &str = "cnot";

/// States of an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    TrustCheck,
    Running,
    Complete,
    Rejected,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run: RunId,

    /// Instructions parsed from the source
    pub instructions: usize,

    /// Instructions whose owners resolved and were dispatched
    pub executed: usize,

    /// Instructions dropped for lack of an owner
    pub skipped: usize,

    /// Command frames handed to the registry
    pub commands: usize,

    /// Final placement table
    pub particles: Vec<Particle>,
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Complete(RunReport),
    Rejected { run: RunId, reason: String },
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            Self::Complete(_) => RunState::Complete,
            Self::Rejected { .. } => RunState::Rejected,
        }
    }

    pub fn run(&self) -> RunId {
        match self {
            Self::Complete(report) => report.run,
            Self::Rejected { run, .. } => *run,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// What a single instruction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Dispatched { commands: usize, delay: Duration },
    Skipped,
}

/// Per-run bookkeeping.
struct Run {
    id: RunId,
    requester: ConnId,
    state: RunState,
    placement: Placement,
}

impl Run {
    fn advance(&mut self, next: RunState) {
        debug!(run = self.id, from = ?self.state, to = ?next, "run transition");
        self.state = next;
    }
}

/// The orchestrator. Generic over the context so that production runs on
/// tokio and simulation runs on a virtual clock.
pub struct Orchestrator<Ctx>
where
    Ctx: QiosContext,
{
    /// Environment context (clock + sleep)
    context: Arc<Ctx>,

    /// Live connections
    registry: Arc<ConnectionRegistry>,

    /// Reputation table
    trust: SharedTrust,

    /// Propagation delays
    config: DispatchConfig,

    /// FIFO run lane; one run dispatches at a time
    lane: AsyncMutex<()>,

    next_run: AtomicU64,
}

impl<Ctx> Orchestrator<Ctx>
where
    Ctx: QiosContext,
{
    pub fn new(
        context: Arc<Ctx>,
        registry: Arc<ConnectionRegistry>,
        trust: SharedTrust,
        config: DispatchConfig,
    ) -> Self {
        Self {
            context,
            registry,
            trust,
            config,
            lane: AsyncMutex::new(()),
            next_run: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn trust(&self) -> &SharedTrust {
        &self.trust
    }

    /// Runs one submitted program to completion or rejection.
    ///
    /// Waits for any earlier run to finish first.
    pub async fn submit(&self, requester: ConnId, code: &str) -> RunOutcome {
        let _lane = self.lane.lock().await;

        let mut run = Run {
            id: self.next_run.fetch_add(1, Ordering::Relaxed),
            requester,
            state: RunState::Idle,
            placement: Placement::default(),
        };

        run.advance(RunState::TrustCheck);
        if code.contains(GATED_TOKEN) {
            let (allowed, score) = self.trust.with(|t| {
                (t.can_perform(requester, Opcode::Cnot), t.score(requester))
            });
            if !allowed {
                return self.reject(&mut run, score);
            }
        }

        run.advance(RunState::Running);
        let program = parse_program(code);
        run.placement = Placement::new(self.registry.node_ids());
        info!(
            run = run.id,
            requester = %requester,
            instructions = program.len(),
            nodes = run.placement.nodes().len(),
            "run started"
        );
        self.registry.send_to(
            requester,
            Outbound::info(format!(
                "Run {} started: {} instruction(s) across {} node(s)",
                run.id,
                program.len(),
                run.placement.nodes().len()
            )),
        );

        let mut report = RunReport {
            run: run.id,
            instructions: program.len(),
            executed: 0,
            skipped: 0,
            commands: 0,
            particles: Vec::new(),
        };

        for instruction in program.iter() {
            match self.execute(&mut run, instruction) {
                Step::Dispatched { commands, delay } => {
                    report.executed += 1;
                    report.commands += commands;
                    self.context.sleep(delay).await;
                }
                Step::Skipped => {
                    debug!(run = run.id, opcode = %instruction.opcode(), "unresolved reference, skipped");
                    report.skipped += 1;
                }
            }
        }

        run.advance(RunState::Complete);
        report.particles = run.placement.particles().to_vec();
        self.complete(&run, &report);
        RunOutcome::Complete(report)
    }

    fn reject(&self, run: &mut Run, score: Option<f64>) -> RunOutcome {
        run.advance(RunState::Rejected);
        let reason = match score {
            Some(score) => format!(
                "Insufficient trust for cnot: score {:.1} is below {}",
                score,
                self.trust.with(|t| t.config().cnot_min_score)
            ),
            None => "Insufficient trust for cnot: not a registered node".to_string(),
        };
        warn!(run = run.id, requester = %run.requester, %reason, "run rejected");
        self.registry.send_to(run.requester, Outbound::error(reason.clone()));
        RunOutcome::Rejected { run: run.id, reason }
    }

    fn complete(&self, run: &Run, report: &RunReport) {
        info!(
            run = run.id,
            executed = report.executed,
            skipped = report.skipped,
            commands = report.commands,
            "run complete"
        );

        if report.instructions == 0 {
            // Nothing ran; no reward for an empty submission
            self.registry.send_to(
                run.requester,
                Outbound::info(format!("Run {} complete: no instructions", run.id)),
            );
            return;
        }

        if let Some(adjustment) = self.trust.with(|t| t.reward(run.requester)) {
            self.publish(&adjustment);
        }
        self.registry.send_to(
            run.requester,
            Outbound::log(Severity::Success, format!("Run {} complete", run.id)),
        );
        self.registry.broadcast(
            Role::Observer,
            Outbound::log(
                Severity::Success,
                format!(
                    "Program from node {} executed: {} instruction(s), {} command(s)",
                    run.requester.short(),
                    report.executed,
                    report.commands
                ),
            ),
        );
    }

    /// Dispatches one instruction. Never awaits.
    fn execute(&self, run: &mut Run, instruction: &Instruction) -> Step {
        match instruction {
            Instruction::Particle { name } => match run.placement.place(name) {
                Some(owner) => {
                    self.command(run.id, owner, Opcode::Particle.into(), name, None, None);
                    self.step(1)
                }
                None => Step::Skipped,
            },

            Instruction::Hadamard { target } => self.single(run, Opcode::Hadamard, target),
            Instruction::X { target } => self.single(run, Opcode::X, target),
            Instruction::Z { target } => self.single(run, Opcode::Z, target),

            Instruction::Cnot { control, target } => {
                let Some((a, b)) = run.placement.owner_pair(control, target) else {
                    return Step::Skipped;
                };
                self.registry.broadcast(
                    Role::Observer,
                    Outbound::info(format!(
                        "Entangling {}@{} with {}@{}",
                        control,
                        a.short(),
                        target,
                        b.short()
                    )),
                );
                self.command(run.id, a, CommandOp::Entangle, control, Some(b), None);
                self.command(run.id, b, CommandOp::Entangle, target, Some(a), None);
                Step::Dispatched {
                    commands: 2,
                    delay: self.config.entangle_delay(),
                }
            }

            Instruction::Measure { target, bit } => {
                let owner = run.placement.owner_of(target);
                self.track(run.requester, Opcode::Measure);
                match owner {
                    Some(owner) => {
                        self.command(run.id, owner, CommandOp::Measure, target, None, bit.clone());
                        self.step(1)
                    }
                    None => Step::Skipped,
                }
            }
        }
    }

    fn single(&self, run: &Run, opcode: Opcode, target: &str) -> Step {
        let Some(owner) = run.placement.owner_of(target) else {
            return Step::Skipped;
        };
        self.command(run.id, owner, opcode.into(), target, None, None);
        self.track(run.requester, opcode);
        self.step(1)
    }

    fn step(&self, commands: usize) -> Step {
        Step::Dispatched {
            commands,
            delay: self.config.step_delay(),
        }
    }

    fn command(
        &self,
        run: RunId,
        owner: ConnId,
        opcode: CommandOp,
        target: &str,
        partner: Option<ConnId>,
        bit: Option<String>,
    ) {
        debug!(run, node = %owner, ?opcode, target, "dispatch");
        self.registry.send_to(
            owner,
            Outbound::Command {
                run,
                opcode,
                target: target.to_string(),
                partner,
                bit,
            },
        );
    }

    /// Feeds the rate limiter and publishes any resulting penalty.
    fn track(&self, node: ConnId, opcode: Opcode) {
        let now = self.context.now();
        if let Some(adjustment) = self.trust.with(|t| t.record_activity(node, opcode, now)) {
            self.publish(&adjustment);
        }
    }

    /// Tells the node its new score and puts the audit line on the observer feed.
    fn publish(&self, adjustment: &TrustAdjustment) {
        self.registry.send_to(
            adjustment.node_id,
            Outbound::TrustUpdate {
                score: adjustment.score,
            },
        );
        let severity = if adjustment.delta < 0.0 {
            Severity::Warn
        } else {
            Severity::Info
        };
        self.registry
            .broadcast(Role::Observer, Outbound::log(severity, adjustment.describe()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustConfig;
    use crate::trust::TrustEngine;
    use qios_env::{ConnectionSink, EnvError, TokioContext};
    use std::sync::Mutex;

    type Tape = Arc<Mutex<Vec<(ConnId, Outbound)>>>;

    /// Records every delivery, across all connections, in global order.
    struct TapSink {
        conn: ConnId,
        tape: Tape,
    }

    impl ConnectionSink<Outbound> for TapSink {
        fn deliver(&self, message: Outbound) -> Result<(), EnvError> {
            self.tape.lock().unwrap().push((self.conn, message));
            Ok(())
        }
    }

    struct Harness {
        ctx: Arc<TokioContext>,
        orchestrator: Arc<Orchestrator<TokioContext>>,
        registry: Arc<ConnectionRegistry>,
        trust: SharedTrust,
        nodes: Vec<ConnId>,
        observer: ConnId,
        tape: Tape,
    }

    impl Harness {
        fn new(node_count: u64) -> Self {
            let ctx = TokioContext::shared();
            let registry = Arc::new(ConnectionRegistry::new());
            let trust = SharedTrust::new(TrustEngine::new(TrustConfig::default()));
            let tape: Tape = Arc::default();

            let mut nodes = Vec::new();
            for seed in 1..=node_count {
                let id = ConnId::from_seed(seed);
                registry.connect(id, TapSink { conn: id, tape: tape.clone() });
                registry.register(id, Role::Node);
                trust.with(|t| t.on_connect(id));
                nodes.push(id);
            }
            let observer = ConnId::from_seed(100);
            registry.connect(observer, TapSink { conn: observer, tape: tape.clone() });
            registry.register(observer, Role::Observer);

            let orchestrator = Arc::new(Orchestrator::new(
                ctx.clone(),
                registry.clone(),
                trust.clone(),
                DispatchConfig::default(),
            ));

            Self { ctx, orchestrator, registry, trust, nodes, observer, tape }
        }

        fn commands(&self) -> Vec<(ConnId, CommandOp, String, Option<ConnId>, Option<String>)> {
            self.tape
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(conn, msg)| match msg {
                    Outbound::Command { opcode, target, partner, bit, .. } => {
                        Some((*conn, *opcode, target.clone(), *partner, bit.clone()))
                    }
                    _ => None,
                })
                .collect()
        }

        fn trust_updates(&self, node: ConnId) -> Vec<f64> {
            self.tape
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(conn, msg)| match msg {
                    Outbound::TrustUpdate { score } if *conn == node => Some(*score),
                    _ => None,
                })
                .collect()
        }

        fn messages_to(&self, conn: ConnId) -> Vec<Outbound> {
            self.tape
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == conn)
                .map(|(_, m)| m.clone())
                .collect()
        }
    }

    const BELL: &str = "particle q1;\nparticle q2;\nhadamard q1;\ncnot q1, q2;\nmeasure q1 -> b;";

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_dispatch_order() {
        let h = Harness::new(2);
        let (a, b) = (h.nodes[0], h.nodes[1]);
        h.trust.with(|t| t.adjust(a, -20.0, "test"));

        let outcome = h.orchestrator.submit(a, BELL).await;

        assert_eq!(outcome.state(), RunState::Complete);
        assert_eq!(
            h.commands(),
            vec![
                (a, CommandOp::Create, "q1".into(), None, None),
                (b, CommandOp::Create, "q2".into(), None, None),
                (a, CommandOp::Hadamard, "q1".into(), None, None),
                (a, CommandOp::Entangle, "q1".into(), Some(b), None),
                (b, CommandOp::Entangle, "q2".into(), Some(a), None),
                (a, CommandOp::Measure, "q1".into(), None, Some("b".into())),
            ]
        );
        assert_eq!(h.trust_updates(a), vec![85.0]);

        let elapsed = h.ctx.now();
        assert!(elapsed >= Duration::from_millis(1300), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1310), "elapsed {elapsed:?}");

        match outcome {
            RunOutcome::Complete(report) => {
                assert_eq!(report.instructions, 5);
                assert_eq!(report.executed, 5);
                assert_eq!(report.commands, 6);
                assert_eq!(report.particles.len(), 2);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_qubit_gates_keep_their_opcode() {
        let h = Harness::new(1);
        let a = h.nodes[0];

        let outcome = h.orchestrator.submit(a, "particle q;\nx q;\nz q;\nhadamard q;").await;

        assert_eq!(outcome.state(), RunState::Complete);
        let ops: Vec<CommandOp> = h.commands().into_iter().map(|(_, op, ..)| op).collect();
        assert_eq!(
            ops,
            vec![CommandOp::Create, CommandOp::X, CommandOp::Z, CommandOp::Hadamard]
        );
        // Gates never trip the rate limiter; only the completion reward lands
        assert_eq!(h.trust_updates(a), vec![100.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cnot_rejected_below_threshold() {
        let h = Harness::new(1);
        let a = h.nodes[0];
        h.trust.with(|t| t.adjust(a, -51.0, "test"));

        let outcome = h.orchestrator.submit(a, "particle q;\ncnot q, q;").await;

        assert_eq!(outcome.state(), RunState::Rejected);
        assert!(h.commands().is_empty());
        assert_eq!(h.trust.with(|t| t.score(a)), Some(49.0));
        assert_eq!(h.ctx.now(), Duration::ZERO);

        let to_requester = h.messages_to(a);
        assert_eq!(to_requester.len(), 1);
        assert!(matches!(to_requester[0], Outbound::Log { severity: Severity::Error, .. }));
        assert!(h.messages_to(h.observer).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cnot_permitted_at_threshold() {
        let h = Harness::new(1);
        let a = h.nodes[0];
        h.trust.with(|t| t.adjust(a, -50.0, "test"));

        let outcome = h.orchestrator.submit(a, "particle q;\ncnot q, q;").await;
        assert!(outcome.is_complete());
        assert_eq!(h.commands().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_matches_substring_in_comment() {
        let h = Harness::new(1);
        let a = h.nodes[0];
        h.trust.with(|t| t.adjust(a, -80.0, "test"));

        let outcome = h.orchestrator.submit(a, "particle q; // no cnot here").await;
        assert_eq!(outcome.state(), RunState::Rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_measurement_spam_penalised_once() {
        let h = Harness::new(1);
        let a = h.nodes[0];
        let code = "particle q;\nmeasure q -> c;\nmeasure q -> c;\nmeasure q -> c;\nmeasure q -> c;\nmeasure q -> c;\nmeasure q -> c;";

        let outcome = h.orchestrator.submit(a, code).await;

        assert!(outcome.is_complete());
        // -75 once, then +5 on completion
        assert_eq!(h.trust_updates(a), vec![25.0, 30.0]);
        assert_eq!(h.trust.with(|t| t.record(a).map(|r| r.window_len())), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_opcode_is_noop_run() {
        let h = Harness::new(1);
        let a = h.nodes[0];
        h.trust.with(|t| t.adjust(a, -10.0, "test"));

        let outcome = h.orchestrator.submit(a, "teleport q1;").await;

        assert!(outcome.is_complete());
        assert!(h.commands().is_empty());
        assert_eq!(h.trust.with(|t| t.score(a)), Some(90.0));
        assert_eq!(h.ctx.now(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_references_are_skipped_without_delay() {
        let h = Harness::new(1);
        let a = h.nodes[0];

        let outcome = h
            .orchestrator
            .submit(a, "hadamard ghost;\ncnot ghost, other;\nmeasure ghost -> b;\nx ghost;")
            .await;

        match outcome {
            RunOutcome::Complete(report) => {
                assert_eq!(report.skipped, 4);
                assert_eq!(report.executed, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(h.commands().is_empty());
        assert_eq!(h.ctx.now(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_run_drops_dispatch() {
        let h = Harness::new(2);
        let (a, b) = (h.nodes[0], h.nodes[1]);

        let orchestrator = h.orchestrator.clone();
        let run = tokio::spawn(async move { orchestrator.submit(b, BELL).await });

        // create q1 @0ms, create q2 @200ms, hadamard q1 @400ms
        tokio::time::sleep(Duration::from_millis(300)).await;
        h.registry.unregister(a).unwrap();
        h.trust.with(|t| t.on_disconnect(a));

        let outcome = run.await.unwrap();
        assert!(outcome.is_complete());

        let to_a: Vec<CommandOp> = h
            .commands()
            .into_iter()
            .filter(|(conn, ..)| *conn == a)
            .map(|(_, op, ..)| op)
            .collect();
        assert_eq!(to_a, vec![CommandOp::Create]);

        // B still received its half of the pair
        assert!(h
            .commands()
            .iter()
            .any(|(conn, op, ..)| *conn == b && *op == CommandOp::Entangle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_do_not_interleave() {
        let h = Harness::new(2);
        let (a, b) = (h.nodes[0], h.nodes[1]);

        let first = h.orchestrator.clone();
        let second = h.orchestrator.clone();
        let (r1, r2) = tokio::join!(
            first.submit(a, "particle p;\nparticle q;\nx p;"),
            second.submit(b, "particle p;\nparticle q;\nz q;"),
        );
        assert!(r1.is_complete() && r2.is_complete());
        assert_ne!(r1.run(), r2.run());

        let runs: Vec<RunId> = h
            .tape
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, msg)| match msg {
                Outbound::Command { run, .. } => Some(*run),
                _ => None,
            })
            .collect();
        assert_eq!(runs.len(), 6);
        assert!(runs.windows(2).all(|w| w[0] <= w[1]), "interleaved: {runs:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_observers_see_audit_and_success_lines() {
        let h = Harness::new(1);
        let a = h.nodes[0];
        h.trust.with(|t| t.adjust(a, -10.0, "test"));

        h.orchestrator.submit(a, "particle q;").await;

        let lines: Vec<String> = h
            .messages_to(h.observer)
            .into_iter()
            .filter_map(|m| match m {
                Outbound::Log { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert!(lines.iter().any(|l| l.contains("successful program execution")));
        assert!(lines.iter().any(|l| l.contains(&a.short()) && l.contains("executed")));
    }
}
