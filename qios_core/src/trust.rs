//! The "TRUST" Engine - per-node reputation with abuse detection
//!
//! Every registered node carries a score in `[0, 100]`:
//! - starts at 100 on registration, dropped on disconnect
//! - `+5` for every completed program, `+0.5` per telemetry tick below the ceiling
//! - `-75` when a node issues 5 measurements inside a 5 second window
//! - below 50 the node may no longer submit `cnot`
//!
//! Scores are only ever changed through [`TrustEngine::adjust`], which logs
//! every change and hands back a [`TrustAdjustment`] for the caller to publish.

use crate::config::TrustConfig;
use crate::parser::Opcode;
use qios_env::ConnId;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

pub const REASON_MEASUREMENT_SPAM: &str = "measurement spam";
pub const REASON_SUCCESSFUL_RUN: &str = "successful program execution";

/// Reputation state of a single node.
#[derive(Debug, Clone)]
pub struct TrustRecord {
    /// Node this record belongs to
    pub node_id: ConnId,

    /// Current score, always within [MIN_SCORE, MAX_SCORE]
    pub score: f64,

    /// Timestamps of recent measurements (context time)
    activity_window: VecDeque<Duration>,
}

impl TrustRecord {
    /// Creates a new record at the given score.
    pub fn new(node_id: ConnId, score: f64) -> Self {
        Self {
            node_id,
            score: score.clamp(MIN_SCORE, MAX_SCORE),
            activity_window: VecDeque::new(),
        }
    }

    /// Number of measurements currently inside the window.
    pub fn window_len(&self) -> usize {
        self.activity_window.len()
    }
}

/// A score change, returned so the caller can notify the node and observers.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustAdjustment {
    pub node_id: ConnId,
    pub delta: f64,
    pub score: f64,
    pub reason: String,
}

impl TrustAdjustment {
    /// Audit line naming the truncated node id, delta, result and reason.
    pub fn describe(&self) -> String {
        format!(
            "Trust {} for node {}: {:+} -> {:.1} ({})",
            if self.delta >= 0.0 { "raised" } else { "lowered" },
            self.node_id.short(),
            self.delta,
            self.score,
            self.reason
        )
    }
}

/// Reputation table for all registered nodes.
#[derive(Debug, Clone)]
pub struct TrustEngine {
    records: HashMap<ConnId, TrustRecord>,
    config: TrustConfig,
}

impl TrustEngine {
    pub fn new(config: TrustConfig) -> Self {
        Self {
            records: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Creates the record of a newly registered node.
    pub fn on_connect(&mut self, node_id: ConnId) {
        let initial = self.config.initial_score;
        self.records
            .entry(node_id)
            .or_insert_with(|| TrustRecord::new(node_id, initial));
    }

    /// Drops the record of a disconnected node.
    pub fn on_disconnect(&mut self, node_id: ConnId) -> Option<TrustRecord> {
        self.records.remove(&node_id)
    }

    pub fn score(&self, node_id: ConnId) -> Option<f64> {
        self.records.get(&node_id).map(|r| r.score)
    }

    pub fn record(&self, node_id: ConnId) -> Option<&TrustRecord> {
        self.records.get(&node_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Applies `delta` with clamping. Every change is logged.
    ///
    /// Returns `None` if the node has no record.
    pub fn adjust(&mut self, node_id: ConnId, delta: f64, reason: &str) -> Option<TrustAdjustment> {
        let record = self.records.get_mut(&node_id)?;
        record.score = (record.score + delta).clamp(MIN_SCORE, MAX_SCORE);

        let adjustment = TrustAdjustment {
            node_id,
            delta,
            score: record.score,
            reason: reason.to_string(),
        };
        info!(
            node = %node_id,
            delta,
            score = adjustment.score,
            reason,
            "trust adjusted"
        );
        Some(adjustment)
    }

    /// Tracks a measurement for spam detection.
    ///
    /// Only `measure` is tracked. When the sliding window holds
    /// `spam_threshold` entries the penalty is applied and the window cleared.
    pub fn record_activity(
        &mut self,
        node_id: ConnId,
        opcode: Opcode,
        now: Duration,
    ) -> Option<TrustAdjustment> {
        if opcode != Opcode::Measure {
            return None;
        }

        let window = self.config.spam_window();
        let threshold = self.config.spam_threshold;
        let record = self.records.get_mut(&node_id)?;

        record.activity_window.push_back(now);
        record
            .activity_window
            .retain(|t| now.saturating_sub(*t) < window);

        if record.activity_window.len() >= threshold {
            record.activity_window.clear();
            let penalty = self.config.spam_penalty;
            return self.adjust(node_id, penalty, REASON_MEASUREMENT_SPAM);
        }

        None
    }

    /// Passive recovery: every node below the ceiling gains one step.
    ///
    /// Returns the number of nodes that changed.
    pub fn regenerate(&mut self) -> usize {
        let step = self.config.regeneration_step;
        let mut changed = 0;
        for record in self.records.values_mut() {
            if record.score < MAX_SCORE {
                record.score = (record.score + step).min(MAX_SCORE);
                changed += 1;
            }
        }
        changed
    }

    /// Gate check. Only `cnot` is gated; everything else is always allowed.
    ///
    /// A connection without a record has no score and cannot `cnot`.
    pub fn can_perform(&self, node_id: ConnId, opcode: Opcode) -> bool {
        match opcode {
            Opcode::Cnot => self
                .score(node_id)
                .is_some_and(|score| score >= self.config.cnot_min_score),
            _ => true,
        }
    }

    /// Rewards a node for a completed run.
    pub fn reward(&mut self, node_id: ConnId) -> Option<TrustAdjustment> {
        let reward = self.config.success_reward;
        self.adjust(node_id, reward, REASON_SUCCESSFUL_RUN)
    }

    /// Snapshot of all scores, ordered by node id.
    pub fn table(&self) -> BTreeMap<ConnId, f64> {
        self.records
            .iter()
            .map(|(id, record)| (*id, record.score))
            .collect()
    }
}

impl Default for TrustEngine {
    fn default() -> Self {
        Self::new(TrustConfig::default())
    }
}

/// Trust table shared between the orchestrator, coordinator and telemetry.
///
/// The lock is only taken inside [`SharedTrust::with`], so it can never be
/// held across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedTrust(Arc<Mutex<TrustEngine>>);

impl SharedTrust {
    pub fn new(engine: TrustEngine) -> Self {
        Self(Arc::new(Mutex::new(engine)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut TrustEngine) -> R) -> R {
        let mut engine = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut engine)
    }
}
