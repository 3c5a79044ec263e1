//! Service configuration.
//!
//! Every tuning constant of the dispatch loop, the trust engine and the
//! telemetry cadence lives here. `Default` carries the production values;
//! a JSON file may override any subset of them.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for a QIOS coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QiosConfig {
    pub dispatch: DispatchConfig,
    pub trust: TrustConfig,
    pub telemetry: TelemetryConfig,
}

impl QiosConfig {
    /// Parses a (possibly partial) JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a (possibly partial) JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Simulated propagation delays between instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delay after `particle`, `hadamard`, `x`, `z` and `measure` (default: 200ms)
    pub step_delay_ms: u64,

    /// Delay after `cnot`, a two-party handshake (default: 500ms)
    pub entangle_delay_ms: u64,
}

impl DispatchConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn entangle_delay(&self) -> Duration {
        Duration::from_millis(self.entangle_delay_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 200,
            entangle_delay_ms: 500,
        }
    }
}

/// Reputation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Score given to a freshly registered node
    pub initial_score: f64,

    /// Sliding window for measurement spam detection
    pub spam_window_ms: u64,

    /// Measurements inside the window that trigger the penalty
    pub spam_threshold: usize,

    /// Applied when the spam threshold is reached (negative)
    pub spam_penalty: f64,

    /// Applied to the requester when a run completes
    pub success_reward: f64,

    /// Added to every node below the ceiling on each telemetry tick
    pub regeneration_step: f64,

    /// Minimum score required to submit `cnot`
    pub cnot_min_score: f64,
}

impl TrustConfig {
    pub fn spam_window(&self) -> Duration {
        Duration::from_millis(self.spam_window_ms)
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            initial_score: 100.0,
            spam_window_ms: 5_000,
            spam_threshold: 5,
            spam_penalty: -75.0,
            success_reward: 5.0,
            regeneration_step: 0.5,
            cnot_min_score: 50.0,
        }
    }
}

/// Broadcast cadences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Snapshot + regeneration period (default: 5s)
    pub snapshot_interval_ms: u64,

    /// Liveness probe period (default: 20s)
    pub heartbeat_interval_ms: u64,
}

impl TelemetryConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: 5_000,
            heartbeat_interval_ms: 20_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = QiosConfig::default();
        assert_eq!(config.dispatch.step_delay(), Duration::from_millis(200));
        assert_eq!(config.dispatch.entangle_delay(), Duration::from_millis(500));
        assert_eq!(config.trust.spam_threshold, 5);
        assert_eq!(config.telemetry.heartbeat_interval(), Duration::from_secs(20));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = QiosConfig::from_json_str(r#"{ "dispatch": { "step_delay_ms": 10 } }"#).unwrap();
        assert_eq!(config.dispatch.step_delay_ms, 10);
        assert_eq!(config.dispatch.entangle_delay_ms, 500);
        assert_eq!(config.trust, TrustConfig::default());
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let err = QiosConfig::from_json_str("{ dispatch: 1 }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
