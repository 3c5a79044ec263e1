//! Wire messages exchanged with nodes and observers.
//!
//! Every frame is a JSON object tagged by `type` (kebab-case):
//!
//! ```text
//! → {"type":"register-node"}
//! → {"type":"submit-program","code":"particle q1;"}
//! ← {"type":"command","run":1,"opcode":"create","target":"q1"}
//! ← {"type":"trust-update","score":100.0}
//! ```

use crate::parser::Opcode;
use crate::roadmap::RoadmapPhase;
use qios_env::ConnId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of one orchestration run.
pub type RunId = u64;

/// Role a connection registers under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Execution participant: submits programs, receives commands
    Node,
    /// Administrative connection: receives telemetry only
    Observer,
}

/// Frames accepted from a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Inbound {
    RegisterObserver,
    RegisterNode,
    SubmitProgram { code: String },
    HeartbeatAck,
}

impl Inbound {
    /// Decodes one text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warn,
    Error,
}

/// Remote operation a node is asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOp {
    Create,
    Hadamard,
    X,
    Z,
    Entangle,
    Measure,
}

impl From<Opcode> for CommandOp {
    fn from(opcode: Opcode) -> Self {
        match opcode {
            Opcode::Particle => CommandOp::Create,
            Opcode::Hadamard => CommandOp::Hadamard,
            Opcode::X => CommandOp::X,
            Opcode::Z => CommandOp::Z,
            Opcode::Cnot => CommandOp::Entangle,
            Opcode::Measure => CommandOp::Measure,
        }
    }
}

/// Frames pushed to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Outbound {
    Log {
        severity: Severity,
        text: String,
    },
    Command {
        run: RunId,
        opcode: CommandOp,
        /// Particle the command acts on
        target: String,
        /// Owner of the other half of an entangled pair
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partner: Option<ConnId>,
        /// Classical bit slot receiving a measurement
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bit: Option<String>,
    },
    TrustUpdate {
        score: f64,
    },
    Telemetry {
        #[serde(rename = "nodeCount")]
        node_count: usize,
        #[serde(rename = "trustTable")]
        trust_table: BTreeMap<ConnId, f64>,
        roadmap: Vec<RoadmapPhase>,
    },
    HeartbeatProbe,
}

impl Outbound {
    pub fn log(severity: Severity, text: impl Into<String>) -> Self {
        Self::Log {
            severity,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::log(Severity::Info, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::log(Severity::Error, text)
    }

    /// Encodes the frame for a text transport.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_tags() {
        assert_eq!(
            Inbound::from_json(r#"{"type":"register-node"}"#).unwrap(),
            Inbound::RegisterNode
        );
        assert_eq!(
            Inbound::from_json(r#"{"type":"submit-program","code":"x q;"}"#).unwrap(),
            Inbound::SubmitProgram { code: "x q;".into() }
        );
        assert!(Inbound::from_json(r#"{"type":"find-game"}"#).is_err());
    }

    #[test]
    fn test_command_op_from_opcode() {
        assert_eq!(CommandOp::from(Opcode::Particle), CommandOp::Create);
        assert_eq!(CommandOp::from(Opcode::Hadamard), CommandOp::Hadamard);
        assert_eq!(CommandOp::from(Opcode::X), CommandOp::X);
        assert_eq!(CommandOp::from(Opcode::Z), CommandOp::Z);
        assert_eq!(CommandOp::from(Opcode::Cnot), CommandOp::Entangle);
        assert_eq!(CommandOp::from(Opcode::Measure), CommandOp::Measure);
    }

    #[test]
    fn test_command_omits_absent_fields() {
        let frame = Outbound::Command {
            run: 3,
            opcode: CommandOp::Create,
            target: "q1".into(),
            partner: None,
            bit: None,
        };
        let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "command", "run": 3, "opcode": "create", "target": "q1"})
        );
    }

    #[test]
    fn test_telemetry_field_names() {
        let node = ConnId::from_seed(1);
        let mut trust_table = BTreeMap::new();
        trust_table.insert(node, 92.5);
        let frame = Outbound::Telemetry {
            node_count: 1,
            trust_table,
            roadmap: Vec::new(),
        };

        let value: serde_json::Value = serde_json::from_str(&frame.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "telemetry");
        assert_eq!(value["nodeCount"], 1);
        assert_eq!(value["trustTable"][node.as_uuid().to_string()], 92.5);
        assert_eq!(Outbound::HeartbeatProbe.to_json().unwrap(), r#"{"type":"heartbeat-probe"}"#);
    }
}
