//! Coordination scenarios for DST.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Two-node Bell-pair program: dispatch order, timing, reward
    EndToEnd,

    /// Entanglement gate at the trust threshold
    CnotGate,

    /// Measurement burst trips the rate limiter once
    MeasureSpam,

    /// Programs of unknown opcodes run as no-ops
    UnknownOpcode,

    /// Re-declared particles move to the next node
    Redeclare,

    /// Passive trust regeneration on telemetry ticks
    Regeneration,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::EndToEnd,
            ScenarioId::CnotGate,
            ScenarioId::MeasureSpam,
            ScenarioId::UnknownOpcode,
            ScenarioId::Redeclare,
            ScenarioId::Regeneration,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::EndToEnd => "end_to_end",
            ScenarioId::CnotGate => "cnot_gate",
            ScenarioId::MeasureSpam => "measure_spam",
            ScenarioId::UnknownOpcode => "unknown_opcode",
            ScenarioId::Redeclare => "redeclare",
            ScenarioId::Regeneration => "regeneration",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::EndToEnd => "Bell pair across 2 nodes: 6 commands in order, 1300ms virtual, +5 trust",
            ScenarioId::CnotGate => "cnot rejected at trust 49, permitted at 50",
            ScenarioId::MeasureSpam => "6 measurements inside 5s: one -75 penalty, then +5",
            ScenarioId::UnknownOpcode => "Unrecognised opcodes dispatch nothing and take no time",
            ScenarioId::Redeclare => "Re-declaring a particle overwrites its owner round-robin",
            ScenarioId::Regeneration => "Telemetry ticks add 0.5 trust up to the 100 ceiling",
        }
    }

    /// One aligned name and description line per scenario, for CLI help output.
    pub fn catalogue() -> String {
        Self::all()
            .iter()
            .map(|s| format!("  {:<16}{}", s.name(), s.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "end_to_end" | "endtoend" | "e2e" => Ok(ScenarioId::EndToEnd),
            "cnot_gate" | "cnotgate" => Ok(ScenarioId::CnotGate),
            "measure_spam" | "measurespam" | "spam" => Ok(ScenarioId::MeasureSpam),
            "unknown_opcode" | "unknownopcode" => Ok(ScenarioId::UnknownOpcode),
            "redeclare" => Ok(ScenarioId::Redeclare),
            "regeneration" | "regen" => Ok(ScenarioId::Regeneration),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
