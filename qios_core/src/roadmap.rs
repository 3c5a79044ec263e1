//! Static roadmap reference data exposed through telemetry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Complete,
    Active,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapPhase {
    pub phase: u32,
    pub name: String,
    pub status: PhaseStatus,
}

impl RoadmapPhase {
    fn new(phase: u32, name: &str, status: PhaseStatus) -> Self {
        Self {
            phase,
            name: name.to_string(),
            status,
        }
    }
}

/// The published network roadmap. Read-only; nothing in the core mutates it.
pub fn default_roadmap() -> Vec<RoadmapPhase> {
    vec![
        RoadmapPhase::new(1, "Node Registry & Back Office", PhaseStatus::Complete),
        RoadmapPhase::new(2, "Trust & Reputation Engine", PhaseStatus::Complete),
        RoadmapPhase::new(3, "Distributed Program Orchestration", PhaseStatus::Active),
        RoadmapPhase::new(4, "Cross-Node Entanglement Routing", PhaseStatus::Pending),
        RoadmapPhase::new(5, "Public Network Launch", PhaseStatus::Pending),
    ]
}
