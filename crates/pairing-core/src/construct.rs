use std::fmt;

use serde::{Deserialize, Serialize};

/// The seven named dimension groups of a founder profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Construct {
    ActionStyle,
    CommunicationDna,
    EnergyTopology,
    RiskDisposition,
    BusinessReality,
    TemporalPatterns,
    CognitiveStyle,
}

impl Construct {
    pub const ALL: [Construct; 7] = [
        Construct::ActionStyle,
        Construct::CommunicationDna,
        Construct::EnergyTopology,
        Construct::RiskDisposition,
        Construct::BusinessReality,
        Construct::TemporalPatterns,
        Construct::CognitiveStyle,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Construct::ActionStyle => "action_style",
            Construct::CommunicationDna => "communication_dna",
            Construct::EnergyTopology => "energy_topology",
            Construct::RiskDisposition => "risk_disposition",
            Construct::BusinessReality => "business_reality",
            Construct::TemporalPatterns => "temporal_patterns",
            Construct::CognitiveStyle => "cognitive_style",
        }
    }

    pub fn dimensions(self) -> &'static [&'static str] {
        match self {
            Construct::ActionStyle => &["FF", "FT", "QS", "IM"],
            Construct::CommunicationDna => &["D", "I", "S", "C"],
            Construct::EnergyTopology => &["W", "N", "D_disc", "G", "E", "T"],
            Construct::RiskDisposition => &[
                "tolerance",
                "speed",
                "ambiguity",
                "sunk_cost",
                "loss_aversion",
                "bias_to_action",
            ],
            Construct::BusinessReality => &[
                "focus",
                "revenue_maturity",
                "team_size",
                "bottleneck",
                "venture_age",
                "debt_pressure",
            ],
            Construct::TemporalPatterns => &[
                "peak_hour",
                "planning_style",
                "stall_recovery",
                "work_intensity",
                "context_switch_cost",
                "planning_horizon",
            ],
            Construct::CognitiveStyle => &["holistic", "sequential", "abstract", "concrete"],
        }
    }

    /// Accepts the snake_case name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Canonical spelling of `dim` in this construct (case-insensitive match).
    pub fn canonical_dimension(self, dim: &str) -> Option<&'static str> {
        self.dimensions()
            .iter()
            .copied()
            .find(|d| d.eq_ignore_ascii_case(dim))
    }
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for c in Construct::ALL {
            assert_eq!(Construct::from_name(c.name()), Some(c));
        }
        assert_eq!(Construct::from_name("nope"), None);
    }

    #[test]
    fn test_canonical_dimension_case_insensitive() {
        assert_eq!(
            Construct::EnergyTopology.canonical_dimension("d_DISC"),
            Some("D_disc")
        );
        assert_eq!(Construct::ActionStyle.canonical_dimension("qs"), Some("QS"));
        assert_eq!(Construct::ActionStyle.canonical_dimension("W"), None);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&Construct::CommunicationDna).unwrap();
        assert_eq!(json, "\"communication_dna\"");
    }
}
