//! Composite pairing score: how well the engine knows the founder.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    SCORE_CAP_DAYS, SCORE_CAP_DAYS_MIN, SCORE_CAP_MESSAGES, SCORE_CAP_MESSAGES_MIN,
};
use crate::construct::Construct;
use crate::profile::Profile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PairingLevel {
    #[default]
    Stranger,
    Acquaintance,
    Partner,
    Trusted,
    Bonded,
}

impl PairingLevel {
    pub fn from_composite(composite: f64) -> Self {
        if composite >= 81.0 {
            PairingLevel::Bonded
        } else if composite >= 61.0 {
            PairingLevel::Trusted
        } else if composite >= 36.0 {
            PairingLevel::Partner
        } else if composite >= 16.0 {
            PairingLevel::Acquaintance
        } else {
            PairingLevel::Stranger
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PairingLevel::Stranger => "Stranger",
            PairingLevel::Acquaintance => "Acquaintance",
            PairingLevel::Partner => "Partner",
            PairingLevel::Trusted => "Trusted",
            PairingLevel::Bonded => "Bonded",
        }
    }
}

impl fmt::Display for PairingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (component key, weight). Weights sum to 1.0.
const WEIGHTS: [(&str, f64); 9] = [
    ("S1_action_style", 0.15),
    ("S2_communication", 0.10),
    ("S3_energy", 0.10),
    ("S4_risk", 0.10),
    ("S5_business_declared", 0.15),
    ("S6_business_verified", 0.10),
    ("S7_comm_inferred", 0.15),
    ("S8_behavioral", 0.10),
    ("S9_continuous", 0.05),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PairingScore {
    pub composite: f64,
    pub level: PairingLevel,
    pub components: BTreeMap<String, f64>,
}

/// 1.0 once `full` dimensions are defined, 0.5 with at least one.
fn coverage(profile: &Profile, construct: Construct, full: usize) -> f64 {
    match profile.constructs.get(construct).defined_count() {
        n if n >= full => 1.0,
        0 => 0.0,
        _ => 0.5,
    }
}

fn saturate(x: f64, k: f64) -> f64 {
    (x / k).min(1.0)
}

impl PairingScore {
    pub fn compute(profile: &Profile) -> Self {
        let messages = profile.observed_comm.messages_analyzed;
        let event_days = profile.behavior.event_days();
        let values = [
            coverage(profile, Construct::ActionStyle, 3),
            coverage(profile, Construct::CommunicationDna, 3),
            coverage(profile, Construct::EnergyTopology, 4),
            coverage(profile, Construct::RiskDisposition, 4),
            coverage(profile, Construct::BusinessReality, 2),
            saturate(profile.meta.connected_accounts.len() as f64, 3.0),
            saturate(messages as f64, 50.0),
            saturate(event_days as f64, 7.0),
            saturate(profile.meta.signals_processed as f64, 500.0),
        ];
        Self::from_components(&values, messages, event_days)
    }

    fn from_components(values: &[f64; 9], messages: u64, event_days: usize) -> Self {
        let mut composite: f64 = WEIGHTS
            .iter()
            .zip(values)
            .map(|((_, w), v)| w * v)
            .sum::<f64>()
            * 100.0;
        if messages < SCORE_CAP_MESSAGES_MIN {
            composite = composite.min(SCORE_CAP_MESSAGES);
        }
        if event_days < SCORE_CAP_DAYS_MIN {
            composite = composite.min(SCORE_CAP_DAYS);
        }
        Self {
            composite,
            level: PairingLevel::from_composite(composite),
            components: WEIGHTS
                .iter()
                .zip(values)
                .map(|((k, _), v)| (k.to_string(), *v))
                .collect(),
        }
    }
}
