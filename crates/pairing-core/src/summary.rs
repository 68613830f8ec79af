//! Read-side views of a profile: the blended effective view and the short
//! text digest injected into chat and pushed to memory stores.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::accuracy;
use crate::calibration::CalibrationParams;
use crate::complement::ComplementVector;
use crate::constants::{SCORE_CALIBRATED_MIN, WINDOW_ACTIVE};
use crate::construct::Construct;
use crate::context_window::WindowKind;
use crate::profile::Profile;
use crate::score::PairingLevel;
use crate::time::Timestamp;

/// Effective values per construct, with active overrides blended in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveProfile {
    pub action_style: BTreeMap<String, f64>,
    pub disc: BTreeMap<String, f64>,
    pub energy: BTreeMap<String, f64>,
    pub risk: BTreeMap<String, f64>,
    pub cognitive: BTreeMap<String, f64>,
    pub business: BTreeMap<String, f64>,
    pub temporal: BTreeMap<String, f64>,
    pub complement: ComplementVector,
    pub calibration: CalibrationParams,
    pub active_contexts: Vec<WindowKind>,
    pub pairing_score: f64,
    pub level: PairingLevel,
    pub accuracy: f64,
}

impl EffectiveProfile {
    pub fn build(profile: &Profile, now: Timestamp) -> Self {
        let mut maps: BTreeMap<Construct, BTreeMap<String, f64>> = profile
            .constructs
            .iter()
            .map(|(c, dt)| (c, dt.effective_map()))
            .collect();

        // With no behavioral value yet, the founder's own assertion stands.
        for o in profile.active_overrides(now) {
            if let Some(map) = maps.get_mut(&o.construct) {
                let blended = match map.get(&o.dimension) {
                    Some(&eff) => o.blend(eff, now),
                    None => o.value,
                };
                map.insert(o.dimension.clone(), blended);
            }
        }
        let mut take = |c: Construct| maps.remove(&c).unwrap_or_default();

        Self {
            action_style: take(Construct::ActionStyle),
            disc: take(Construct::CommunicationDna),
            energy: take(Construct::EnergyTopology),
            risk: take(Construct::RiskDisposition),
            cognitive: take(Construct::CognitiveStyle),
            business: take(Construct::BusinessReality),
            temporal: take(Construct::TemporalPatterns),
            complement: profile.complement.clone(),
            calibration: profile.calibration.clone(),
            active_contexts: profile
                .context_windows
                .above(WINDOW_ACTIVE)
                .map(|w| w.name)
                .collect(),
            pairing_score: profile.pairing_score.composite,
            level: profile.pairing_score.level,
            accuracy: accuracy::accuracy(profile, now),
        }
    }
}

/// What the outbound sync worker pushes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileDigest {
    pub summary: String,
    pub composite: f64,
    pub level: PairingLevel,
    pub accuracy: f64,
}

pub fn digest(profile: &Profile, now: Timestamp) -> ProfileDigest {
    let eff = EffectiveProfile::build(profile, now);
    ProfileDigest {
        summary: chat_summary(&eff),
        composite: eff.pairing_score,
        level: eff.level,
        accuracy: eff.accuracy,
    }
}

const DISC_NAMES: [(&str, &str); 4] = [
    ("D", "Driver"),
    ("I", "Influencer"),
    ("S", "Steady"),
    ("C", "Analytical"),
];

/// A few lines describing the founder and how to work with them.
pub fn chat_summary(eff: &EffectiveProfile) -> String {
    if eff.pairing_score < SCORE_CALIBRATED_MIN {
        return "Founder profile: Not yet calibrated. Run pairing assessment first.".to_string();
    }
    let mut lines = Vec::new();

    let (primary, max) = DISC_NAMES
        .iter()
        .filter_map(|(k, name)| eff.disc.get(*k).map(|v| (*name, *v)))
        .fold(("unknown", 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
    let action = if eff.action_style.get("QS").is_some_and(|v| *v > 6.0) {
        Some("high Quick Start")
    } else if eff.action_style.get("FF").is_some_and(|v| *v > 6.0) {
        Some("high Fact Finder")
    } else {
        None
    };
    let mut founder = format!("Founder: {primary}-primary ({:.0}%)", max * 10.0);
    if let Some(a) = action {
        founder.push_str(", ");
        founder.push_str(a);
    }
    lines.push(founder);

    let comm = &eff.calibration.communication;
    lines.push(format!(
        "Communication: {} first, {}-word max, formality={:.0}%",
        comm.lead_with,
        comm.max_message_words,
        comm.tone_formality * 100.0
    ));

    let positive = |k: &str| eff.business.get(k).copied().filter(|v| *v > 0.0);
    let mut biz = Vec::new();
    if let Some(d) = positive("debt_pressure") {
        if d >= 7.0 {
            biz.push("heavy debt pressure");
        } else if d >= 4.0 {
            biz.push("some debt");
        }
    }
    if let Some(t) = positive("team_size") {
        biz.push(if t <= 2.0 { "solo operator" } else { "has team" });
    }
    if let Some(b) = positive("bottleneck") {
        biz.push(if b <= 4.0 {
            "bottleneck=shipping"
        } else if b <= 6.0 {
            "bottleneck=distribution"
        } else {
            "bottleneck=revenue"
        });
    }
    if !biz.is_empty() {
        lines.push(format!("Business: {}", biz.join(", ")));
    }

    let top: Vec<String> = eff
        .complement
        .top(3)
        .into_iter()
        .map(|(a, phrase)| format!("{}: {phrase}", a.name))
        .collect();
    if !top.is_empty() {
        lines.push(format!("Complement priorities: {}", top.join("; ")));
    }

    lines.push(format!(
        "Calibration: {} first, {}-word max, nudge every {:.0}h, {} planning",
        comm.lead_with,
        comm.max_message_words,
        eff.calibration.accountability.nudge_frequency_hours,
        eff.calibration.recommendations.planning_depth
    ));

    if !eff.active_contexts.is_empty() {
        let names: Vec<&str> = eff.active_contexts.iter().map(|k| k.name()).collect();
        lines.push(format!("Active contexts: {}", names.join(", ")));
    }

    lines.push(format!(
        "Pairing: {:.0}/100 ({}) | Accuracy: {:.0}%",
        eff.pairing_score,
        eff.level,
        eff.accuracy * 100.0
    ));
    lines.join("\n")
}
