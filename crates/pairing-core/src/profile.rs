//! The founder profile aggregate and the document it persists as.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::assessment::InstrumentKind;
use crate::calibration::CalibrationParams;
use crate::complement::ComplementVector;
use crate::constants::{ANSWER_HISTORY, DAILY_COUNT_HISTORY, LATENCY_HISTORY, SHIP_HISTORY};
use crate::construct::Construct;
use crate::context_window::ContextWindows;
use crate::dual_track::{DimensionTrack, DualTrackDimension};
use crate::overrides::ProfileOverride;
use crate::ring::Ring;
use crate::score::PairingScore;
use crate::signal::{Answer, AnswerValue};
use crate::time::Timestamp;

/// Bumped whenever the persisted document shape changes. A stored profile
/// with any other version is discarded and rebuilt.
pub const PROFILE_VERSION: u32 = 2;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The seven constructs, one dual-track estimator each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constructs {
    pub action_style: DualTrackDimension,
    pub communication_dna: DualTrackDimension,
    pub energy_topology: DualTrackDimension,
    pub risk_disposition: DualTrackDimension,
    pub business_reality: DualTrackDimension,
    pub temporal_patterns: DualTrackDimension,
    pub cognitive_style: DualTrackDimension,
}

impl Default for Constructs {
    fn default() -> Self {
        let dt = |c: Construct| DualTrackDimension::new(c.dimensions());
        Self {
            action_style: dt(Construct::ActionStyle),
            communication_dna: dt(Construct::CommunicationDna),
            energy_topology: dt(Construct::EnergyTopology),
            risk_disposition: dt(Construct::RiskDisposition),
            business_reality: dt(Construct::BusinessReality),
            temporal_patterns: dt(Construct::TemporalPatterns),
            cognitive_style: dt(Construct::CognitiveStyle),
        }
    }
}

impl Constructs {
    pub fn get(&self, c: Construct) -> &DualTrackDimension {
        match c {
            Construct::ActionStyle => &self.action_style,
            Construct::CommunicationDna => &self.communication_dna,
            Construct::EnergyTopology => &self.energy_topology,
            Construct::RiskDisposition => &self.risk_disposition,
            Construct::BusinessReality => &self.business_reality,
            Construct::TemporalPatterns => &self.temporal_patterns,
            Construct::CognitiveStyle => &self.cognitive_style,
        }
    }

    pub fn get_mut(&mut self, c: Construct) -> &mut DualTrackDimension {
        match c {
            Construct::ActionStyle => &mut self.action_style,
            Construct::CommunicationDna => &mut self.communication_dna,
            Construct::EnergyTopology => &mut self.energy_topology,
            Construct::RiskDisposition => &mut self.risk_disposition,
            Construct::BusinessReality => &mut self.business_reality,
            Construct::TemporalPatterns => &mut self.temporal_patterns,
            Construct::CognitiveStyle => &mut self.cognitive_style,
        }
    }

    pub fn update(&mut self, c: Construct, dim: &str, value: f64) -> Option<&DimensionTrack> {
        self.get_mut(c).update(dim, value)
    }

    pub fn effective(&self, c: Construct, dim: &str) -> Option<f64> {
        self.get(c).effective(dim)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Construct, &DualTrackDimension)> {
        Construct::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

/// Communication style as observed in the founder's own messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservedComm {
    pub directness: f64,
    pub formality: f64,
    pub detail_preference: f64,
    pub emotion_expression: f64,
    pub pace_preference: f64,
    pub decision_style: f64,
    pub messages_analyzed: u64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentAnswer {
    pub instrument_id: String,
    pub question_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<InstrumentKind>,
    pub value: AnswerValue,
    pub answered_at: Timestamp,
}

impl AssessmentAnswer {
    pub fn record(answer: &Answer, answered_at: Timestamp) -> Self {
        Self {
            instrument_id: answer.instrument_id.clone(),
            question_id: answer.question_id.clone(),
            kind: answer.kind,
            value: answer.value.clone(),
            answered_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyLedger {
    pub overall_accuracy: f64,
    pub improvement_vs_day1: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_assessment: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_inference_update: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_behavioral_batch: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_drift_check: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_complement_rebalance: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_context_window_eval: Option<Timestamp>,
    pub total_messages_analyzed: u64,
    pub total_events_analyzed: u64,
    pub total_documents_ingested: u64,
    pub total_state_shifts_detected: u64,
    pub signals_processed: u64,
    pub connected_accounts: Vec<String>,
    pub engine_version: String,
}

impl Meta {
    fn new(now: Timestamp) -> Self {
        Self {
            created_at: now,
            last_assessment: None,
            last_inference_update: None,
            last_behavioral_batch: None,
            last_drift_check: None,
            last_complement_rebalance: None,
            last_context_window_eval: None,
            total_messages_analyzed: 0,
            total_events_analyzed: 0,
            total_documents_ingested: 0,
            total_state_shifts_detected: 0,
            signals_processed: 0,
            connected_accounts: Vec::new(),
            engine_version: ENGINE_VERSION.to_string(),
        }
    }
}

/// Rolling behavioral accumulators fed by event and approval signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "BehaviorDoc", into = "BehaviorDoc")]
pub struct BehaviorLog {
    pub recent_ships: Ring<Timestamp>,
    pub recent_projects: BTreeMap<String, Timestamp>,
    pub approval_latencies: Ring<f64>,
    pub daily_event_counts: BTreeMap<String, u32>,
}

impl Default for BehaviorLog {
    fn default() -> Self {
        Self {
            recent_ships: Ring::new(SHIP_HISTORY),
            recent_projects: BTreeMap::new(),
            approval_latencies: Ring::new(LATENCY_HISTORY),
            daily_event_counts: BTreeMap::new(),
        }
    }
}

impl PartialEq for BehaviorLog {
    fn eq(&self, other: &Self) -> bool {
        self.recent_ships.iter().eq(other.recent_ships.iter())
            && self.recent_projects == other.recent_projects
            && self.approval_latencies.iter().eq(other.approval_latencies.iter())
            && self.daily_event_counts == other.daily_event_counts
    }
}

impl BehaviorLog {
    /// Count one event on `day`, keeping only the most recent days.
    pub fn count_event(&mut self, day: String) {
        *self.daily_event_counts.entry(day).or_insert(0) += 1;
        while self.daily_event_counts.len() > DAILY_COUNT_HISTORY {
            self.daily_event_counts.pop_first();
        }
    }

    /// Record `project` as seen at `at`. The least recently seen project is
    /// forgotten once more than [`SHIP_HISTORY`] are tracked.
    pub fn touch_project(&mut self, project: &str, at: Timestamp) {
        self.recent_projects.insert(project.to_string(), at);
        if self.recent_projects.len() > SHIP_HISTORY {
            let oldest = self
                .recent_projects
                .iter()
                .min_by_key(|(_, t)| **t)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                self.recent_projects.remove(&k);
            }
        }
    }

    /// Projects last seen on the UTC day `day`.
    pub fn projects_on(&self, day: &str) -> usize {
        self.recent_projects
            .values()
            .filter(|t| t.day_key() == day)
            .count()
    }

    /// Ships in the half-open window `(at − hours, at]`.
    pub fn ships_within(&self, at: Timestamp, hours: f64) -> usize {
        let cutoff = at.minus_hours(hours);
        self.recent_ships
            .iter()
            .filter(|t| **t > cutoff && **t <= at)
            .count()
    }

    /// Distinct days with at least one event.
    pub fn event_days(&self) -> usize {
        self.daily_event_counts.len()
    }

    pub fn mean_approval_latency(&self) -> Option<f64> {
        if self.approval_latencies.is_empty() {
            return None;
        }
        Some(self.approval_latencies.iter().sum::<f64>() / self.approval_latencies.len() as f64)
    }
}

#[derive(Serialize, Deserialize, Default)]
struct BehaviorDoc {
    #[serde(default)]
    recent_ships: Vec<Timestamp>,
    #[serde(default)]
    recent_projects: BTreeMap<String, Timestamp>,
    #[serde(default)]
    approval_latencies: Vec<f64>,
    #[serde(default)]
    daily_event_counts: BTreeMap<String, u32>,
}

impl From<BehaviorDoc> for BehaviorLog {
    fn from(doc: BehaviorDoc) -> Self {
        let mut log = BehaviorLog {
            recent_projects: doc.recent_projects,
            daily_event_counts: doc.daily_event_counts,
            ..BehaviorLog::default()
        };
        for t in doc.recent_ships {
            log.recent_ships.push(t);
        }
        for l in doc.approval_latencies {
            log.approval_latencies.push(l);
        }
        log
    }
}

impl From<BehaviorLog> for BehaviorDoc {
    fn from(log: BehaviorLog) -> Self {
        Self {
            recent_ships: log.recent_ships.iter().copied().collect(),
            recent_projects: log.recent_projects,
            approval_latencies: log.approval_latencies.iter().copied().collect(),
            daily_event_counts: log.daily_event_counts,
        }
    }
}

/// The aggregate root. Everything here is persisted as one JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub version: u32,
    pub profile_id: String,
    pub pairing_score: PairingScore,
    #[serde(flatten)]
    pub constructs: Constructs,
    pub observed_comm: ObservedComm,
    #[serde(default)]
    pub self_perception_deltas: BTreeMap<String, f64>,
    pub context_windows: ContextWindows,
    pub complement: ComplementVector,
    pub calibration: CalibrationParams,
    #[serde(default)]
    pub overrides: Vec<ProfileOverride>,
    #[serde(default)]
    pub next_override_id: u64,
    #[serde(default)]
    pub answers: Vec<AssessmentAnswer>,
    #[serde(default)]
    pub accuracy: AccuracyLedger,
    #[serde(default)]
    pub behavior: BehaviorLog,
    pub meta: Meta,
}

impl Profile {
    pub fn new(now: Timestamp) -> Self {
        Self {
            version: PROFILE_VERSION,
            profile_id: uuid::Uuid::new_v4().simple().to_string(),
            pairing_score: PairingScore::default(),
            constructs: Constructs::default(),
            observed_comm: ObservedComm::default(),
            self_perception_deltas: BTreeMap::new(),
            context_windows: ContextWindows::default(),
            complement: ComplementVector::default(),
            calibration: CalibrationParams::default(),
            overrides: Vec::new(),
            next_override_id: 1,
            answers: Vec::new(),
            accuracy: AccuracyLedger::default(),
            behavior: BehaviorLog::default(),
            meta: Meta::new(now),
        }
    }

    /// Days since the profile was created.
    pub fn days_active(&self, now: Timestamp) -> f64 {
        now.days_since(self.meta.created_at)
    }

    pub fn add_connected_account(&mut self, provider: &str) -> bool {
        if self.meta.connected_accounts.iter().any(|a| a == provider) {
            return false;
        }
        self.meta.connected_accounts.push(provider.to_string());
        true
    }

    /// Add an override, assigning the next id.
    pub fn add_override(
        &mut self,
        construct: Construct,
        dimension: &str,
        value: f64,
        reason: &str,
        now: Timestamp,
    ) -> &ProfileOverride {
        self.prune_overrides(now);
        let id = self.next_override_id.max(1);
        self.next_override_id = id + 1;
        let idx = self.overrides.len();
        self.overrides.push(ProfileOverride::new(
            id, construct, dimension, value, reason, now,
        ));
        &self.overrides[idx]
    }

    /// Remove an override by id. Returns whether one was removed.
    pub fn remove_override(&mut self, id: u64) -> bool {
        let before = self.overrides.len();
        self.overrides.retain(|o| o.id != id);
        self.overrides.len() != before
    }

    /// Drop unconfirmed overrides whose weight has decayed past the list floor.
    pub fn prune_overrides(&mut self, now: Timestamp) {
        self.overrides.retain(|o| o.is_listed(now));
    }

    /// Append an answer, dropping the oldest past `ANSWER_HISTORY`.
    pub fn record_answer(&mut self, answer: AssessmentAnswer) {
        self.answers.push(answer);
        if self.answers.len() > ANSWER_HISTORY {
            let excess = self.answers.len() - ANSWER_HISTORY;
            self.answers.drain(..excess);
        }
    }

    /// Overrides that still carry weight, oldest first.
    pub fn active_overrides(&self, now: Timestamp) -> impl Iterator<Item = &ProfileOverride> {
        self.overrides.iter().filter(move |o| o.is_listed(now))
    }

    /// Recompute `self_perception_deltas` from active overrides, keyed
    /// `construct.dimension`.
    pub fn refresh_self_perception(&mut self, now: Timestamp) {
        let deltas = self
            .active_overrides(now)
            .filter_map(|o| {
                self.constructs
                    .effective(o.construct, &o.dimension)
                    .map(|eff| (format!("{}.{}", o.construct, o.dimension), o.gap(eff)))
            })
            .collect();
        self.self_perception_deltas = deltas;
    }
}
