//! The per-signal inference pipeline.
//!
//! [`Pipeline`] owns the profile and the bounded in-memory logs (evidence,
//! drift history, predictions). [`Pipeline::process`] applies one signal in
//! a fixed order:
//!
//! 1. merge features (text signals are expected to arrive pre-extracted, see
//!    [`extract_features`])
//! 2. open an evidence entry
//! 3. dispatch to the updater for the signal's kind
//! 4. detect drift across every construct
//! 5. decay the context windows and record the active ones
//! 6. rebalance the complement vector
//! 7. derive calibration
//! 8. finalize and append the evidence entry
//! 9. update meta counters, the composite score and accuracy
//!
//! Nothing here reads the clock or logs; callers pass `now` and surface the
//! returned warnings.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::accuracy::{self, improvement_vs_day1};
use crate::assessment;
use crate::calibration::CalibrationParams;
use crate::constants::{
    CADENCE_MIN_SHIPS, CONTEXT_EXPLOSION_PROJECTS, DRIFT_HISTORY, DRIFT_SIGNIFICANT,
    EVIDENCE_CAPACITY, FAST_APPROVAL_SECS, KEYWORD_WINDOW_THRESHOLD, OBSERVED_COMM_LAMBDA,
    PEAK_HOUR_TOLERANCE, PREDICTION_CAPACITY, SCALE_MAX, SHIP_WINDOW_HOURS, SPRINT_SHIPS,
    STALL_AFTER_HOURS, STALL_RECOVERY_FACTOR, STALL_SATURATE_HOURS, WINDOW_ACTIVE,
};
use crate::construct::Construct;
use crate::context_window::WindowKind;
use crate::lexical::{FeatureExtractor, Features, LexicalExtractor};
use crate::overrides::{ProfileOverride, Verdict};
use crate::profile::{AssessmentAnswer, Profile};
use crate::ring::Ring;
use crate::score::PairingScore;
use crate::signal::{
    AccountSnapshot, Answer, ApprovalAction, ApprovalDecision, EventDetails, Signal, SignalKind,
    SignalType,
};
use crate::summary::{self, ProfileDigest};
use crate::time::Timestamp;

/// Audit record of what one signal changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceEntry {
    pub id: u64,
    pub timestamp: Timestamp,
    pub signal_type: SignalType,
    pub source: String,
    pub summary: String,
    pub features_extracted: Features,
    pub profile_impact: BTreeMap<String, f64>,
    pub constructs_affected: Vec<Construct>,
}

impl EvidenceEntry {
    fn open(id: u64, signal: &Signal) -> Self {
        Self {
            id,
            timestamp: signal.occurred_at,
            signal_type: signal.signal_type(),
            source: signal.source.clone(),
            summary: String::new(),
            features_extracted: signal.features.clone(),
            profile_impact: BTreeMap::new(),
            constructs_affected: Vec::new(),
        }
    }

    fn touch(&mut self, construct: Construct) {
        if !self.constructs_affected.contains(&construct) {
            self.constructs_affected.push(construct);
        }
    }
}

/// A dimension whose drift crossed the significance threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftEvent {
    pub id: u64,
    pub timestamp: Timestamp,
    pub construct: Construct,
    pub dimension: String,
    pub magnitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<WindowKind>,
}

/// A prediction the engine made and how it resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub id: u64,
    pub timestamp: Timestamp,
    pub parameter: String,
    pub predicted: f64,
    pub actual: f64,
    pub error: f64,
    pub correct: bool,
}

/// Result of processing one signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutcome {
    pub evidence_id: u64,
    /// Skipped classifications, for the caller to log.
    pub warnings: Vec<String>,
    /// Present after assessment signals: the digest to push outbound.
    pub sync: Option<ProfileDigest>,
}

/// Lexical features for a text signal, plus `disc_*` proportions for
/// messages. Empty for every other kind.
pub fn extract_features(extractor: &dyn FeatureExtractor, signal: &Signal) -> Features {
    let text = signal.text();
    if text.is_empty() {
        return Features::new();
    }
    match signal.kind {
        SignalKind::Message => {
            let mut features = extractor.extract(text);
            let disc = LexicalExtractor::infer_disc(&features);
            for (k, v) in disc {
                features.insert(format!("disc_{k}"), v);
            }
            features
        }
        SignalKind::Document => extractor.extract(text),
        _ => Features::new(),
    }
}

/// Circular distance between two hours of the day.
fn hour_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs() % 24.0;
    d.min(24.0 - d)
}

pub struct Pipeline {
    profile: Profile,
    evidence: Ring<EvidenceEntry>,
    drift_history: Ring<DriftEvent>,
    predictions: Ring<Prediction>,
    dirty: bool,
}

impl Pipeline {
    pub fn new(profile: Profile) -> Self {
        Self::with_capacity(profile, EVIDENCE_CAPACITY)
    }

    pub fn with_capacity(profile: Profile, evidence_capacity: usize) -> Self {
        Self {
            profile,
            evidence: Ring::new(evidence_capacity),
            drift_history: Ring::new(DRIFT_HISTORY),
            predictions: Ring::new(PREDICTION_CAPACITY),
            dirty: false,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn evidence(&self) -> &Ring<EvidenceEntry> {
        &self.evidence
    }

    pub fn drift_history(&self) -> &Ring<DriftEvent> {
        &self.drift_history
    }

    pub fn predictions(&self) -> &Ring<Prediction> {
        &self.predictions
    }

    /// Whether anything changed since the last [`Pipeline::mark_saved`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Apply one signal. Never fails; skipped answers come back as warnings.
    pub fn process(&mut self, signal: Signal, now: Timestamp) -> ProcessOutcome {
        let mut warnings = Vec::new();
        let mut ev = EvidenceEntry::open(self.evidence.total_pushed() + 1, &signal);

        match &signal.kind {
            SignalKind::Message => self.on_message(&signal, &mut ev, now),
            SignalKind::Event(details) => {
                self.on_event(details, signal.occurred_at, &mut ev, now)
            }
            SignalKind::Assessment(answers) => {
                self.on_assessment(answers, &mut ev, &mut warnings, now)
            }
            SignalKind::Approval(decision) => self.on_approval(decision, &mut ev),
            SignalKind::Document => self.on_document(&signal, &mut ev),
            SignalKind::Account(snapshot) => self.on_account(snapshot, &mut ev),
        }
        if signal.signal_type() != SignalType::Assessment {
            self.check_overrides();
        }
        self.profile.refresh_self_perception(now);

        self.detect_drift(&mut ev, now);
        self.evaluate_windows(&mut ev, now);
        self.rebalance_complement(now);
        self.recalibrate();

        ev.summary = summarize(&signal);
        let evidence_id = ev.id;
        self.evidence.push(ev);

        self.profile.meta.signals_processed += 1;
        self.rescore(now);
        self.dirty = true;

        let sync = (signal.signal_type() == SignalType::Assessment)
            .then(|| summary::digest(&self.profile, now));
        ProcessOutcome {
            evidence_id,
            warnings,
            sync,
        }
    }

    /// Periodic upkeep with no signal: decay windows, re-derive calibration,
    /// recompute score and accuracy. Marks the profile dirty only when one of
    /// those actually moved; bookkeeping timestamps alone don't count.
    pub fn maintain(&mut self, now: Timestamp) {
        let before = (
            self.profile.context_windows.clone(),
            self.profile.calibration.clone(),
            self.profile.pairing_score.clone(),
            self.profile.accuracy.overall_accuracy,
            self.profile.self_perception_deltas.clone(),
            self.profile.overrides.len(),
        );
        self.profile.context_windows.decay_all(now);
        self.profile.meta.last_context_window_eval = Some(now);
        self.recalibrate();
        self.profile.prune_overrides(now);
        self.profile.refresh_self_perception(now);
        self.rescore(now);

        let p = &self.profile;
        let changed = before.0 != p.context_windows
            || before.1 != p.calibration
            || before.2 != p.pairing_score
            || before.3 != p.accuracy.overall_accuracy
            || before.4 != p.self_perception_deltas
            || before.5 != p.overrides.len();
        if changed {
            self.dirty = true;
        }
    }

    /// Replace the profile wholesale and clear every log.
    pub fn reset(&mut self, now: Timestamp) {
        self.profile = Profile::new(now);
        self.evidence.clear();
        self.drift_history.clear();
        self.predictions.clear();
        self.dirty = true;
    }

    /// Swap in an externally loaded profile (import). Logs are cleared.
    pub fn replace_profile(&mut self, profile: Profile) {
        self.profile = profile;
        self.evidence.clear();
        self.drift_history.clear();
        self.predictions.clear();
        self.dirty = true;
    }

    pub fn add_override(
        &mut self,
        construct: Construct,
        dimension: &str,
        value: f64,
        reason: &str,
        now: Timestamp,
    ) -> ProfileOverride {
        let o = self
            .profile
            .add_override(construct, dimension, value, reason, now)
            .clone();
        self.profile.refresh_self_perception(now);
        self.dirty = true;
        o
    }

    pub fn remove_override(&mut self, id: u64, now: Timestamp) -> bool {
        let removed = self.profile.remove_override(id);
        if removed {
            self.profile.refresh_self_perception(now);
            self.dirty = true;
        }
        removed
    }

    fn observe(&mut self, ev: &mut EvidenceEntry, construct: Construct, dim: &str, value: f64) {
        let before = self.profile.constructs.effective(construct, dim);
        let Some(after) = self
            .profile
            .constructs
            .update(construct, dim, value)
            .and_then(|t| t.effective)
        else {
            return;
        };
        *ev.profile_impact
            .entry(format!("{construct}.{dim}"))
            .or_insert(0.0) += after - before.unwrap_or(0.0);
        ev.touch(construct);
    }

    fn signal_window(&mut self, ev: &mut EvidenceEntry, kind: WindowKind, strength: f64, now: Timestamp) {
        self.profile.context_windows.signal(kind, strength, now);
        *ev.profile_impact
            .entry(format!("window.{kind}"))
            .or_insert(0.0) += strength;
    }

    fn on_message(&mut self, signal: &Signal, ev: &mut EvidenceEntry, now: Timestamp) {
        if signal.text().is_empty() {
            return;
        }
        self.profile.meta.total_messages_analyzed += 1;
        self.profile.meta.last_inference_update = Some(now);
        let f = &signal.features;

        for dim in ["D", "I", "S", "C"] {
            if let Some(v) = f.get(&format!("disc_{dim}")) {
                self.observe(ev, Construct::CommunicationDna, dim, v * SCALE_MAX);
            }
        }

        let oc = &mut self.profile.observed_comm;
        oc.messages_analyzed += 1;
        let ema = |prev: f64, key: &str| match f.get(key) {
            Some(v) => prev * (1.0 - OBSERVED_COMM_LAMBDA) + v * OBSERVED_COMM_LAMBDA,
            None => prev,
        };
        oc.directness = ema(oc.directness, "directness");
        oc.formality = ema(oc.formality, "formality");
        oc.detail_preference = ema(oc.detail_preference, "detail_preference");
        oc.emotion_expression = ema(oc.emotion_expression, "emotion_expression");
        oc.pace_preference = ema(oc.pace_preference, "pace_preference");
        oc.decision_style = ema(oc.decision_style, "decision_style");
        oc.confidence = (oc.messages_analyzed as f64 / 200.0).min(1.0);

        if let Some(&v) = f.get("holistic_vs_sequential") {
            self.observe(ev, Construct::CognitiveStyle, "holistic", v * SCALE_MAX);
            self.observe(ev, Construct::CognitiveStyle, "sequential", (1.0 - v) * SCALE_MAX);
        }
        if let Some(&v) = f.get("abstract_vs_concrete") {
            self.observe(ev, Construct::CognitiveStyle, "abstract", v * SCALE_MAX);
            self.observe(ev, Construct::CognitiveStyle, "concrete", (1.0 - v) * SCALE_MAX);
        }

        for (key, kind) in [
            ("financial_pressure", WindowKind::FinancialPressure),
            ("life_event", WindowKind::LifeEvent),
        ] {
            if let Some(&v) = f.get(key).filter(|v| **v > KEYWORD_WINDOW_THRESHOLD) {
                self.signal_window(ev, kind, v, now);
            }
        }
    }

    fn on_event(&mut self, details: &EventDetails, at: Timestamp, ev: &mut EvidenceEntry, now: Timestamp) {
        self.profile.meta.total_events_analyzed += 1;
        self.profile.meta.last_behavioral_batch = Some(now);

        let is_ship = details.is_ship();
        let behavior = &mut self.profile.behavior;
        if is_ship {
            behavior.recent_ships.push(at);
        }
        if let Some(project) = details.project.as_deref().filter(|p| !p.is_empty()) {
            behavior.touch_project(project, at);
        }
        let day = at.day_key();
        behavior.count_event(day.clone());

        let hour = f64::from(at.hour_of_day());
        if let Some(predicted) = self
            .profile
            .constructs
            .effective(Construct::TemporalPatterns, "peak_hour")
        {
            let error = hour_distance(predicted, hour);
            self.predictions.push(Prediction {
                id: self.predictions.total_pushed() + 1,
                timestamp: at,
                parameter: "peak_hour".to_string(),
                predicted,
                actual: hour,
                error,
                correct: error <= PEAK_HOUR_TOLERANCE,
            });
        }
        self.observe(ev, Construct::TemporalPatterns, "peak_hour", hour);

        if is_ship && self.profile.behavior.recent_ships.len() >= CADENCE_MIN_SHIPS {
            let recent = self.profile.behavior.ships_within(at, SHIP_WINDOW_HOURS);
            if recent >= SPRINT_SHIPS {
                self.signal_window(ev, WindowKind::ShippingSprint, 0.5, now);
            }
            self.observe(
                ev,
                Construct::ActionStyle,
                "QS",
                (recent as f64 * 1.5).min(SCALE_MAX),
            );
        }

        if self.profile.behavior.projects_on(&day) >= CONTEXT_EXPLOSION_PROJECTS {
            self.signal_window(ev, WindowKind::ContextExplosion, 0.4, now);
        }

        if details.lane.as_deref() == Some("revenue") {
            if let Some(amount) = details.amount.filter(|a| *a > 0.0) {
                self.observe(
                    ev,
                    Construct::BusinessReality,
                    "revenue_maturity",
                    (amount / 100.0).min(SCALE_MAX),
                );
            }
        }

        if let Some(&last_ship) = self.profile.behavior.recent_ships.last() {
            let hours = at.hours_since(last_ship);
            if hours > STALL_AFTER_HOURS {
                let strength = (hours / STALL_SATURATE_HOURS).min(1.0);
                self.signal_window(ev, WindowKind::Stall, strength, now);
            } else if self.profile.context_windows.activation(WindowKind::Stall) > WINDOW_ACTIVE {
                self.signal_window(ev, WindowKind::RecoveryPeriod, 0.5, now);
                self.profile
                    .context_windows
                    .get_mut(WindowKind::Stall)
                    .dampen(STALL_RECOVERY_FACTOR);
            }
        }

        if details.is_celebration() {
            self.signal_window(ev, WindowKind::Celebration, 0.6, now);
        }
    }

    fn on_assessment(
        &mut self,
        answers: &[Answer],
        ev: &mut EvidenceEntry,
        warnings: &mut Vec<String>,
        now: Timestamp,
    ) {
        self.profile.meta.last_assessment = Some(now);
        for answer in answers {
            self.profile
                .record_answer(AssessmentAnswer::record(answer, now));
            match assessment::score(answer) {
                Ok((_, scores)) => {
                    for s in scores {
                        self.observe(ev, s.construct, s.dimension, s.value);
                    }
                }
                Err(why) => warnings.push(format!(
                    "skipped answer instrument={} question={}: {why}",
                    answer.instrument_id, answer.question_id
                )),
            }
        }
    }

    fn on_approval(&mut self, decision: &ApprovalDecision, ev: &mut EvidenceEntry) {
        if let Some(latency) = decision.latency_seconds.filter(|l| *l > 0.0) {
            self.profile.behavior.approval_latencies.push(latency);
        }
        let fast = decision
            .latency_seconds
            .is_none_or(|l| l < FAST_APPROVAL_SECS);
        match decision.action {
            ApprovalAction::Approve if fast => {
                self.observe(ev, Construct::ActionStyle, "QS", 8.0);
            }
            ApprovalAction::Reject => {
                self.observe(ev, Construct::EnergyTopology, "D_disc", 8.0);
            }
            _ => {}
        }
    }

    fn on_document(&mut self, signal: &Signal, ev: &mut EvidenceEntry) {
        self.profile.meta.total_documents_ingested += 1;
        let f = &signal.features;
        if let Some(&v) = f.get("vocabulary_richness") {
            self.observe(ev, Construct::CognitiveStyle, "abstract", v * SCALE_MAX);
        }
        if let Some(&v) = f.get("list_usage") {
            self.observe(ev, Construct::CognitiveStyle, "sequential", v * SCALE_MAX);
        }
    }

    fn on_account(&mut self, snapshot: &AccountSnapshot, ev: &mut EvidenceEntry) {
        self.profile.add_connected_account(&snapshot.provider);
        match snapshot.provider.as_str() {
            "stripe" => {
                if let Some(rev) = snapshot.monthly_revenue {
                    self.observe(
                        ev,
                        Construct::BusinessReality,
                        "revenue_maturity",
                        (rev / 1000.0).min(SCALE_MAX),
                    );
                }
            }
            "github" => {
                if let Some(commits) = snapshot.weekly_commits {
                    self.observe(
                        ev,
                        Construct::ActionStyle,
                        "IM",
                        (commits / 5.0).min(SCALE_MAX),
                    );
                }
            }
            _ => {}
        }
    }

    fn check_overrides(&mut self) {
        let constructs = &self.profile.constructs;
        for o in self.profile.overrides.iter_mut().filter(|o| !o.is_resolved()) {
            if let Some(eff) = constructs.effective(o.construct, &o.dimension) {
                if o.check(eff) != Verdict::Undecided {
                    self.dirty = true;
                }
            }
        }
    }

    fn detect_drift(&mut self, ev: &mut EvidenceEntry, now: Timestamp) {
        self.profile.meta.last_drift_check = Some(now);
        let context = self
            .profile
            .context_windows
            .above(WINDOW_ACTIVE)
            .next()
            .map(|w| w.name);

        let mut shifts = Vec::new();
        for (construct, dt) in self.profile.constructs.iter() {
            for (dim, track) in dt.iter() {
                if track.drift >= DRIFT_SIGNIFICANT {
                    shifts.push((construct, dim.to_string(), track.drift));
                }
            }
        }
        for (construct, dimension, magnitude) in shifts {
            ev.profile_impact
                .insert(format!("drift.{construct}.{dimension}"), magnitude);
            self.drift_history.push(DriftEvent {
                id: self.drift_history.total_pushed() + 1,
                timestamp: now,
                construct,
                dimension,
                magnitude,
                context,
            });
            self.profile.meta.total_state_shifts_detected += 1;
        }
    }

    fn evaluate_windows(&mut self, ev: &mut EvidenceEntry, now: Timestamp) {
        let windows = &mut self.profile.context_windows;
        windows.decay_all(now);
        self.profile.meta.last_context_window_eval = Some(now);
        for w in self.profile.context_windows.above(WINDOW_ACTIVE) {
            ev.profile_impact
                .insert(format!("context.{}", w.name), w.activation);
        }
    }

    fn rebalance_complement(&mut self, now: Timestamp) {
        let c = &self.profile.constructs;
        let complement = &mut self.profile.complement;
        complement.rebalance(
            &c.action_style.effective_map(),
            &c.energy_topology.effective_map(),
            now,
        );
        complement.adjust_from_secondary(
            &c.risk_disposition.effective_map(),
            &c.cognitive_style.effective_map(),
            &c.business_reality.effective_map(),
            &c.temporal_patterns.effective_map(),
        );
        self.profile.meta.last_complement_rebalance = Some(now);
    }

    fn recalibrate(&mut self) {
        let p = &self.profile;
        self.profile.calibration =
            CalibrationParams::derive(&p.observed_comm, &p.constructs, &p.context_windows);
    }

    fn rescore(&mut self, now: Timestamp) {
        self.profile.pairing_score = PairingScore::compute(&self.profile);
        let a = accuracy::accuracy(&self.profile, now);
        let ledger = &mut self.profile.accuracy;
        ledger.overall_accuracy = a;
        ledger.improvement_vs_day1 = improvement_vs_day1(a);
        ledger.last_updated = Some(now);
    }
}

fn summarize(signal: &Signal) -> String {
    match &signal.kind {
        SignalKind::Message => {
            format!("Chat message ({} words)", signal.text().split_whitespace().count())
        }
        SignalKind::Event(d) => format!("Scoreboard event: {}", d.event_type),
        SignalKind::Assessment(_) => "Assessment answers submitted".to_string(),
        SignalKind::Approval(d) => format!("Event {}", d.action.as_str()),
        SignalKind::Document => format!("Document ingested ({} chars)", signal.text().len()),
        SignalKind::Account(a) => format!("Account data from {}", a.provider),
    }
}
