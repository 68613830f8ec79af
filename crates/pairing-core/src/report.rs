//! Query-side reports over a [`Pipeline`]. Every type here serializes to the
//! JSON body of one read endpoint.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::complement::{Allocation, ComplementVector};
use crate::constants::{DRIFT_MILD, DRIFT_REPORT_RECENT, DRIFT_SIGNIFICANT, WINDOW_ACTIVE};
use crate::context_window::WindowKind;
use crate::overrides::{ProfileOverride, interpret_gap};
use crate::pipeline::{DriftEvent, EvidenceEntry, Pipeline, Prediction};
use crate::signal::SignalType;
use crate::summary::{EffectiveProfile, chat_summary};
use crate::time::Timestamp;

pub const EVIDENCE_DEFAULT_LIMIT: usize = 50;
pub const EVIDENCE_MAX_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct EvidencePage {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub evidence: Vec<EvidenceEntry>,
}

impl EvidencePage {
    /// Newest first. `limit` defaults to 50 and is capped at 500; `total`
    /// counts entries matching `filter`.
    pub fn build(
        pipeline: &Pipeline,
        filter: Option<SignalType>,
        offset: usize,
        limit: Option<usize>,
    ) -> Self {
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(EVIDENCE_DEFAULT_LIMIT)
            .min(EVIDENCE_MAX_LIMIT);
        let matching: Vec<&EvidenceEntry> = pipeline
            .evidence()
            .iter_newest()
            .filter(|e| filter.is_none_or(|t| e.signal_type == t))
            .collect();
        Self {
            total: matching.len(),
            offset,
            limit,
            evidence: matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Mild,
    Significant,
}

impl Severity {
    pub fn of(drift: f64) -> Self {
        if drift >= DRIFT_SIGNIFICANT {
            Severity::Significant
        } else if drift >= DRIFT_MILD {
            Severity::Mild
        } else {
            Severity::Normal
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftReading {
    pub drift: f64,
    pub alpha: f64,
    pub severity: Severity,
    #[serde(rename = "trait", skip_serializing_if = "Option::is_none")]
    pub trait_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowReading {
    pub activation: f64,
    pub active: bool,
    pub signal_count: u32,
    pub decay_tau_h: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub drift_readings: BTreeMap<String, BTreeMap<String, DriftReading>>,
    pub context_windows: BTreeMap<WindowKind, WindowReading>,
    pub drift_history: Vec<DriftEvent>,
    pub total_shifts: u64,
}

impl DriftReport {
    pub fn build(pipeline: &Pipeline, now: Timestamp) -> Self {
        let profile = pipeline.profile();
        let drift_readings = profile
            .constructs
            .iter()
            .map(|(c, dt)| {
                let dims = dt
                    .iter()
                    .map(|(dim, t)| {
                        (
                            dim.to_string(),
                            DriftReading {
                                drift: t.drift,
                                alpha: t.alpha,
                                severity: Severity::of(t.drift),
                                trait_value: t.trait_value,
                                state: t.state,
                                effective: t.effective,
                            },
                        )
                    })
                    .collect();
                (c.name().to_string(), dims)
            })
            .collect();

        let context_windows = profile
            .context_windows
            .above(0.01)
            .map(|w| {
                (
                    w.name,
                    WindowReading {
                        activation: w.activation,
                        active: w.is_active(),
                        signal_count: w.signal_count,
                        decay_tau_h: w.decay_tau_hours,
                        activated_at: w.activated_at,
                        active_hours: w.activated_at.map(|t| now.hours_since(t)),
                    },
                )
            })
            .collect();

        Self {
            drift_readings,
            context_windows,
            drift_history: pipeline
                .drift_history()
                .recent(DRIFT_REPORT_RECENT)
                .cloned()
                .collect(),
            total_shifts: profile.meta.total_state_shifts_detected,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplementReport {
    pub complement: ComplementVector,
    pub sorted: Vec<Allocation>,
    pub last_rebalanced: Option<Timestamp>,
    pub description: &'static str,
}

impl ComplementReport {
    pub fn build(pipeline: &Pipeline) -> Self {
        let c = &pipeline.profile().complement;
        Self {
            complement: c.clone(),
            sorted: c.sorted(),
            last_rebalanced: c.last_rebalanced,
            description: "Assistant effort allocation. Higher = founder's bigger gap. Sums to 1.0.",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub predictions: Vec<Prediction>,
}

impl PredictionReport {
    pub fn build(pipeline: &Pipeline) -> Self {
        let predictions: Vec<Prediction> = pipeline.predictions().iter().cloned().collect();
        let total = predictions.len();
        let correct = predictions.iter().filter(|p| p.correct).count();
        Self {
            total,
            correct,
            accuracy: if total > 0 {
                correct as f64 / total as f64
            } else {
                0.0
            },
            predictions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Gap {
    pub delta: f64,
    pub interpretation: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveContext {
    pub window: WindowKind,
    pub activation: f64,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Insights {
    pub effective_profile: EffectiveProfile,
    pub self_perception_gaps: BTreeMap<String, Gap>,
    pub active_contexts: Vec<ActiveContext>,
    pub chat_summary: String,
}

impl Insights {
    pub fn build(pipeline: &Pipeline, now: Timestamp) -> Self {
        let profile = pipeline.profile();
        let effective_profile = EffectiveProfile::build(profile, now);
        let chat_summary = chat_summary(&effective_profile);
        Self {
            self_perception_gaps: profile
                .self_perception_deltas
                .iter()
                .map(|(k, &delta)| {
                    (
                        k.clone(),
                        Gap {
                            delta,
                            interpretation: interpret_gap(delta),
                        },
                    )
                })
                .collect(),
            active_contexts: profile
                .context_windows
                .iter()
                .filter(|w| w.activation >= WINDOW_ACTIVE)
                .map(|w| ActiveContext {
                    window: w.name,
                    activation: w.activation,
                    description: w.name.description(),
                })
                .collect(),
            effective_profile,
            chat_summary,
        }
    }
}

/// An override as listed to the founder.
#[derive(Debug, Clone, Serialize)]
pub struct OverrideView {
    #[serde(flatten)]
    pub entry: ProfileOverride,
    pub weight: f64,
    pub age_days: f64,
}

pub fn list_overrides(pipeline: &Pipeline, now: Timestamp) -> Vec<OverrideView> {
    pipeline
        .profile()
        .active_overrides(now)
        .map(|o| OverrideView {
            entry: o.clone(),
            weight: o.weight(now),
            age_days: o.age_days(now),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::Construct;
    use crate::profile::Profile;
    use crate::signal::{EventDetails, Signal};
    use approx::assert_relative_eq;

    const T0: Timestamp = Timestamp::from_unix(1_771_632_000);

    fn with_events(n: usize) -> Pipeline {
        let mut p = Pipeline::new(Profile::new(T0));
        for i in 0..n {
            let at = T0.plus_hours(i as f64);
            p.process(
                Signal::event(EventDetails::new("TASK_STARTED"), "scoreboard", at),
                at,
            );
        }
        p
    }

    #[test]
    fn test_evidence_newest_first_with_paging() {
        let p = with_events(5);
        let page = EvidencePage::build(&p, None, 1, Some(2));
        assert_eq!(page.total, 5);
        let ids: Vec<u64> = page.evidence.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn test_evidence_filter_and_limits() {
        let p = with_events(3);
        let page = EvidencePage::build(&p, Some(SignalType::Message), 0, None);
        assert_eq!(page.total, 0);
        assert_eq!(page.limit, 50);
        assert_eq!(EvidencePage::build(&p, None, 0, Some(9999)).limit, 500);
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(Severity::of(0.5), Severity::Normal);
        assert_eq!(Severity::of(1.0), Severity::Mild);
        assert_eq!(Severity::of(2.0), Severity::Significant);
    }

    #[test]
    fn test_drift_report_covers_all_constructs() {
        let p = with_events(1);
        let r = DriftReport::build(&p, T0);
        assert_eq!(r.drift_readings.len(), 7);
        assert!(r.drift_readings["temporal_patterns"]["peak_hour"].effective.is_some());
        assert!(r.context_windows.is_empty());
    }

    #[test]
    fn test_prediction_report_accuracy() {
        let p = with_events(3);
        let r = PredictionReport::build(&p);
        assert_eq!(r.total, 2);
        assert_eq!(r.correct, 2);
        assert_relative_eq!(r.accuracy, 1.0);
    }

    #[test]
    fn test_override_listing_carries_weight() {
        let mut p = Pipeline::new(Profile::new(T0));
        p.add_override(Construct::ActionStyle, "QS", 7.0, "", T0);
        let list = list_overrides(&p, T0);
        assert_eq!(list.len(), 1);
        assert_relative_eq!(list[0].weight, 0.30);
        let v = serde_json::to_value(&list[0]).unwrap();
        assert_eq!(v["trait"], "action_style");
        assert_eq!(v["id"], 1);
    }

    #[test]
    fn test_insights_report_gaps() {
        let mut p = with_events(1);
        let now = T0;
        p.add_override(Construct::TemporalPatterns, "peak_hour", 3.0, "", now);
        let i = Insights::build(&p, now);
        let gap = &i.self_perception_gaps["temporal_patterns.peak_hour"];
        assert_relative_eq!(gap.delta, 3.0);
        assert_eq!(gap.interpretation, "you rate yourself higher than behavior shows");
    }
}
