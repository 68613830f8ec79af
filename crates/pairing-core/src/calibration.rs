//! Behavior knobs derived from the profile.
//!
//! `derive` always starts from the neutral defaults and layers the rules on
//! top in a fixed order; later rules may overwrite earlier ones for the same
//! field. Context windows above 0.5 apply last. Their adjustments add onto
//! whatever the earlier layers produced and are clamped, so several active
//! windows compose instead of replacing each other.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{OBSERVED_COMM_MIN_MESSAGES, WINDOW_OVERRIDE};
use crate::construct::Construct;
use crate::context_window::{ContextWindows, WindowKind};
use crate::profile::{Constructs, ObservedComm};

macro_rules! label_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

label_enum!(LeadWith {
    Recommendation => "recommendation",
    Data => "data",
    Vision => "vision",
    Context => "context",
});

label_enum!(QuestionFrequency {
    Low => "low",
    Moderate => "moderate",
    High => "high",
});

label_enum!(PlanningDepth {
    Minimal => "minimal",
    Moderate => "moderate",
    Detailed => "detailed",
});

label_enum!(RiskFraming {
    Optimistic => "optimistic",
    Balanced => "balanced",
    Cautious => "cautious",
});

label_enum!(TaskType {
    GeniusWork => "genius_work",
    FrustrationWork => "frustration_work",
    Shipping => "shipping",
    Distribution => "distribution",
    Revenue => "revenue",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationParams {
    pub max_message_words: u32,
    pub lead_with: LeadWith,
    pub tone_formality: f64,
    pub emoji_mirror_ratio: f64,
    pub question_frequency: QuestionFrequency,
    pub celebration_intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountabilityParams {
    pub nudge_frequency_hours: f64,
    pub nudge_intensity: f64,
    pub deadline_pressure: f64,
    pub streak_emphasis: f64,
    pub stall_intervention_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationParams {
    pub options_presented: u32,
    pub data_density: f64,
    pub planning_depth: PlanningDepth,
    pub risk_framing: RiskFraming,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProactiveParams {
    pub standup_hour: u32,
    pub peak_task_type: TaskType,
    pub offpeak_task_type: TaskType,
    pub intervention_threshold_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub communication: CommunicationParams,
    pub accountability: AccountabilityParams,
    pub recommendations: RecommendationParams,
    pub proactive: ProactiveParams,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            communication: CommunicationParams {
                max_message_words: 300,
                lead_with: LeadWith::Recommendation,
                tone_formality: 0.5,
                emoji_mirror_ratio: 0.5,
                question_frequency: QuestionFrequency::Moderate,
                celebration_intensity: 0.5,
            },
            accountability: AccountabilityParams {
                nudge_frequency_hours: 8.0,
                nudge_intensity: 0.5,
                deadline_pressure: 0.5,
                streak_emphasis: 0.5,
                stall_intervention_hours: 8.0,
            },
            recommendations: RecommendationParams {
                options_presented: 2,
                data_density: 0.5,
                planning_depth: PlanningDepth::Moderate,
                risk_framing: RiskFraming::Balanced,
            },
            proactive: ProactiveParams {
                standup_hour: 8,
                peak_task_type: TaskType::GeniusWork,
                offpeak_task_type: TaskType::FrustrationWork,
                intervention_threshold_hours: 8.0,
            },
        }
    }
}

fn clamp_unit(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

impl CalibrationParams {
    pub fn derive(
        observed: &ObservedComm,
        constructs: &Constructs,
        windows: &ContextWindows,
    ) -> Self {
        let mut cal = Self::default();
        let comm = &mut cal.communication;
        let acc = &mut cal.accountability;
        let rec = &mut cal.recommendations;
        let pro = &mut cal.proactive;

        if observed.messages_analyzed > OBSERVED_COMM_MIN_MESSAGES {
            if observed.directness > 0.65 {
                comm.max_message_words = 200;
                comm.lead_with = LeadWith::Recommendation;
            } else if observed.directness < 0.35 {
                comm.max_message_words = 500;
                comm.lead_with = LeadWith::Context;
            }
            comm.tone_formality = observed.formality;
            comm.emoji_mirror_ratio = observed.emotion_expression;
            comm.celebration_intensity = observed.emotion_expression;
        }

        let disc = constructs.get(Construct::CommunicationDna);
        if let (Some(d), Some(c)) = (disc.effective("D"), disc.effective("C")) {
            if d > c && d > 6.0 {
                comm.lead_with = LeadWith::Recommendation;
                comm.question_frequency = QuestionFrequency::Low;
            } else if c > d && c > 6.0 {
                comm.lead_with = LeadWith::Data;
                comm.question_frequency = QuestionFrequency::Moderate;
            }
        }

        let temporal = constructs.get(Construct::TemporalPatterns);
        if let Some(peak) = temporal.effective("peak_hour") {
            pro.standup_hour = if peak >= 20.0 || peak <= 4.0 {
                11
            } else if (5.0..=8.0).contains(&peak) {
                7
            } else {
                9
            };
        }

        let business = constructs.get(Construct::BusinessReality);
        if business.effective("debt_pressure").is_some_and(|d| d >= 7.0) {
            rec.risk_framing = RiskFraming::Cautious;
            acc.nudge_intensity = clamp_unit(acc.nudge_intensity + 0.1);
        }
        if let Some(team) = business.effective("team_size") {
            rec.options_presented = if team <= 2.0 { 2 } else { 3 };
        }
        if let Some(bottleneck) = business.effective("bottleneck") {
            pro.peak_task_type = if bottleneck <= 4.0 {
                TaskType::Shipping
            } else if bottleneck <= 6.0 {
                TaskType::Distribution
            } else {
                TaskType::Revenue
            };
        }

        if let Some(style) = temporal.effective("planning_style") {
            rec.planning_depth = if style >= 8.0 {
                PlanningDepth::Detailed
            } else if style <= 3.0 {
                PlanningDepth::Minimal
            } else {
                PlanningDepth::Moderate
            };
        }
        if let Some(intensity) = temporal.effective("work_intensity") {
            if intensity >= 8.0 {
                acc.nudge_frequency_hours = acc.nudge_frequency_hours.max(10.0);
            } else if intensity <= 3.0 {
                acc.nudge_frequency_hours = acc.nudge_frequency_hours.min(6.0);
            }
        }
        if temporal
            .effective("context_switch_cost")
            .is_some_and(|c| c >= 7.0)
        {
            acc.stall_intervention_hours = acc.stall_intervention_hours.max(6.0);
        }
        if let Some(recovery) = temporal.effective("stall_recovery") {
            if recovery >= 8.0 {
                acc.nudge_intensity = clamp_unit(acc.nudge_intensity - 0.1);
            } else if recovery <= 3.0 {
                comm.question_frequency = QuestionFrequency::High;
            }
        }

        let over = |kind: WindowKind| windows.activation(kind) > WINDOW_OVERRIDE;
        if over(WindowKind::FinancialPressure) {
            rec.risk_framing = RiskFraming::Cautious;
            rec.data_density = clamp_unit(rec.data_density + 0.2);
        }
        if over(WindowKind::ShippingSprint) {
            acc.nudge_frequency_hours = acc.nudge_frequency_hours.max(12.0);
            acc.nudge_intensity = clamp_unit(acc.nudge_intensity - 0.2);
        }
        if over(WindowKind::RecoveryPeriod) {
            acc.nudge_intensity = clamp_unit(acc.nudge_intensity - 0.3);
            acc.stall_intervention_hours = 24.0;
        }
        if over(WindowKind::Stall) {
            acc.nudge_intensity = clamp_unit(acc.nudge_intensity + 0.3);
            acc.stall_intervention_hours = 4.0;
        }

        cal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;
    use approx::assert_relative_eq;

    const NOW: Timestamp = Timestamp::from_unix(1_771_632_000);

    fn derive(c: &Constructs, w: &ContextWindows) -> CalibrationParams {
        CalibrationParams::derive(&ObservedComm::default(), c, w)
    }

    fn set(c: &mut Constructs, construct: Construct, dim: &str, v: f64) {
        c.get_mut(construct).update(dim, v);
    }

    #[test]
    fn test_empty_profile_yields_defaults() {
        let cal = derive(&Constructs::default(), &ContextWindows::default());
        assert_eq!(cal, CalibrationParams::default());
        assert_eq!(cal.communication.max_message_words, 300);
        assert_eq!(cal.proactive.standup_hour, 8);
    }

    #[test]
    fn test_observed_comm_needs_enough_messages() {
        let mut oc = ObservedComm {
            directness: 0.9,
            formality: 0.8,
            emotion_expression: 0.2,
            messages_analyzed: 10,
            ..ObservedComm::default()
        };
        let c = Constructs::default();
        let w = ContextWindows::default();
        assert_eq!(CalibrationParams::derive(&oc, &c, &w), CalibrationParams::default());

        oc.messages_analyzed = 11;
        let cal = CalibrationParams::derive(&oc, &c, &w);
        assert_eq!(cal.communication.max_message_words, 200);
        assert_relative_eq!(cal.communication.tone_formality, 0.8);
        assert_relative_eq!(cal.communication.celebration_intensity, 0.2);
    }

    #[test]
    fn test_low_directness_leads_with_context() {
        let oc = ObservedComm {
            directness: 0.2,
            messages_analyzed: 20,
            ..ObservedComm::default()
        };
        let cal =
            CalibrationParams::derive(&oc, &Constructs::default(), &ContextWindows::default());
        assert_eq!(cal.communication.max_message_words, 500);
        assert_eq!(cal.communication.lead_with, LeadWith::Context);
    }

    #[test]
    fn test_disc_analytical_leads_with_data() {
        let mut c = Constructs::default();
        set(&mut c, Construct::CommunicationDna, "D", 4.0);
        set(&mut c, Construct::CommunicationDna, "C", 8.0);
        let cal = derive(&c, &ContextWindows::default());
        assert_eq!(cal.communication.lead_with, LeadWith::Data);
        assert_eq!(cal.communication.question_frequency, QuestionFrequency::Moderate);
    }

    #[test]
    fn test_standup_buckets() {
        for (peak, hour) in [(22.0, 11), (3.0, 11), (6.0, 7), (9.0, 9), (14.0, 9)] {
            let mut c = Constructs::default();
            set(&mut c, Construct::TemporalPatterns, "peak_hour", peak);
            assert_eq!(
                derive(&c, &ContextWindows::default()).proactive.standup_hour,
                hour,
                "peak {peak}"
            );
        }
    }

    #[test]
    fn test_business_rules() {
        let mut c = Constructs::default();
        set(&mut c, Construct::BusinessReality, "debt_pressure", 7.0);
        set(&mut c, Construct::BusinessReality, "team_size", 7.0);
        set(&mut c, Construct::BusinessReality, "bottleneck", 5.0);
        let cal = derive(&c, &ContextWindows::default());
        assert_eq!(cal.recommendations.risk_framing, RiskFraming::Cautious);
        assert_relative_eq!(cal.accountability.nudge_intensity, 0.6);
        assert_eq!(cal.recommendations.options_presented, 3);
        assert_eq!(cal.proactive.peak_task_type, TaskType::Distribution);
    }

    #[test]
    fn test_repeated_derivation_does_not_ratchet() {
        let mut c = Constructs::default();
        set(&mut c, Construct::BusinessReality, "debt_pressure", 10.0);
        let w = ContextWindows::default();
        let first = derive(&c, &w);
        let second = derive(&c, &w);
        assert_eq!(first, second);
    }

    #[test]
    fn test_temporal_rules() {
        let mut c = Constructs::default();
        set(&mut c, Construct::TemporalPatterns, "planning_style", 1.0);
        set(&mut c, Construct::TemporalPatterns, "work_intensity", 10.0);
        set(&mut c, Construct::TemporalPatterns, "context_switch_cost", 10.0);
        set(&mut c, Construct::TemporalPatterns, "stall_recovery", 3.0);
        let cal = derive(&c, &ContextWindows::default());
        assert_eq!(cal.recommendations.planning_depth, PlanningDepth::Minimal);
        assert_relative_eq!(cal.accountability.nudge_frequency_hours, 10.0);
        assert_relative_eq!(cal.accountability.stall_intervention_hours, 8.0);
        assert_eq!(cal.communication.question_frequency, QuestionFrequency::High);
    }

    #[test]
    fn test_windows_compose_with_clamping() {
        let mut w = ContextWindows::default();
        for kind in [WindowKind::ShippingSprint, WindowKind::Stall, WindowKind::RecoveryPeriod] {
            for _ in 0..5 {
                w.signal(kind, 1.0, NOW);
            }
        }
        let cal = derive(&Constructs::default(), &w);
        // 0.5 - 0.2 - 0.3 + 0.3
        assert_relative_eq!(cal.accountability.nudge_intensity, 0.3, epsilon = 1e-12);
        assert_relative_eq!(cal.accountability.nudge_frequency_hours, 12.0);
        // stall applies after recovery
        assert_relative_eq!(cal.accountability.stall_intervention_hours, 4.0);
    }

    #[test]
    fn test_recovery_alone_reduces_intensity() {
        let mut w = ContextWindows::default();
        for _ in 0..5 {
            w.signal(WindowKind::RecoveryPeriod, 1.0, NOW);
        }
        let cal = derive(&Constructs::default(), &w);
        assert_relative_eq!(cal.accountability.nudge_intensity, 0.2, epsilon = 1e-12);
        assert_relative_eq!(cal.accountability.stall_intervention_hours, 24.0);
    }

    #[test]
    fn test_financial_window() {
        let mut w = ContextWindows::default();
        for _ in 0..5 {
            w.signal(WindowKind::FinancialPressure, 1.0, NOW);
        }
        let cal = derive(&Constructs::default(), &w);
        assert_eq!(cal.recommendations.risk_framing, RiskFraming::Cautious);
        assert_relative_eq!(cal.recommendations.data_density, 0.7, epsilon = 1e-12);
    }
}
