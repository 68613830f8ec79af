//! Self-measured accuracy.
//!
//! `A(t) = 1 − (1 − A₀)·e^(−t/τ)·Π(1 − Δᵢ)`, clamped to `[A₀, 0.97]`, with
//! `A₀ = 0.35` and `τ = 30` days. Each Δ saturates on one observation count.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::{ACCURACY_BASELINE, ACCURACY_CEILING, ACCURACY_TAU_DAYS};
use crate::profile::Profile;
use crate::time::Timestamp;

/// Counts the convergence equation depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ObservationCounts {
    pub messages: u64,
    pub events: u64,
    pub documents: u64,
    pub accounts: usize,
    pub state_shifts: u64,
}

impl ObservationCounts {
    pub fn of(profile: &Profile) -> Self {
        Self {
            messages: profile.observed_comm.messages_analyzed,
            events: profile.meta.total_events_analyzed,
            documents: profile.meta.total_documents_ingested,
            accounts: profile.meta.connected_accounts.len(),
            state_shifts: profile.meta.total_state_shifts_detected,
        }
    }

    fn residual(&self) -> f64 {
        let chat = 0.15 * (1.0 - (-(self.messages as f64) / 100.0).exp());
        let events = 0.12 * (1.0 - (-(self.events as f64) / 500.0).exp());
        let docs = 0.08 * (self.documents as f64 / 5.0).min(1.0);
        let accounts = 0.10 * (self.accounts as f64 / 3.0).min(1.0);
        let drift = 0.05 * (self.state_shifts as f64 / 5.0).min(1.0);
        [chat, events, docs, accounts, drift]
            .iter()
            .map(|d| 1.0 - d)
            .product()
    }
}

/// Accuracy after `days` with the given counts.
pub fn convergence(days: f64, counts: &ObservationCounts) -> f64 {
    let a = 1.0
        - (1.0 - ACCURACY_BASELINE) * (-days.max(0.0) / ACCURACY_TAU_DAYS).exp() * counts.residual();
    a.clamp(ACCURACY_BASELINE, ACCURACY_CEILING)
}

pub fn accuracy(profile: &Profile, now: Timestamp) -> f64 {
    convergence(profile.days_active(now), &ObservationCounts::of(profile))
}

/// Relative gain over the day-one baseline.
pub fn improvement_vs_day1(accuracy: f64) -> f64 {
    (accuracy - ACCURACY_BASELINE) / ACCURACY_BASELINE
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstructAccuracy {
    pub observations: u64,
    pub dimensions: usize,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Improvement {
    pub action: &'static str,
    pub needed: u64,
    pub boost: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub day_1: f64,
    pub day_7: f64,
    pub day_30: f64,
    pub day_90: f64,
    pub day_365: f64,
    pub current: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyReport {
    pub overall_accuracy: f64,
    pub improvement_vs_day1: f64,
    pub days_active: f64,
    pub by_construct: BTreeMap<String, ConstructAccuracy>,
    pub improvements: Vec<Improvement>,
    pub trajectory: Trajectory,
}

impl AccuracyReport {
    pub fn build(profile: &Profile, now: Timestamp) -> Self {
        let overall = accuracy(profile, now);
        let by_construct = profile
            .constructs
            .iter()
            .map(|(c, dt)| {
                let observations = dt.total_observations();
                (
                    c.name().to_string(),
                    ConstructAccuracy {
                        observations,
                        dimensions: dt.defined_count(),
                        confidence: (observations as f64 / 100.0).min(1.0),
                    },
                )
            })
            .collect();

        let mut improvements = Vec::new();
        let messages = profile.observed_comm.messages_analyzed;
        if messages < 50 {
            improvements.push(Improvement {
                action: "Send more chat messages",
                needed: 50 - messages,
                boost: "+5-10%",
            });
        }
        let accounts = profile.meta.connected_accounts.len() as u64;
        if accounts < 3 {
            improvements.push(Improvement {
                action: "Connect more accounts (GitHub, Stripe recommended)",
                needed: 3 - accounts,
                boost: "+3-5% per account",
            });
        }
        let answers = profile.answers.len() as u64;
        if answers < 30 {
            improvements.push(Improvement {
                action: "Complete more assessment questions",
                needed: 30 - answers,
                boost: "+5-15%",
            });
        }

        Self {
            overall_accuracy: overall,
            improvement_vs_day1: improvement_vs_day1(overall),
            days_active: profile.days_active(now),
            by_construct,
            improvements,
            trajectory: Trajectory {
                day_1: 0.35,
                day_7: 0.50,
                day_30: 0.72,
                day_90: 0.88,
                day_365: 0.97,
                current: overall,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const T0: Timestamp = Timestamp::from_unix(1_771_632_000);

    #[test]
    fn test_baseline_at_day_zero() {
        assert_relative_eq!(convergence(0.0, &ObservationCounts::default()), 0.35);
    }

    #[test]
    fn test_time_alone_converges() {
        let c = ObservationCounts::default();
        let a30 = convergence(30.0, &c);
        assert_relative_eq!(a30, 1.0 - 0.65 * (-1.0_f64).exp(), epsilon = 1e-12);
        assert_relative_eq!(convergence(10_000.0, &c), 0.97);
    }

    #[test]
    fn test_observations_lift_accuracy() {
        let none = convergence(10.0, &ObservationCounts::default());
        let some = convergence(
            10.0,
            &ObservationCounts {
                messages: 200,
                events: 1000,
                documents: 5,
                accounts: 3,
                state_shifts: 5,
            },
        );
        assert!(some > none);
    }

    #[test]
    fn test_report_for_fresh_profile() {
        let p = Profile::new(T0);
        let r = AccuracyReport::build(&p, T0);
        assert_relative_eq!(r.overall_accuracy, 0.35);
        assert_relative_eq!(r.improvement_vs_day1, 0.0);
        assert_eq!(r.by_construct.len(), 7);
        assert_eq!(r.improvements.len(), 3);
        assert_eq!(r.improvements[0].needed, 50);
        assert_eq!(r.improvements[2].needed, 30);
    }
}
