//! Manual corrections submitted by the founder.
//!
//! An override starts at weight 0.30 and decays with τ = 30 days. If later
//! behavior lands within 1.0 of the asserted value it is confirmed and held
//! at 0.15 for good; if behavior lands more than 2.0 away it is marked
//! contradicted and simply keeps decaying.

use serde::{Deserialize, Serialize};

use crate::constants::{
    OVERRIDE_CONFIRM_TOLERANCE, OVERRIDE_CONFIRMED_WEIGHT, OVERRIDE_CONTRADICT_DISTANCE,
    OVERRIDE_FRESH_WEIGHT, OVERRIDE_LIST_FLOOR, OVERRIDE_TAU_DAYS, SCALE_MAX,
};
use crate::construct::Construct;
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileOverride {
    pub id: u64,
    #[serde(rename = "trait")]
    pub construct: Construct,
    pub dimension: String,
    pub value: f64,
    #[serde(default)]
    pub reason: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub contradicted: bool,
}

/// Outcome of checking an override against behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Confirmed,
    Contradicted,
    Undecided,
}

impl ProfileOverride {
    /// `value` is clamped to the 0-10 scale.
    pub fn new(
        id: u64,
        construct: Construct,
        dimension: &str,
        value: f64,
        reason: &str,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            construct,
            dimension: dimension.to_string(),
            value: value.clamp(0.0, SCALE_MAX),
            reason: reason.to_string(),
            created_at,
            confirmed: false,
            contradicted: false,
        }
    }

    pub fn weight(&self, now: Timestamp) -> f64 {
        if self.confirmed {
            return OVERRIDE_CONFIRMED_WEIGHT;
        }
        OVERRIDE_FRESH_WEIGHT * (-now.days_since(self.created_at) / OVERRIDE_TAU_DAYS).exp()
    }

    pub fn is_listed(&self, now: Timestamp) -> bool {
        self.confirmed || self.weight(now) > OVERRIDE_LIST_FLOOR
    }

    pub fn is_resolved(&self) -> bool {
        self.confirmed || self.contradicted
    }

    pub fn age_days(&self, now: Timestamp) -> f64 {
        now.days_since(self.created_at)
    }

    /// Compare against the behavioral effective value and record the verdict.
    pub fn check(&mut self, effective: f64) -> Verdict {
        if self.is_resolved() {
            return Verdict::Undecided;
        }
        let distance = (effective - self.value).abs();
        if distance <= OVERRIDE_CONFIRM_TOLERANCE {
            self.confirmed = true;
            Verdict::Confirmed
        } else if distance > OVERRIDE_CONTRADICT_DISTANCE {
            self.contradicted = true;
            Verdict::Contradicted
        } else {
            Verdict::Undecided
        }
    }

    /// Blend the override into a behavioral value at its current weight.
    pub fn blend(&self, effective: f64, now: Timestamp) -> f64 {
        let w = self.weight(now);
        (1.0 - w) * effective + w * self.value
    }

    /// Self-perception gap: asserted minus observed.
    pub fn gap(&self, effective: f64) -> f64 {
        self.value - effective
    }
}

/// Reading of a self-perception gap.
pub fn interpret_gap(delta: f64) -> &'static str {
    if delta > 1.0 {
        "you rate yourself higher than behavior shows"
    } else if delta < -1.0 {
        "you're better at this than you think"
    } else {
        "aligned"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const T0: Timestamp = Timestamp::from_unix(1_771_632_000);

    fn qs(value: f64) -> ProfileOverride {
        ProfileOverride::new(1, Construct::ActionStyle, "QS", value, "I ship fast", T0)
    }

    #[test]
    fn test_fresh_weight() {
        assert_relative_eq!(qs(7.0).weight(T0), 0.30);
    }

    #[test]
    fn test_weight_after_thirty_days() {
        let o = qs(7.0);
        assert_relative_eq!(
            o.weight(T0.plus_days(30.0)),
            0.30 * (-1.0_f64).exp(),
            epsilon = 1e-9
        );
        assert!((o.weight(T0.plus_days(30.0)) - 0.110).abs() < 0.001);
    }

    #[test]
    fn test_confirmed_is_permanent() {
        let mut o = qs(7.0);
        assert_eq!(o.check(7.5), Verdict::Confirmed);
        assert_relative_eq!(o.weight(T0.plus_days(365.0)), 0.15);
        assert!(o.is_listed(T0.plus_days(365.0)));
    }

    #[test]
    fn test_contradicted_keeps_decaying() {
        let mut o = qs(9.0);
        assert_eq!(o.check(5.0), Verdict::Contradicted);
        assert!(o.contradicted);
        assert!(!o.is_listed(T0.plus_days(120.0)));
        // resolved overrides are not re-checked
        assert_eq!(o.check(9.0), Verdict::Undecided);
        assert!(!o.confirmed);
    }

    #[test]
    fn test_middle_band_undecided() {
        let mut o = qs(7.0);
        assert_eq!(o.check(8.5), Verdict::Undecided);
        assert!(!o.is_resolved());
    }

    #[test]
    fn test_blend_and_gap() {
        let o = qs(9.0);
        assert_relative_eq!(o.blend(5.0, T0), 0.7 * 5.0 + 0.3 * 9.0);
        assert_relative_eq!(o.gap(5.0), 4.0);
        assert_eq!(interpret_gap(4.0), "you rate yourself higher than behavior shows");
        assert_eq!(interpret_gap(-2.0), "you're better at this than you think");
        assert_eq!(interpret_gap(0.5), "aligned");
    }

    #[test]
    fn test_value_clamped() {
        assert_eq!(qs(42.0).value, 10.0);
    }

    #[test]
    fn test_serializes_construct_as_trait() {
        let v = serde_json::to_value(qs(7.0)).unwrap();
        assert_eq!(v["trait"], "action_style");
        assert_eq!(v["created_at"], "2026-02-21T00:00:00Z");
    }
}
