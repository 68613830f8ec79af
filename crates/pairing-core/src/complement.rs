//! Complement vector: where the assistant should spend effort.
//!
//! The inverse of the founder's own strengths across the four action-style
//! and six energy-topology dimensions, skewed by four secondary constructs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{COMPLEMENT_EPSILON, SCALE_MAX};
use crate::time::Timestamp;

/// (field name, construct dimension, display name, what the assistant does)
pub const COMPLEMENT_DIMENSIONS: [(&str, &str, &str, &str); 10] = [
    (
        "fact_finder",
        "FF",
        "Fact Finder",
        "surface research, data, evidence before decisions",
    ),
    (
        "follow_through",
        "FT",
        "Follow Through",
        "track details, ensure nothing falls through cracks, remind about loose ends",
    ),
    (
        "quick_start",
        "QS",
        "Quick Start",
        "suggest bold moves, prototype ideas, push past analysis paralysis",
    ),
    (
        "implementor",
        "IM",
        "Implementor",
        "provide concrete steps, blueprints, hands-on action items",
    ),
    (
        "wonder",
        "W",
        "Wonder",
        "ask big-picture questions, explore new possibilities, brainstorm",
    ),
    (
        "invention",
        "N",
        "Invention",
        "suggest novel solutions, creative approaches, unconventional paths",
    ),
    (
        "discernment",
        "D_disc",
        "Discernment",
        "evaluate tradeoffs, sense what feels right, trust pattern recognition",
    ),
    (
        "galvanizing",
        "G",
        "Galvanizing",
        "inject energy, celebrate wins, rally momentum when stalled",
    ),
    (
        "enablement",
        "E",
        "Enablement",
        "proactively offer help, remove blockers, connect dots across projects",
    ),
    (
        "tenacity",
        "T",
        "Tenacity",
        "provide persistent follow-up, hold to commitments, don't let things slide",
    ),
];

const FOLLOW_THROUGH: usize = 1;
const QUICK_START: usize = 2;
const IMPLEMENTOR: usize = 3;
const WONDER: usize = 4;
const ENABLEMENT: usize = 8;
const TENACITY: usize = 9;

/// One entry of the sorted complement listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub name: &'static str,
    pub code: &'static str,
    pub allocation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplementVector {
    pub fact_finder: f64,
    pub follow_through: f64,
    pub quick_start: f64,
    pub implementor: f64,
    pub wonder: f64,
    pub invention: f64,
    pub discernment: f64,
    pub galvanizing: f64,
    pub enablement: f64,
    pub tenacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rebalanced: Option<Timestamp>,
}

impl Default for ComplementVector {
    fn default() -> Self {
        Self::from_array([0.1; 10], None)
    }
}

impl ComplementVector {
    fn as_array(&self) -> [f64; 10] {
        [
            self.fact_finder,
            self.follow_through,
            self.quick_start,
            self.implementor,
            self.wonder,
            self.invention,
            self.discernment,
            self.galvanizing,
            self.enablement,
            self.tenacity,
        ]
    }

    fn from_array(v: [f64; 10], last_rebalanced: Option<Timestamp>) -> Self {
        Self {
            fact_finder: v[0],
            follow_through: v[1],
            quick_start: v[2],
            implementor: v[3],
            wonder: v[4],
            invention: v[5],
            discernment: v[6],
            galvanizing: v[7],
            enablement: v[8],
            tenacity: v[9],
            last_rebalanced,
        }
    }

    /// Recompute proportions from the blended action-style and energy scores.
    ///
    /// `gap = max(0, 10 − effective)`; undefined dimensions contribute no
    /// gap. When the total gap is under epsilon every dimension gets an
    /// equal share.
    pub fn rebalance(
        &mut self,
        action: &BTreeMap<String, f64>,
        energy: &BTreeMap<String, f64>,
        now: Timestamp,
    ) {
        let mut gaps = [0.0; 10];
        for (i, (_, code, _, _)) in COMPLEMENT_DIMENSIONS.iter().enumerate() {
            if let Some(eff) = action.get(*code).or_else(|| energy.get(*code)) {
                gaps[i] = (SCALE_MAX - eff).max(0.0);
            }
        }
        let total: f64 = gaps.iter().sum();
        let proportions = if total < COMPLEMENT_EPSILON {
            [1.0 / gaps.len() as f64; 10]
        } else {
            gaps.map(|g| g / total)
        };
        *self = Self::from_array(proportions, Some(now));
    }

    /// Apply the conditional secondary boosts, cap each at 1.0, renormalize.
    pub fn adjust_from_secondary(
        &mut self,
        risk: &BTreeMap<String, f64>,
        cognitive: &BTreeMap<String, f64>,
        business: &BTreeMap<String, f64>,
        temporal: &BTreeMap<String, f64>,
    ) {
        let mut v = self.as_array();
        let mut boost = |idx: usize, factor: f64| v[idx] = (v[idx] * factor).min(1.0);

        if business.get("debt_pressure").is_some_and(|&d| d >= 6.0) {
            boost(TENACITY, 1.3);
        }
        if business.get("team_size").is_some_and(|&t| t <= 2.0) {
            boost(ENABLEMENT, 1.2);
        }
        if risk.get("tolerance").is_some_and(|&t| t < 4.0) {
            boost(QUICK_START, 1.3);
        }
        if cognitive.get("sequential").is_some_and(|&s| s > 7.0) {
            boost(WONDER, 1.2);
        }
        if cognitive.get("abstract").is_some_and(|&a| a > 7.0) {
            boost(IMPLEMENTOR, 1.2);
        }
        if temporal.get("context_switch_cost").is_some_and(|&c| c >= 7.0) {
            boost(FOLLOW_THROUGH, 1.2);
        }

        let total: f64 = v.iter().sum();
        if total > 0.0 {
            v = v.map(|x| x / total);
        } else {
            v = [1.0 / v.len() as f64; 10];
        }
        *self = Self::from_array(v, self.last_rebalanced);
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    /// All ten allocations, largest first.
    pub fn sorted(&self) -> Vec<Allocation> {
        let values = self.as_array();
        let mut items: Vec<Allocation> = COMPLEMENT_DIMENSIONS
            .iter()
            .zip(values)
            .map(|(&(_, code, name, _), allocation)| Allocation {
                name,
                code,
                allocation,
            })
            .collect();
        items.sort_by(|a, b| b.allocation.total_cmp(&a.allocation));
        items
    }

    /// The `n` largest allocations above 1%, with their behavioral phrase.
    pub fn top(&self, n: usize) -> Vec<(Allocation, &'static str)> {
        self.sorted()
            .into_iter()
            .filter(|a| a.allocation > 0.01)
            .take(n)
            .map(|a| {
                let phrase = COMPLEMENT_DIMENSIONS
                    .iter()
                    .find(|(_, code, _, _)| *code == a.code)
                    .map_or("", |&(_, _, _, phrase)| phrase);
                (a, phrase)
            })
            .collect()
    }
}
