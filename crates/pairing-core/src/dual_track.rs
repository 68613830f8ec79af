//! Dual-track (trait vs. state) estimator.
//!
//! Every named dimension carries two exponential moving averages over the
//! same 0-10 observation stream:
//!
//! - **trait**: slow (λ = 0.02), the stable underlying tendency
//! - **state**: fast (λ = 0.15), current operating mode
//!
//! Their normalized divergence (`drift`, in units of the trait's running
//! deviation) sets the blend weight `alpha` ∈ [0.30, 0.70], and the blended
//! `effective` value is what every downstream consumer reads. Stable
//! dimensions lean on the trait; drifting dimensions lean on the state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ALPHA_INITIAL, ALPHA_MIN, ALPHA_RANGE, LAMBDA_FAST, LAMBDA_SLOW, SIGMA_DECAY, SIGMA_FLOOR,
    SIGMA_INITIAL, SIGMA_WARMUP_OBSERVATIONS,
};

/// Per-dimension estimator state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionTrack {
    #[serde(rename = "trait")]
    pub trait_value: Option<f64>,
    pub state: Option<f64>,
    pub sigma_trait: f64,
    pub drift: f64,
    pub alpha: f64,
    pub effective: Option<f64>,
    pub observations: u32,
}

impl Default for DimensionTrack {
    fn default() -> Self {
        Self {
            trait_value: None,
            state: None,
            sigma_trait: SIGMA_INITIAL,
            drift: 0.0,
            alpha: ALPHA_INITIAL,
            effective: None,
            observations: 0,
        }
    }
}

impl DimensionTrack {
    /// Apply one observation. `value` is expected on the 0-10 scale.
    ///
    /// The first observation seeds both tracks with `value` (no warm-up
    /// bias). Sigma starts adapting only after the second observation, so a
    /// pair of identical early answers does not collapse it to the floor.
    pub fn observe(&mut self, value: f64) {
        self.observations += 1;

        let (trait_value, state) = match (self.trait_value, self.state) {
            (Some(t), Some(s)) => (
                t * (1.0 - LAMBDA_SLOW) + value * LAMBDA_SLOW,
                s * (1.0 - LAMBDA_FAST) + value * LAMBDA_FAST,
            ),
            _ => (value, value),
        };
        self.trait_value = Some(trait_value);
        self.state = Some(state);

        if self.observations > SIGMA_WARMUP_OBSERVATIONS {
            let deviation = (value - trait_value).abs();
            self.sigma_trait = (self.sigma_trait * SIGMA_DECAY + deviation * (1.0 - SIGMA_DECAY))
                .max(SIGMA_FLOOR);
        }

        self.drift = (state - trait_value).abs() / self.sigma_trait.max(SIGMA_FLOOR);
        let stability = 1.0 / (1.0 + self.drift);
        self.alpha = ALPHA_MIN + ALPHA_RANGE * stability;
        self.effective = Some(self.alpha * trait_value + (1.0 - self.alpha) * state);
    }
}

/// One construct's worth of dimension tracks, keyed by dimension name.
///
/// The set of names is fixed at construction; updates for names outside it
/// are refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DualTrackDimension {
    dims: BTreeMap<String, DimensionTrack>,
}

impl DualTrackDimension {
    pub fn new(names: &[&str]) -> Self {
        Self {
            dims: names
                .iter()
                .map(|n| (n.to_string(), DimensionTrack::default()))
                .collect(),
        }
    }

    /// Feed `value` into `dim`. Returns the updated track, or `None` when the
    /// dimension is not part of this construct.
    pub fn update(&mut self, dim: &str, value: f64) -> Option<&DimensionTrack> {
        let track = self.dims.get_mut(dim)?;
        track.observe(value);
        Some(track)
    }

    pub fn get(&self, dim: &str) -> Option<&DimensionTrack> {
        self.dims.get(dim)
    }

    pub fn effective(&self, dim: &str) -> Option<f64> {
        self.dims.get(dim).and_then(|t| t.effective)
    }

    /// Effective values of every dimension that has one.
    pub fn effective_map(&self) -> BTreeMap<String, f64> {
        self.dims
            .iter()
            .filter_map(|(k, t)| t.effective.map(|e| (k.clone(), e)))
            .collect()
    }

    /// Number of dimensions with a defined effective value.
    pub fn defined_count(&self) -> usize {
        self.dims.values().filter(|t| t.effective.is_some()).count()
    }

    pub fn total_observations(&self) -> u64 {
        self.dims.values().map(|t| u64::from(t.observations)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DimensionTrack)> {
        self.dims.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains(&self, dim: &str) -> bool {
        self.dims.contains_key(dim)
    }
}
