//! Time-decaying operating-mode detectors.
//!
//! A window rises through `sigmoid(activation + strength·0.3)` on each
//! signal and decays as `activation·e^(−hours/τ)` between signals. Falling
//! under 0.05 resets it completely.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    WINDOW_ACTIVE, WINDOW_DEACTIVATE, WINDOW_DEFAULT_TAU_HOURS, WINDOW_SIGNAL_SCALE,
};
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowKind {
    FinancialPressure,
    ShippingSprint,
    RecoveryPeriod,
    ContextExplosion,
    Stall,
    Celebration,
    LifeEvent,
}

impl WindowKind {
    pub const ALL: [WindowKind; 7] = [
        WindowKind::FinancialPressure,
        WindowKind::ShippingSprint,
        WindowKind::RecoveryPeriod,
        WindowKind::ContextExplosion,
        WindowKind::Stall,
        WindowKind::Celebration,
        WindowKind::LifeEvent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WindowKind::FinancialPressure => "FINANCIAL_PRESSURE",
            WindowKind::ShippingSprint => "SHIPPING_SPRINT",
            WindowKind::RecoveryPeriod => "RECOVERY_PERIOD",
            WindowKind::ContextExplosion => "CONTEXT_EXPLOSION",
            WindowKind::Stall => "STALL",
            WindowKind::Celebration => "CELEBRATION",
            WindowKind::LifeEvent => "LIFE_EVENT",
        }
    }

    pub fn decay_tau_hours(self) -> f64 {
        match self {
            WindowKind::FinancialPressure => 72.0,
            WindowKind::ShippingSprint => 48.0,
            WindowKind::RecoveryPeriod => 72.0,
            WindowKind::ContextExplosion => 48.0,
            WindowKind::Stall => 24.0,
            WindowKind::Celebration => 24.0,
            WindowKind::LifeEvent => 168.0,
        }
    }

    /// What the assistant does differently while this window is active.
    pub fn description(self) -> &'static str {
        match self {
            WindowKind::FinancialPressure => {
                "Revenue pressure detected: recommendations shift to revenue-first"
            }
            WindowKind::ShippingSprint => {
                "Shipping sprint: fewer nudges, steadier task supply"
            }
            WindowKind::RecoveryPeriod => "Recovery period: back off and suggest rest",
            WindowKind::ContextExplosion => {
                "Context switching spike: prompt focus and sequencing"
            }
            WindowKind::Stall => "Shipping stall detected: more frequent check-ins",
            WindowKind::Celebration => "Win detected: celebrate, then redirect energy",
            WindowKind::LifeEvent => "Life event detected: reduce all pressure",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub name: WindowKind,
    pub activation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_signal: Option<Timestamp>,
    pub signal_count: u32,
    pub decay_tau_hours: f64,
}

impl ContextWindow {
    pub fn new(name: WindowKind) -> Self {
        Self {
            name,
            activation: 0.0,
            activated_at: None,
            last_signal: None,
            signal_count: 0,
            decay_tau_hours: name.decay_tau_hours(),
        }
    }

    pub fn add_signal(&mut self, strength: f64, now: Timestamp) {
        self.signal_count += 1;
        self.last_signal = Some(now);
        if self.activated_at.is_none() {
            self.activated_at = Some(now);
        }
        self.activation = sigmoid(self.activation + strength * WINDOW_SIGNAL_SCALE);
    }

    pub fn decay(&mut self, now: Timestamp) {
        let Some(last) = self.last_signal else {
            return;
        };
        let tau = if self.decay_tau_hours > 0.0 {
            self.decay_tau_hours
        } else {
            WINDOW_DEFAULT_TAU_HOURS
        };
        self.activation *= (-now.hours_since(last) / tau).exp();
        if self.activation < WINDOW_DEACTIVATE {
            self.reset();
        }
    }

    /// Multiply activation down without touching timestamps.
    pub fn dampen(&mut self, factor: f64) {
        self.activation *= factor.clamp(0.0, 1.0);
    }

    pub fn is_active(&self) -> bool {
        self.activation >= WINDOW_ACTIVE
    }

    fn reset(&mut self) {
        self.activation = 0.0;
        self.activated_at = None;
        self.last_signal = None;
        self.signal_count = 0;
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// All seven windows, always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<WindowKind, ContextWindow>",
    into = "BTreeMap<WindowKind, ContextWindow>"
)]
pub struct ContextWindows {
    windows: [ContextWindow; 7],
}

impl Default for ContextWindows {
    fn default() -> Self {
        Self {
            windows: WindowKind::ALL.map(ContextWindow::new),
        }
    }
}

impl From<BTreeMap<WindowKind, ContextWindow>> for ContextWindows {
    fn from(mut map: BTreeMap<WindowKind, ContextWindow>) -> Self {
        Self {
            windows: WindowKind::ALL.map(|k| {
                let mut w = map.remove(&k).unwrap_or_else(|| ContextWindow::new(k));
                w.name = k;
                w
            }),
        }
    }
}

impl From<ContextWindows> for BTreeMap<WindowKind, ContextWindow> {
    fn from(ws: ContextWindows) -> Self {
        ws.windows.into_iter().map(|w| (w.name, w)).collect()
    }
}

impl ContextWindows {
    pub fn get(&self, kind: WindowKind) -> &ContextWindow {
        &self.windows[kind as usize]
    }

    pub fn get_mut(&mut self, kind: WindowKind) -> &mut ContextWindow {
        &mut self.windows[kind as usize]
    }

    pub fn signal(&mut self, kind: WindowKind, strength: f64, now: Timestamp) {
        self.get_mut(kind).add_signal(strength, now);
    }

    pub fn activation(&self, kind: WindowKind) -> f64 {
        self.get(kind).activation
    }

    pub fn decay_all(&mut self, now: Timestamp) {
        for w in &mut self.windows {
            w.decay(now);
        }
    }

    /// Windows with activation strictly above `threshold`, in kind order.
    pub fn above(&self, threshold: f64) -> impl Iterator<Item = &ContextWindow> {
        self.windows
            .iter()
            .filter(move |w| w.activation > threshold)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContextWindow> {
        self.windows.iter()
    }
}
