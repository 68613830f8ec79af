/// Trait (slow) EMA rate. Half-life ≈ 35 observations.
pub const LAMBDA_SLOW: f64 = 0.02;

/// State (fast) EMA rate. Half-life ≈ 4 observations.
pub const LAMBDA_FAST: f64 = 0.15;

/// Initial running deviation of the trait estimate.
pub const SIGMA_INITIAL: f64 = 2.0;

/// Floor for the trait deviation; keeps drift finite.
pub const SIGMA_FLOOR: f64 = 0.1;

/// Sigma starts adapting after this many observations.
pub const SIGMA_WARMUP_OBSERVATIONS: u32 = 2;

/// Sigma EMA weight on the previous value.
pub const SIGMA_DECAY: f64 = 0.95;

/// Lowest blend weight on trait (turbulent periods).
pub const ALPHA_MIN: f64 = 0.30;

/// Blend range added on top of ALPHA_MIN when fully stable.
pub const ALPHA_RANGE: f64 = 0.40;

/// Blend weight before any observation (trait-dominant).
pub const ALPHA_INITIAL: f64 = ALPHA_MIN + ALPHA_RANGE;

/// Drift at or above which a DriftEvent is recorded.
pub const DRIFT_SIGNIFICANT: f64 = 2.0;

/// Drift at or above which a reading is reported as "mild".
pub const DRIFT_MILD: f64 = 1.0;

/// Scale applied to a context-window signal before the sigmoid.
pub const WINDOW_SIGNAL_SCALE: f64 = 0.3;

/// Below this a decaying window is fully reset.
pub const WINDOW_DEACTIVATE: f64 = 0.05;

/// Activation at which a window counts as active.
pub const WINDOW_ACTIVE: f64 = 0.3;

/// Activation above which a window overrides calibration.
pub const WINDOW_OVERRIDE: f64 = 0.5;

/// Fallback decay constant for windows with a non-positive tau.
pub const WINDOW_DEFAULT_TAU_HOURS: f64 = 72.0;

/// Upper bound of the 0-10 observation scale.
pub const SCALE_MAX: f64 = 10.0;

/// Total gap below which the complement falls back to an equal split.
pub const COMPLEMENT_EPSILON: f64 = 0.01;

/// Observed-communication EMA rate.
pub const OBSERVED_COMM_LAMBDA: f64 = 0.10;

/// Messages needed before observed communication drives calibration.
pub const OBSERVED_COMM_MIN_MESSAGES: u64 = 10;

/// Override weight when freshly submitted.
pub const OVERRIDE_FRESH_WEIGHT: f64 = 0.30;

/// Permanent override weight once behavior confirms it.
pub const OVERRIDE_CONFIRMED_WEIGHT: f64 = 0.15;

/// Override decay constant in days.
pub const OVERRIDE_TAU_DAYS: f64 = 30.0;

/// Behavior within this distance confirms an override.
pub const OVERRIDE_CONFIRM_TOLERANCE: f64 = 1.0;

/// Behavior beyond this distance contradicts an override.
pub const OVERRIDE_CONTRADICT_DISTANCE: f64 = 2.0;

/// Overrides at or below this weight are no longer listed.
pub const OVERRIDE_LIST_FLOOR: f64 = 0.01;

/// Baseline accuracy from the assessment alone.
pub const ACCURACY_BASELINE: f64 = 0.35;

/// Accuracy ceiling.
pub const ACCURACY_CEILING: f64 = 0.97;

/// Accuracy convergence constant in days.
pub const ACCURACY_TAU_DAYS: f64 = 30.0;

/// Composite cap without enough analyzed messages.
pub const SCORE_CAP_MESSAGES: f64 = 60.0;

/// Messages required to lift the message cap.
pub const SCORE_CAP_MESSAGES_MIN: u64 = 50;

/// Composite cap without enough days of behavioral data.
pub const SCORE_CAP_DAYS: f64 = 80.0;

/// Behavioral days required to lift the day cap.
pub const SCORE_CAP_DAYS_MIN: usize = 30;

/// Below this composite the chat digest reports an uncalibrated profile.
pub const SCORE_CALIBRATED_MIN: f64 = 5.0;

/// Ships inside this many hours count toward a sprint.
pub const SHIP_WINDOW_HOURS: f64 = 72.0;

/// Ships in the window needed to signal a sprint.
pub const SPRINT_SHIPS: usize = 5;

/// Tracked ships needed before cadence updates Quick Start.
pub const CADENCE_MIN_SHIPS: usize = 3;

/// Hours without a ship before stall signals start.
pub const STALL_AFTER_HOURS: f64 = 24.0;

/// Hours at which stall signal strength saturates.
pub const STALL_SATURATE_HOURS: f64 = 48.0;

/// Stall activation multiplier when a ship ends a stall.
pub const STALL_RECOVERY_FACTOR: f64 = 0.3;

/// Distinct projects in one day that signal a context explosion.
pub const CONTEXT_EXPLOSION_PROJECTS: usize = 5;

/// Approvals faster than this (seconds) read as Quick Start.
pub const FAST_APPROVAL_SECS: f64 = 300.0;

/// Bounded history capacities.
pub const SHIP_HISTORY: usize = 100;
pub const LATENCY_HISTORY: usize = 100;
pub const EVIDENCE_CAPACITY: usize = 10_000;
pub const PREDICTION_CAPACITY: usize = 1000;
pub const DRIFT_HISTORY: usize = 100;
pub const ANSWER_HISTORY: usize = 1000;

/// Drift events returned by the drift report.
pub const DRIFT_REPORT_RECENT: usize = 20;

/// Lexical features of a message above this trigger a context window.
pub const KEYWORD_WINDOW_THRESHOLD: f64 = 0.3;

/// Hour distance within which a peak-hour prediction is correct.
pub const PEAK_HOUR_TOLERANCE: f64 = 2.0;

/// Days of per-day event counts retained.
pub const DAILY_COUNT_HISTORY: usize = 366;
