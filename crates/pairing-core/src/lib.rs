//! Founder profile inference engine.
//!
//! Turns a stream of heterogeneous observations (chat messages, business
//! events, assessment answers, approvals, documents, account snapshots) into
//! dual-track trait/state estimates across seven constructs, and derives
//! from them a complement allocation, calibration parameters for an
//! assistant, a composite pairing score and a self-measured accuracy.
//!
//! Zero I/O: every operation takes `now` explicitly and nothing here logs.
//! Transport, persistence and scheduling live in the sibling crates.

pub mod accuracy;
pub mod assessment;
pub mod calibration;
pub mod complement;
pub mod constants;
pub mod construct;
pub mod context_window;
pub mod dual_track;
pub mod lexical;
pub mod overrides;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod ring;
pub mod score;
pub mod signal;
pub mod summary;
pub mod time;

pub use accuracy::{AccuracyReport, ObservationCounts, accuracy, convergence};
pub use assessment::{InstrumentKind, Unscored};
pub use calibration::CalibrationParams;
pub use complement::ComplementVector;
pub use construct::Construct;
pub use context_window::{ContextWindow, ContextWindows, WindowKind};
pub use dual_track::{DimensionTrack, DualTrackDimension};
pub use lexical::{FeatureExtractor, Features, LexicalExtractor};
pub use overrides::ProfileOverride;
pub use pipeline::{
    DriftEvent, EvidenceEntry, Pipeline, Prediction, ProcessOutcome, extract_features,
};
pub use profile::{PROFILE_VERSION, Profile};
pub use report::{
    ComplementReport, DriftReport, EvidencePage, Insights, OverrideView, PredictionReport,
    list_overrides,
};
pub use ring::Ring;
pub use score::{PairingLevel, PairingScore};
pub use signal::{
    AccountSnapshot, Answer, AnswerValue, ApprovalAction, ApprovalDecision, EventDetails, Signal,
    SignalEnvelope, SignalError, SignalKind, SignalType,
};
pub use summary::{EffectiveProfile, ProfileDigest, chat_summary, digest};
pub use time::{Timestamp, now_unix_secs};
