//! Observations entering the engine.
//!
//! [`SignalEnvelope`] is the permissive wire shape accepted from producers:
//! an open metadata map and optional fields. [`SignalEnvelope::into_signal`]
//! validates it into a strict [`Signal`] whose [`SignalKind`] carries typed
//! per-type fields, so nothing past the boundary reads loose metadata.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::assessment::InstrumentKind;
use crate::time::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Message,
    Event,
    Document,
    Account,
    Assessment,
    Approval,
}

impl SignalType {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalType::Message => "message",
            SignalType::Event => "event",
            SignalType::Document => "document",
            SignalType::Account => "account",
            SignalType::Assessment => "assessment",
            SignalType::Approval => "approval",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "message" => Some(SignalType::Message),
            "event" => Some(SignalType::Event),
            "document" => Some(SignalType::Document),
            "account" => Some(SignalType::Account),
            "assessment" => Some(SignalType::Assessment),
            "approval" => Some(SignalType::Approval),
            _ => None,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire form of a signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    #[serde(default)]
    pub source: String,
    #[serde(default, alias = "timestamp", skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalError {
    MissingContent(SignalType),
    MissingField {
        signal: SignalType,
        field: &'static str,
    },
    InvalidField {
        field: &'static str,
        reason: String,
    },
    InvalidAnswer {
        index: usize,
        reason: String,
    },
}

impl SignalError {
    /// Stable machine-readable code.
    pub fn reason(&self) -> &'static str {
        match self {
            SignalError::MissingContent(_) => "missing_content",
            SignalError::MissingField { .. } => "missing_field",
            SignalError::InvalidField { .. } => "invalid_field",
            SignalError::InvalidAnswer { .. } => "invalid_answer",
        }
    }
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalError::MissingContent(t) => write!(f, "{t} signal requires content"),
            SignalError::MissingField { signal, field } => {
                write!(f, "{signal} signal requires metadata.{field}")
            }
            SignalError::InvalidField { field, reason } => {
                write!(f, "invalid metadata.{field}: {reason}")
            }
            SignalError::InvalidAnswer { index, reason } => {
                write!(f, "invalid answer at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for SignalError {}

/// Value of one assessment answer: a choice code, a 0-100 slider, or an
/// ordered ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Choice(String),
    Slider(f64),
    Ranking(Vec<String>),
    Other(Value),
}

impl Default for AnswerValue {
    fn default() -> Self {
        AnswerValue::Other(Value::Null)
    }
}

impl AnswerValue {
    pub fn as_choice(&self) -> Option<&str> {
        match self {
            AnswerValue::Choice(s) => Some(s.trim()),
            _ => None,
        }
    }

    /// Slider reading; numeric strings are accepted.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnswerValue::Slider(v) => Some(*v),
            AnswerValue::Choice(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_ranking(&self) -> Option<&[String]> {
        match self {
            AnswerValue::Ranking(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Choice(s) => f.write_str(s),
            AnswerValue::Slider(v) => write!(f, "{v}"),
            AnswerValue::Ranking(items) => f.write_str(&items.join(" > ")),
            AnswerValue::Other(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<InstrumentKind>,
    #[serde(default, alias = "instrument")]
    pub instrument_id: String,
    #[serde(default, alias = "question")]
    pub question_id: String,
    #[serde(default)]
    pub value: AnswerValue,
}

impl Answer {
    pub fn new(instrument_id: &str, question_id: &str, value: AnswerValue) -> Self {
        Self {
            kind: None,
            instrument_id: instrument_id.to_string(),
            question_id: question_id.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventDetails {
    pub event_type: String,
    pub lane: Option<String>,
    pub project: Option<String>,
    pub amount: Option<f64>,
}

impl EventDetails {
    pub fn new(event_type: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            lane: None,
            project: None,
            amount: None,
        }
    }

    pub fn is_ship(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            "TASK_COMPLETED"
                | "PRODUCT_RELEASE"
                | "FEATURE_SHIPPED"
                | "CODE_PUBLISHED"
                | "EXTENSION_PUBLISHED"
                | "DOCS_PUBLISHED"
        )
    }

    pub fn is_celebration(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            "PAYOUT_RECEIVED" | "PRODUCT_RELEASE"
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub provider: String,
    pub monthly_revenue: Option<f64>,
    pub weekly_commits: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve,
    Reject,
    Other(String),
}

impl ApprovalAction {
    pub fn parse(s: &str) -> Self {
        match s {
            "approve" => ApprovalAction::Approve,
            "reject" => ApprovalAction::Reject,
            other => ApprovalAction::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
            ApprovalAction::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalDecision {
    pub action: ApprovalAction,
    pub latency_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    Message,
    Event(EventDetails),
    Document,
    Account(AccountSnapshot),
    Assessment(Vec<Answer>),
    Approval(ApprovalDecision),
}

/// A validated observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    pub source: String,
    pub occurred_at: Timestamp,
    pub content: Option<String>,
    pub features: BTreeMap<String, f64>,
}

impl Signal {
    pub fn new(kind: SignalKind, source: &str, occurred_at: Timestamp) -> Self {
        Self {
            kind,
            source: source.to_string(),
            occurred_at,
            content: None,
            features: BTreeMap::new(),
        }
    }

    pub fn message(content: &str, source: &str, occurred_at: Timestamp) -> Self {
        Self {
            content: Some(content.to_string()),
            ..Self::new(SignalKind::Message, source, occurred_at)
        }
    }

    pub fn document(content: &str, source: &str, occurred_at: Timestamp) -> Self {
        Self {
            content: Some(content.to_string()),
            ..Self::new(SignalKind::Document, source, occurred_at)
        }
    }

    pub fn event(details: EventDetails, source: &str, occurred_at: Timestamp) -> Self {
        Self::new(SignalKind::Event(details), source, occurred_at)
    }

    pub fn assessment(answers: Vec<Answer>, source: &str, occurred_at: Timestamp) -> Self {
        Self::new(SignalKind::Assessment(answers), source, occurred_at)
    }

    pub fn signal_type(&self) -> SignalType {
        match self.kind {
            SignalKind::Message => SignalType::Message,
            SignalKind::Event(_) => SignalType::Event,
            SignalKind::Document => SignalType::Document,
            SignalKind::Account(_) => SignalType::Account,
            SignalKind::Assessment(_) => SignalType::Assessment,
            SignalKind::Approval(_) => SignalType::Approval,
        }
    }

    /// Content, or the empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

impl SignalEnvelope {
    /// Validate into a [`Signal`]. `now` stands in for a missing `occurred_at`.
    pub fn into_signal(self, now: Timestamp) -> Result<Signal, SignalError> {
        let t = self.signal_type;
        let meta = &self.metadata;

        let kind = match t {
            SignalType::Message | SignalType::Document => {
                if self.content.is_none() {
                    return Err(SignalError::MissingContent(t));
                }
                if t == SignalType::Message {
                    SignalKind::Message
                } else {
                    SignalKind::Document
                }
            }
            SignalType::Event => SignalKind::Event(EventDetails {
                event_type: required_str(meta, t, "event_type")?,
                lane: optional_str(meta, "lane"),
                project: optional_str(meta, "project"),
                amount: number(meta, "amount")?,
            }),
            SignalType::Account => SignalKind::Account(AccountSnapshot {
                provider: required_str(meta, t, "provider")?,
                monthly_revenue: number(meta, "monthly_revenue")?,
                weekly_commits: number(meta, "weekly_commits")?,
            }),
            SignalType::Assessment => SignalKind::Assessment(answers(meta)?),
            SignalType::Approval => SignalKind::Approval(ApprovalDecision {
                action: ApprovalAction::parse(&required_str(meta, t, "action")?),
                latency_seconds: number(meta, "latency_seconds")?,
            }),
        };

        Ok(Signal {
            kind,
            source: self.source,
            occurred_at: self.occurred_at.unwrap_or(now),
            content: self.content,
            features: self.features,
        })
    }
}

fn required_str(
    meta: &Map<String, Value>,
    signal: SignalType,
    field: &'static str,
) -> Result<String, SignalError> {
    match meta.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            Err(SignalError::MissingField { signal, field })
        }
        Some(other) => Err(SignalError::InvalidField {
            field,
            reason: format!("expected string, got {other}"),
        }),
    }
}

fn optional_str(meta: &Map<String, Value>, field: &str) -> Option<String> {
    meta.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numbers or numeric strings; absent or null is `None`.
fn number(meta: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, SignalError> {
    match meta.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => {
            s.trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| SignalError::InvalidField {
                    field,
                    reason: format!("{s:?} is not a number"),
                })
        }
        Some(other) => Err(SignalError::InvalidField {
            field,
            reason: format!("expected number, got {other}"),
        }),
    }
}

fn answers(meta: &Map<String, Value>) -> Result<Vec<Answer>, SignalError> {
    let Some(Value::Array(items)) = meta.get("answers") else {
        return Err(SignalError::MissingField {
            signal: SignalType::Assessment,
            field: "answers",
        });
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<Answer>(item.clone()).map_err(|e| {
                SignalError::InvalidAnswer {
                    index,
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}
