use pairing_core::{
    AccuracyReport, Answer, DriftReport, EffectiveProfile, EvidencePage, Insights, Signal,
    SignalEnvelope, SignalType, Timestamp, digest, list_overrides,
};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, resolve_override};
use crate::engine::Engine;

#[derive(Clone)]
pub struct PairingServer {
    engine: Engine,
    tool_router: ToolRouter<Self>,
}

impl PairingServer {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }
}

fn json_result(value: &impl Serialize) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap_or_default(),
    )])
}

fn queued_result(queued: bool) -> CallToolResult {
    json_result(&serde_json::json!({
        "status": if queued { "queued" } else { "dropped" },
        "queued": queued,
    }))
}

impl From<ApiError> for McpError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::BadRequest(_, msg) | ApiError::NotFound(_, msg) => {
                McpError::invalid_params(msg, None)
            }
            ApiError::Unavailable(msg) => McpError::internal_error(msg, None),
        }
    }
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct ObserveRequest {
    /// Signal type: message, event, document, account, assessment or approval
    #[serde(rename = "type")]
    signal_type: String,
    /// Text content (required for message and document)
    content: Option<String>,
    /// Where the observation came from
    source: Option<String>,
    /// Type-specific fields, e.g. event_type/project for events,
    /// provider/monthly_revenue for accounts, action/latency_seconds for approvals
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AnswersRequest {
    /// Assessment answers, each {instrument, question, value}. Value is a
    /// choice code string, a 0-100 slider number, or a ranked list of codes.
    answers: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct OverrideRequest {
    /// Construct name, e.g. action_style, risk_disposition, energy_topology
    #[serde(rename = "trait")]
    construct: String,
    /// Dimension within the construct, e.g. QS or tolerance
    dimension: String,
    /// Self-reported value on the 0-10 scale
    value: f64,
    /// Why the founder disagrees with the observed value
    reason: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RemoveOverrideRequest {
    /// Override id as returned by pairing_override
    id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EvidenceRequest {
    /// Only entries of this signal type
    #[serde(rename = "type")]
    signal_type: Option<String>,
    /// Entries to skip, newest first
    offset: Option<usize>,
    /// Page size (default 50, max 500)
    limit: Option<usize>,
}

#[tool_router]
impl PairingServer {
    #[tool(
        description = "Short founder profile digest for the assistant to read before replying: working style, communication calibration, business context, complement priorities, active contexts and pairing level. Call at the start of a session; apply it silently."
    )]
    async fn pairing_summary(&self) -> Result<CallToolResult, McpError> {
        let p = self.engine.read().await;
        let d = digest(p.profile(), Timestamp::now());
        Ok(CallToolResult::success(vec![Content::text(d.summary)]))
    }

    #[tool(
        description = "Blended effective profile: per-construct values with active self-report overrides, complement allocation, calibration parameters, active context windows, composite score and accuracy."
    )]
    async fn pairing_profile(&self) -> Result<CallToolResult, McpError> {
        let p = self.engine.read().await;
        Ok(json_result(&EffectiveProfile::build(
            p.profile(),
            Timestamp::now(),
        )))
    }

    #[tool(
        description = "Record one observation of the founder (message, event, document, account, assessment, approval). Non-blocking: the signal is queued and may be dropped under load."
    )]
    async fn pairing_observe(
        &self,
        Parameters(req): Parameters<ObserveRequest>,
    ) -> Result<CallToolResult, McpError> {
        let signal_type = SignalType::parse(&req.signal_type).ok_or_else(|| {
            McpError::invalid_params(format!("unknown signal type '{}'", req.signal_type), None)
        })?;
        let metadata = match req.metadata {
            None | Some(serde_json::Value::Null) => serde_json::Map::new(),
            Some(serde_json::Value::Object(m)) => m,
            Some(_) => {
                return Err(McpError::invalid_params(
                    "metadata must be an object".to_string(),
                    None,
                ));
            }
        };
        let envelope = SignalEnvelope {
            signal_type,
            source: req.source.unwrap_or_else(|| "mcp".to_string()),
            occurred_at: None,
            content: req.content,
            metadata,
            features: Default::default(),
        };
        let queued = self
            .engine
            .submit_envelope(envelope)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        Ok(queued_result(queued))
    }

    #[tool(description = "Submit a batch of assessment answers. Unknown instruments are skipped.")]
    async fn pairing_answers(
        &self,
        Parameters(req): Parameters<AnswersRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.answers.is_empty() {
            return Err(McpError::invalid_params(
                "answers must not be empty".to_string(),
                None,
            ));
        }
        let answers = req
            .answers
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                serde_json::from_value::<Answer>(v).map_err(|e| {
                    McpError::invalid_params(format!("invalid answer at index {i}: {e}"), None)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let signal = Signal::assessment(answers, "mcp", Timestamp::now());
        Ok(queued_result(self.engine.submit(signal)))
    }

    #[tool(
        description = "Record the founder's own rating of a dimension when they disagree with the observed value. Starts at 30% weight and fades over about a month unless behavior confirms it."
    )]
    async fn pairing_override(
        &self,
        Parameters(req): Parameters<OverrideRequest>,
    ) -> Result<CallToolResult, McpError> {
        let (construct, dim) = resolve_override(&req.construct, &req.dimension, req.value)?;
        let created = self
            .engine
            .add_override(construct, dim, req.value, req.reason.as_deref().unwrap_or(""))
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(json_result(&created))
    }

    #[tool(description = "Delete a self-report override by id.")]
    async fn pairing_remove_override(
        &self,
        Parameters(req): Parameters<RemoveOverrideRequest>,
    ) -> Result<CallToolResult, McpError> {
        let removed = self
            .engine
            .remove_override(req.id)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        if !removed {
            return Err(McpError::invalid_params(
                format!("no override with id {}", req.id),
                None,
            ));
        }
        Ok(json_result(&serde_json::json!({"deleted": req.id})))
    }

    #[tool(description = "List active self-report overrides with their current weight and age.")]
    async fn pairing_overrides(&self) -> Result<CallToolResult, McpError> {
        let p = self.engine.read().await;
        Ok(json_result(&list_overrides(&p, Timestamp::now())))
    }

    #[tool(description = "Page through the evidence log: what each observation changed, newest first.")]
    async fn pairing_evidence(
        &self,
        Parameters(req): Parameters<EvidenceRequest>,
    ) -> Result<CallToolResult, McpError> {
        let filter = match req.signal_type.as_deref() {
            None | Some("") => None,
            Some(t) => Some(SignalType::parse(t).ok_or_else(|| {
                McpError::invalid_params(format!("unknown signal type '{t}'"), None)
            })?),
        };
        let p = self.engine.read().await;
        Ok(json_result(&EvidencePage::build(
            &p,
            filter,
            req.offset.unwrap_or(0),
            req.limit,
        )))
    }

    #[tool(description = "Trait/state drift per dimension, active context windows and recent significant shifts.")]
    async fn pairing_drift(&self) -> Result<CallToolResult, McpError> {
        let p = self.engine.read().await;
        Ok(json_result(&DriftReport::build(&p, Timestamp::now())))
    }

    #[tool(description = "Narrative insights: effective profile, self-perception gaps and active contexts.")]
    async fn pairing_insights(&self) -> Result<CallToolResult, McpError> {
        let p = self.engine.read().await;
        Ok(json_result(&Insights::build(&p, Timestamp::now())))
    }

    #[tool(description = "Self-measured profile accuracy with per-construct coverage and hints for improving it.")]
    async fn pairing_accuracy(&self) -> Result<CallToolResult, McpError> {
        let p = self.engine.read().await;
        Ok(json_result(&AccuracyReport::build(p.profile(), Timestamp::now())))
    }

    #[tool(description = "Engine statistics: queue depth, dropped signals, signals processed, last save.")]
    async fn pairing_stats(&self) -> Result<CallToolResult, McpError> {
        Ok(json_result(&self.engine.stats().await))
    }

    #[tool(description = "Start a background scan of chat history to backfill communication style.")]
    async fn pairing_scan(&self) -> Result<CallToolResult, McpError> {
        self.engine
            .start_scan()
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        Ok(json_result(&serde_json::json!({"status": "scanning"})))
    }
}

#[tool_handler]
impl ServerHandler for PairingServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "You have a continuously learning profile of the founder you work with.\n\n\
                 1. At session start call pairing_summary and adapt tone, length and pacing to it \
                    without mentioning the profile.\n\
                 2. Relay notable observations with pairing_observe (messages the founder writes, \
                    shipped work, approvals).\n\
                 3. When the founder says a reading is wrong, record it with pairing_override \
                    rather than arguing.\n\
                 4. pairing_insights and pairing_accuracy explain the profile when asked."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::time::Duration;

    fn make_server() -> PairingServer {
        PairingServer::new(Engine::in_memory(EngineConfig::default()))
    }

    fn text_from_result(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    fn parse_result(result: &CallToolResult) -> serde_json::Value {
        let text = text_from_result(result);
        serde_json::from_str(&text).expect("handler should return valid JSON")
    }

    async fn wait_processed(server: &PairingServer, n: u64) {
        for _ in 0..200 {
            if server.engine.read().await.profile().meta.signals_processed >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("worker did not process {n} signals");
    }

    #[tokio::test]
    async fn test_summary_uncalibrated() {
        let server = make_server();
        let text = text_from_result(&server.pairing_summary().await.unwrap());
        assert!(text.contains("Not yet calibrated"));
    }

    #[tokio::test]
    async fn test_stats_empty() {
        let server = make_server();
        let json = parse_result(&server.pairing_stats().await.unwrap());
        assert_eq!(json["signals_processed"], 0);
        assert_eq!(json["dropped_signals"], 0);
        assert_eq!(json["queue_capacity"], 1000);
    }

    #[tokio::test]
    async fn test_answers_update_profile() {
        let server = make_server();
        let result = server
            .pairing_answers(Parameters(AnswersRequest {
                answers: vec![serde_json::json!({
                    "instrument": "ASI-01", "question": "ASI-01", "value": "A"
                })],
            }))
            .await
            .unwrap();
        assert_eq!(parse_result(&result)["queued"], true);
        wait_processed(&server, 1).await;

        let json = parse_result(&server.pairing_profile().await.unwrap());
        assert_eq!(json["action_style"]["QS"], 9.0);
    }

    #[tokio::test]
    async fn test_answers_reject_bad_shape() {
        let server = make_server();
        let err = server
            .pairing_answers(Parameters(AnswersRequest {
                answers: vec![serde_json::json!(42)],
            }))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_observe_event() {
        let server = make_server();
        let result = server
            .pairing_observe(Parameters(ObserveRequest {
                signal_type: "event".into(),
                content: None,
                source: Some("scoreboard".into()),
                metadata: Some(serde_json::json!({"event_type": "TASK_COMPLETED", "project": "site"})),
            }))
            .await
            .unwrap();
        assert_eq!(parse_result(&result)["status"], "queued");
        wait_processed(&server, 1).await;

        let json = parse_result(
            &server
                .pairing_evidence(Parameters(EvidenceRequest {
                    signal_type: Some("event".into()),
                    offset: None,
                    limit: None,
                }))
                .await
                .unwrap(),
        );
        assert_eq!(json["total"], 1);
        assert_eq!(json["evidence"][0]["source"], "scoreboard");
    }

    #[tokio::test]
    async fn test_observe_rejects_missing_fields() {
        let server = make_server();
        let missing_event_type = server
            .pairing_observe(Parameters(ObserveRequest {
                signal_type: "event".into(),
                content: None,
                source: None,
                metadata: None,
            }))
            .await;
        assert!(missing_event_type.is_err());

        let bad_type = server
            .pairing_observe(Parameters(ObserveRequest {
                signal_type: "dream".into(),
                content: Some("x".into()),
                source: None,
                metadata: None,
            }))
            .await;
        assert!(bad_type.is_err());
    }

    #[tokio::test]
    async fn test_override_roundtrip() {
        let server = make_server();
        let created = parse_result(
            &server
                .pairing_override(Parameters(OverrideRequest {
                    construct: "action_style".into(),
                    dimension: "QS".into(),
                    value: 7.0,
                    reason: None,
                }))
                .await
                .unwrap(),
        );
        assert_eq!(created["trait"], "action_style");
        let id = created["id"].as_u64().unwrap();

        let listed = parse_result(&server.pairing_overrides().await.unwrap());
        assert_eq!(listed.as_array().unwrap().len(), 1);

        server
            .pairing_remove_override(Parameters(RemoveOverrideRequest { id }))
            .await
            .unwrap();
        assert!(
            server
                .pairing_remove_override(Parameters(RemoveOverrideRequest { id }))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_reports_render() {
        let server = make_server();
        let drift = parse_result(&server.pairing_drift().await.unwrap());
        assert!(drift.get("drift_readings").is_some());
        let insights = parse_result(&server.pairing_insights().await.unwrap());
        assert!(insights.get("chat_summary").is_some());
        let accuracy = parse_result(&server.pairing_accuracy().await.unwrap());
        assert!(accuracy.get("by_construct").is_some());
    }

    #[tokio::test]
    async fn test_scan_unconfigured() {
        assert!(make_server().pairing_scan().await.is_err());
    }
}
