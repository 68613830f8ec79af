//! HTTP query API under `/v1/pairing`.
//!
//! Reads take the engine's read lock and never wait on the signal queue.
//! Writes either enqueue a signal (answers, raw signals) or go through the
//! processing worker as a command (overrides, reset, profile import).

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Json, OptionalFromRequest, Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use pairing_core::{
    AccuracyReport, Answer, ComplementReport, Construct, DriftReport, EffectiveProfile,
    EvidencePage, Insights, PredictionReport, Signal, SignalEnvelope, SignalType, Timestamp,
    list_overrides,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;

pub const RESET_CONFIRMATION: &str = "RESET_PROFILE";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub reason: &'static str,
}

/// API error with a machine-readable reason.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, reason, error) = match self {
            ApiError::BadRequest(reason, msg) => (StatusCode::BAD_REQUEST, reason, msg),
            ApiError::NotFound(reason, msg) => (StatusCode::NOT_FOUND, reason, msg),
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "engine_unavailable", msg)
            }
        };
        (status, Json(ErrorBody { error, reason })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest("malformed_body", rejection.body_text())
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// JSON body extractor that rejects with the API error body.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = <Json<T> as FromRequest<S>>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<S, T> OptionalFromRequest<S> for ApiJson<T>
where
    Json<T>: OptionalFromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let value = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(value.map(|Json(v)| Self(v)))
    }
}

/// Resolve a construct name and dimension and range-check the value.
pub fn resolve_override(
    construct: &str,
    dimension: &str,
    value: f64,
) -> Result<(Construct, &'static str), ApiError> {
    let c = Construct::from_name(construct).ok_or_else(|| {
        ApiError::BadRequest("unknown_trait", format!("unknown trait '{construct}'"))
    })?;
    let dim = c.canonical_dimension(dimension).ok_or_else(|| {
        ApiError::BadRequest(
            "unknown_dimension",
            format!("'{dimension}' is not a dimension of {c}"),
        )
    })?;
    if !(0.0..=10.0).contains(&value) {
        return Err(ApiError::BadRequest(
            "invalid_value",
            format!("value {value} is outside 0-10"),
        ));
    }
    Ok((c, dim))
}

pub fn router(engine: Engine) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/pairing/profile", get(profile).put(import_profile))
        .route("/v1/pairing/effective", get(effective))
        .route("/v1/pairing/evidence", get(evidence))
        .route("/v1/pairing/drift", get(drift))
        .route("/v1/pairing/complement", get(complement))
        .route("/v1/pairing/predictions", get(predictions))
        .route("/v1/pairing/insights", get(insights))
        .route("/v1/pairing/accuracy", get(accuracy))
        .route("/v1/pairing/stats", get(stats))
        .route("/v1/pairing/signals", post(submit_signal))
        .route("/v1/pairing/answers", post(submit_answers))
        .route(
            "/v1/pairing/overrides",
            get(get_overrides).post(create_override),
        )
        .route("/v1/pairing/overrides/{id}", delete(delete_override))
        .route("/v1/pairing/scan", post(scan))
        .route("/v1/pairing/reset", delete(reset))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(engine)
}

async fn healthz() -> &'static str {
    "ok"
}

// --- Reads ---

async fn profile(State(engine): State<Engine>) -> impl IntoResponse {
    Json(engine.read().await.profile().clone())
}

async fn effective(State(engine): State<Engine>) -> impl IntoResponse {
    let p = engine.read().await;
    Json(EffectiveProfile::build(p.profile(), Timestamp::now()))
}

#[derive(Debug, Default, Deserialize)]
pub struct EvidenceQuery {
    #[serde(rename = "type")]
    pub signal_type: Option<String>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

async fn evidence(
    State(engine): State<Engine>,
    Query(q): Query<EvidenceQuery>,
) -> ApiResult<Json<EvidencePage>> {
    let filter = match q.signal_type.as_deref() {
        None | Some("") => None,
        Some(t) => Some(SignalType::parse(t).ok_or_else(|| {
            ApiError::BadRequest("invalid_type", format!("unknown signal type '{t}'"))
        })?),
    };
    let p = engine.read().await;
    Ok(Json(EvidencePage::build(&p, filter, q.offset, q.limit)))
}

async fn drift(State(engine): State<Engine>) -> impl IntoResponse {
    let p = engine.read().await;
    Json(DriftReport::build(&p, Timestamp::now()))
}

async fn complement(State(engine): State<Engine>) -> impl IntoResponse {
    Json(ComplementReport::build(&*engine.read().await))
}

async fn predictions(State(engine): State<Engine>) -> impl IntoResponse {
    Json(PredictionReport::build(&*engine.read().await))
}

async fn insights(State(engine): State<Engine>) -> impl IntoResponse {
    let p = engine.read().await;
    Json(Insights::build(&p, Timestamp::now()))
}

async fn accuracy(State(engine): State<Engine>) -> impl IntoResponse {
    let p = engine.read().await;
    Json(AccuracyReport::build(p.profile(), Timestamp::now()))
}

async fn stats(State(engine): State<Engine>) -> impl IntoResponse {
    Json(engine.stats().await)
}

// --- Writes ---

fn accepted(queued: bool) -> Response {
    let status = if queued { "queued" } else { "dropped" };
    (
        StatusCode::ACCEPTED,
        Json(json!({"status": status, "queued": queued})),
    )
        .into_response()
}

async fn submit_signal(
    State(engine): State<Engine>,
    ApiJson(envelope): ApiJson<SignalEnvelope>,
) -> ApiResult<Response> {
    let queued = engine
        .submit_envelope(envelope)
        .map_err(|e| ApiError::BadRequest(e.reason(), e.to_string()))?;
    Ok(accepted(queued))
}

#[derive(Debug, Deserialize)]
pub struct AnswersRequest {
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub source: Option<String>,
}

async fn submit_answers(
    State(engine): State<Engine>,
    ApiJson(req): ApiJson<AnswersRequest>,
) -> ApiResult<Response> {
    if req.answers.is_empty() {
        return Err(ApiError::BadRequest(
            "missing_answers",
            "answers must not be empty".to_string(),
        ));
    }
    let source = req.source.as_deref().unwrap_or("api");
    let signal = Signal::assessment(req.answers, source, Timestamp::now());
    Ok(accepted(engine.submit(signal)))
}

async fn get_overrides(State(engine): State<Engine>) -> impl IntoResponse {
    let p = engine.read().await;
    let overrides = list_overrides(&p, Timestamp::now());
    Json(json!({"count": overrides.len(), "overrides": overrides}))
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    #[serde(rename = "trait", alias = "construct")]
    pub construct: String,
    pub dimension: String,
    pub value: f64,
    #[serde(default)]
    pub reason: String,
}

async fn create_override(
    State(engine): State<Engine>,
    ApiJson(req): ApiJson<OverrideRequest>,
) -> ApiResult<Response> {
    let (construct, dim) = resolve_override(&req.construct, &req.dimension, req.value)?;
    let created = engine
        .add_override(construct, dim, req.value, &req.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn delete_override(
    State(engine): State<Engine>,
    Path(id): Path<u64>,
) -> ApiResult<Response> {
    if engine.remove_override(id).await? {
        Ok(Json(json!({"deleted": id})).into_response())
    } else {
        Err(ApiError::NotFound(
            "unknown_override",
            format!("no override with id {id}"),
        ))
    }
}

async fn scan(State(engine): State<Engine>) -> ApiResult<Response> {
    engine
        .start_scan()
        .map_err(|e| ApiError::BadRequest("scan_unconfigured", e.to_string()))?;
    Ok((StatusCode::ACCEPTED, Json(json!({"status": "scanning"}))).into_response())
}

/// Replace the live profile with an exported document.
async fn import_profile(State(engine): State<Engine>, body: String) -> ApiResult<Response> {
    let profile = pairing_store::parse_profile(&body)
        .map_err(|e| ApiError::BadRequest("invalid_profile", e.to_string()))?;
    let profile_id = profile.profile_id.clone();
    engine.replace_profile(profile).await?;
    tracing::info!(%profile_id, "profile imported via API");
    Ok(Json(json!({"status": "imported", "profile_id": profile_id})).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub confirm: String,
}

async fn reset(
    State(engine): State<Engine>,
    body: Option<ApiJson<ResetRequest>>,
) -> ApiResult<Response> {
    let confirm = body.map(|ApiJson(b)| b.confirm).unwrap_or_default();
    if confirm != RESET_CONFIRMATION {
        return Err(ApiError::BadRequest(
            "confirmation_required",
            format!("send {{\"confirm\": \"{RESET_CONFIRMATION}\"}} to reset the profile"),
        ));
    }
    engine.reset().await?;
    tracing::info!("profile reset via API");
    Ok(Json(json!({"status": "reset"})).into_response())
}
