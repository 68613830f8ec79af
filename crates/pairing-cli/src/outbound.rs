//! Best-effort push of the profile digest to external memory and agent
//! stores. Runs as its own task fed by an unbounded channel; nothing here
//! can block or fail the processing worker.

use std::time::Duration;

use futures_util::future::join_all;
use pairing_core::ProfileDigest;
use rand::Rng;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{SinkConfig, SinkKind, SyncConfig};

/// Method and JSON body for one sink.
pub fn request_for(kind: SinkKind, digest: &ProfileDigest) -> (Method, Value) {
    match kind {
        SinkKind::MemoryStore => (
            Method::POST,
            json!({
                "messages": [{"role": "user", "content": digest.summary}],
                "category": "founder_profile",
            }),
        ),
        SinkKind::AgentBlock => (Method::PATCH, json!({ "value": digest.summary })),
        SinkKind::Gateway => (
            Method::POST,
            json!({
                "tool": "remember",
                "args": {"fact": digest.summary},
            }),
        ),
    }
}

/// `base · 2^attempt` plus up to half of `base` in jitter.
pub fn backoff_delay(base_ms: u64, attempt: u32, jitter_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(10));
    Duration::from_millis(exp.saturating_add(jitter_ms.min(base_ms / 2)))
}

/// Deliver to one sink, retrying with backoff. `true` on success.
pub async fn push(
    client: &Client,
    sink: &SinkConfig,
    digest: &ProfileDigest,
    max_attempts: u32,
    backoff_ms: u64,
) -> bool {
    let (method, body) = request_for(sink.kind, digest);
    let attempts = max_attempts.max(1);
    for attempt in 0..attempts {
        let mut req = client
            .request(method.clone(), &sink.url)
            .timeout(Duration::from_secs(sink.timeout_secs))
            .json(&body);
        if let Some(token) = &sink.token {
            req = req.bearer_auth(token);
        }
        match req.send().await.and_then(|r| r.error_for_status()) {
            Ok(_) => {
                tracing::debug!(url = %sink.url, attempt, "profile digest synced");
                return true;
            }
            Err(e) => {
                tracing::warn!(url = %sink.url, attempt, "profile sync failed: {e}");
            }
        }
        if attempt + 1 < attempts {
            let jitter = rand::rng().random_range(0..=backoff_ms / 2);
            tokio::time::sleep(backoff_delay(backoff_ms, attempt, jitter)).await;
        }
    }
    tracing::error!(url = %sink.url, attempts, "giving up on profile sync");
    false
}

/// Spawn the sync worker. Returns the sender the engine emits digests on.
pub fn spawn_worker(
    config: SyncConfig,
    tracker: &TaskTracker,
    cancel: CancellationToken,
) -> mpsc::UnboundedSender<ProfileDigest> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProfileDigest>();
    let client = Client::new();
    tracker.spawn(async move {
        loop {
            let digest = tokio::select! {
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(d) => d,
                    None => break,
                },
            };
            let pushes = config.sinks.iter().map(|sink| {
                push(&client, sink, &digest, config.max_attempts, config.backoff_ms)
            });
            let delivered = join_all(pushes).await.into_iter().filter(|ok| *ok).count();
            tracing::info!(
                delivered,
                sinks = config.sinks.len(),
                level = %digest.level,
                "profile digest pushed"
            );
        }
        tracing::debug!("sync worker stopped");
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::Router;
    use axum::extract::{Json, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use pairing_core::{Profile, Timestamp};
    use tokio::sync::Mutex;

    const T0: Timestamp = Timestamp::from_unix(1_771_632_000);

    fn digest() -> ProfileDigest {
        pairing_core::digest(&Profile::new(T0), T0)
    }

    #[derive(Clone, Default)]
    struct Sink {
        failures_left: Arc<AtomicU32>,
        received: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    }

    async fn receive(
        State(sink): State<Sink>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> StatusCode {
        if sink
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        sink.received.lock().await.push((auth, body));
        StatusCode::OK
    }

    async fn serve(sink: Sink) -> String {
        let app = Router::new().route("/sink", post(receive)).with_state(sink);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/sink")
    }

    fn sink_config(kind: SinkKind, url: String) -> SinkConfig {
        SinkConfig {
            kind,
            url,
            token: Some("secret".to_string()),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_payload_shapes() {
        let d = digest();
        let (m, body) = request_for(SinkKind::MemoryStore, &d);
        assert_eq!(m, Method::POST);
        assert_eq!(body["category"], "founder_profile");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], d.summary.as_str());

        let (m, body) = request_for(SinkKind::AgentBlock, &d);
        assert_eq!(m, Method::PATCH);
        assert_eq!(body["value"], d.summary.as_str());

        let (_, body) = request_for(SinkKind::Gateway, &d);
        assert_eq!(body["tool"], "remember");
        assert_eq!(body["args"]["fact"], d.summary.as_str());
    }

    #[test]
    fn test_backoff_grows_and_caps_jitter() {
        assert_eq!(backoff_delay(100, 0, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 2, 0), Duration::from_millis(400));
        assert_eq!(backoff_delay(100, 1, 1_000), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_push_delivers_with_bearer() {
        let sink = Sink::default();
        let url = serve(sink.clone()).await;
        let ok = push(
            &Client::new(),
            &sink_config(SinkKind::MemoryStore, url),
            &digest(),
            3,
            1,
        )
        .await;
        assert!(ok);
        let got = sink.received.lock().await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0.as_deref(), Some("Bearer secret"));
        assert_eq!(got[0].1["category"], "founder_profile");
    }

    #[tokio::test]
    async fn test_push_retries_then_succeeds() {
        let sink = Sink::default();
        sink.failures_left.store(2, Ordering::SeqCst);
        let url = serve(sink.clone()).await;
        let ok = push(&Client::new(), &sink_config(SinkKind::Gateway, url), &digest(), 3, 1).await;
        assert!(ok);
        assert_eq!(sink.received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_push_gives_up_after_max_attempts() {
        let sink = Sink::default();
        sink.failures_left.store(10, Ordering::SeqCst);
        let url = serve(sink.clone()).await;
        let ok = push(&Client::new(), &sink_config(SinkKind::Gateway, url), &digest(), 2, 1).await;
        assert!(!ok);
        assert_eq!(sink.failures_left.load(Ordering::SeqCst), 8);
    }
}
