//! HTTP client for the session gateway control plane.
//!
//! One outbound connection concern lives here: issuing requests with bounded
//! timeouts, interpreting the gateway's `{data}` / `{error}` response
//! envelopes, and tracking liveness. Liveness transitions are edge-triggered
//! events on a broadcast channel, so a subscriber can tell "still down" from
//! "just recovered".

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::session::{AgentSession, SpawnRequest, TranscriptMessage};

/// Capacity of the liveness event channel. Transitions are rare; a small
/// buffer only matters if a subscriber stalls.
const EVENT_CAPACITY: usize = 16;

/// Connection settings for the gateway, fixed at construction time.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL, no trailing slash (e.g. `http://127.0.0.1:3002`).
    pub base_url: String,
    /// Value for the `X-API-Key` header, when the gateway requires one.
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    /// Whole-request deadline. A hung gateway must not stall the polling
    /// tick, so this is short; a timed-out request counts as a transport
    /// failure.
    pub request_timeout: Duration,
    /// Fixed delay between startup liveness probes until the first success.
    pub probe_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3002".into(),
            api_key: None,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(4),
            probe_interval: Duration::from_secs(10),
        }
    }
}

/// Failure of a gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure, timeout, or an error status from the gateway.
    /// Recovered by the cache/fallback read path -- never user-facing on its
    /// own.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    /// The gateway answered, but the requested session does not exist.
    #[error("session not found: {0}")]
    NotFound(String),
}

/// Edge-triggered liveness transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEvent {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    /// No request has resolved yet.
    Unknown,
    Up,
    Down,
}

/// Client for the gateway REST API.
///
/// Cloning is cheap and shares the liveness flag, the event channel, and the
/// probe cancellation token.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    liveness: Arc<Mutex<Liveness>>,
    events: broadcast::Sender<GatewayEvent>,
    probe: CancellationToken,
}

impl GatewayClient {
    /// Construct the client and immediately launch the startup liveness
    /// probe (`GET /health`). The probe retries on the fixed
    /// `probe_interval` until its first success, then stops; from there,
    /// liveness is driven by regular request outcomes. [`close`] cancels a
    /// still-running probe.
    ///
    /// [`close`]: GatewayClient::close
    pub fn spawn(config: GatewayConfig) -> Self {
        let probe_interval = config.probe_interval;
        let client = Self::new(config);
        client.spawn_probe(probe_interval);
        client
    }

    /// Construct without launching the probe. Building block for
    /// [`spawn`](GatewayClient::spawn); also what tests use when they need
    /// deterministic liveness transitions.
    fn new(config: GatewayConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .expect("HTTP client options are static");
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            liveness: Arc::new(Mutex::new(Liveness::Unknown)),
            events,
            probe: CancellationToken::new(),
        }
    }

    fn spawn_probe(&self, interval: Duration) {
        let client = self.clone();
        let cancel = self.probe.clone();
        let _ = tokio::spawn(async move {
            loop {
                match client.health().await {
                    Ok(()) => return,
                    Err(e) => tracing::debug!(error = %e, "gateway probe failed"),
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        });
    }

    /// Subscribe to liveness transition events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Whether the most recent request (or probe) succeeded.
    pub fn is_alive(&self) -> bool {
        *self.liveness.lock() == Liveness::Up
    }

    /// Cancel the startup probe. Idempotent; regular requests keep working.
    pub fn close(&self) {
        self.probe.cancel();
    }

    /// `GET /health`. Drives the liveness flag like any other call.
    pub async fn health(&self) -> Result<(), GatewayError> {
        let _: serde_json::Value = self.request(Method::GET, "/health", None::<&()>).await?;
        Ok(())
    }

    /// Fetch the full session list.
    pub async fn list_sessions(&self) -> Result<Vec<AgentSession>, GatewayError> {
        self.request(Method::GET, "/api/sessions", None::<&()>).await
    }

    /// Fetch one session by id.
    pub async fn get_session(&self, id: &str) -> Result<AgentSession, GatewayError> {
        self.request(Method::GET, &format!("/api/sessions/{id}"), None::<&()>)
            .await
    }

    /// Spawn a new session.
    pub async fn spawn_session(&self, req: &SpawnRequest) -> Result<AgentSession, GatewayError> {
        self.request(Method::POST, "/api/sessions/spawn", Some(req)).await
    }

    /// Kill a session.
    pub async fn kill_session(&self, id: &str) -> Result<(), GatewayError> {
        let _: serde_json::Value = self
            .request(Method::POST, &format!("/api/sessions/{id}/kill"), None::<&()>)
            .await?;
        Ok(())
    }

    /// Deliver a message to a session's conversation.
    pub async fn send_message(&self, id: &str, message: &str) -> Result<(), GatewayError> {
        let body = serde_json::json!({ "message": message });
        let _: serde_json::Value = self
            .request(Method::POST, &format!("/api/sessions/{id}/send"), Some(&body))
            .await?;
        Ok(())
    }

    /// Fetch a session's transcript.
    pub async fn transcript(&self, id: &str) -> Result<Vec<TranscriptMessage>, GatewayError> {
        self.request(Method::GET, &format!("/api/sessions/{id}/transcript"), None::<&()>)
            .await
    }

    /// Issue one request and decode the gateway's response envelope.
    ///
    /// Success bodies are `{"data": ...}` (a bare payload is tolerated);
    /// error statuses carry `{"error": "..."}`. A 404 is a domain result --
    /// the gateway answered -- so it maps to [`GatewayError::NotFound`] and
    /// counts as a successful round trip for liveness purposes. Everything
    /// else ≥ 400, and any transport failure, is
    /// [`GatewayError::Unavailable`].
    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.http.request(method, &url);
        if let Some(key) = &self.api_key {
            req = req.header("X-API-Key", key);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.record_failure();
                return Err(GatewayError::Unavailable(e.to_string()));
            }
        };

        let status = resp.status();
        let value: serde_json::Value = match resp.json().await {
            Ok(value) => value,
            Err(e) => {
                self.record_failure();
                return Err(GatewayError::Unavailable(format!("invalid JSON response: {e}")));
            }
        };

        if status.as_u16() >= 400 {
            let message = value
                .get("error")
                .and_then(|e| e.as_str())
                .map(str::to_owned)
                .unwrap_or_else(|| format!("HTTP {status}"));
            if status == reqwest::StatusCode::NOT_FOUND {
                self.record_success();
                return Err(GatewayError::NotFound(message));
            }
            self.record_failure();
            return Err(GatewayError::Unavailable(message));
        }

        self.record_success();

        let payload = match value {
            serde_json::Value::Object(mut map) if map.contains_key("data") => {
                map.remove("data").unwrap_or(serde_json::Value::Null)
            }
            other => other,
        };
        serde_json::from_value(payload)
            .map_err(|e| GatewayError::Unavailable(format!("unexpected response shape: {e}")))
    }

    fn record_success(&self) {
        let mut liveness = self.liveness.lock();
        if *liveness != Liveness::Up {
            *liveness = Liveness::Up;
            drop(liveness);
            tracing::info!("gateway reachable");
            let _ = self.events.send(GatewayEvent::Connected);
        }
    }

    fn record_failure(&self) {
        let mut liveness = self.liveness.lock();
        if *liveness != Liveness::Down {
            *liveness = Liveness::Down;
            drop(liveness);
            tracing::warn!("gateway unreachable");
            let _ = self.events.send(GatewayEvent::Disconnected);
        }
    }
}
