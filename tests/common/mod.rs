#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::RwLock;

use opsdeck::api::{AppContext, ContextConfig, RouterConfig};
use opsdeck::gateway::GatewayConfig;

pub const TEST_PASSWORD: &str = "test-password";
pub const TEST_SECRET: &str = "test-signing-secret";

/// Scriptable stand-in for the session gateway control plane.
#[derive(Clone)]
pub struct StubGateway {
    pub addr: SocketAddr,
    /// Number of `/api/sessions` fetches the stub has served.
    pub session_fetches: Arc<AtomicUsize>,
    healthy: Arc<AtomicBool>,
    sessions: Arc<RwLock<Vec<serde_json::Value>>>,
}

impl StubGateway {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.session_fetches.load(Ordering::SeqCst)
    }
}

fn default_session() -> serde_json::Value {
    serde_json::json!({
        "id": "agent-real-001",
        "label": "real",
        "status": "running",
        "model": "claude-sonnet-4-5",
        "createdAt": 1_000u64,
        "lastActivityAt": 2_000u64,
    })
}

async fn stub_health(State(stub): State<StubGateway>) -> axum::response::Response {
    if stub.healthy.load(Ordering::SeqCst) {
        Json(serde_json::json!({ "data": { "status": "ok" } })).into_response()
    } else {
        offline_response()
    }
}

async fn stub_sessions(State(stub): State<StubGateway>) -> axum::response::Response {
    let _ = stub.session_fetches.fetch_add(1, Ordering::SeqCst);
    if stub.healthy.load(Ordering::SeqCst) {
        Json(serde_json::json!({ "data": *stub.sessions.read() })).into_response()
    } else {
        offline_response()
    }
}

async fn stub_spawn(
    State(stub): State<StubGateway>,
    Json(body): Json<serde_json::Value>,
) -> axum::response::Response {
    if !stub.healthy.load(Ordering::SeqCst) {
        return offline_response();
    }
    let label = body["label"].as_str().unwrap_or("unnamed");
    let session = serde_json::json!({
        "id": format!("agent-{label}-999"),
        "label": label,
        "status": "running",
        "model": body.get("model").cloned().unwrap_or_else(|| "claude-sonnet-4".into()),
        "createdAt": 5_000u64,
        "lastActivityAt": 5_000u64,
    });
    stub.sessions.write().push(session.clone());
    Json(serde_json::json!({ "data": session })).into_response()
}

async fn stub_kill(
    State(stub): State<StubGateway>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if !stub.healthy.load(Ordering::SeqCst) {
        return offline_response();
    }
    let mut sessions = stub.sessions.write();
    let before = sessions.len();
    sessions.retain(|s| s["id"] != id.as_str());
    if sessions.len() == before {
        (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("session not found: {id}") })),
        )
            .into_response()
    } else {
        Json(serde_json::json!({ "data": { "success": true } })).into_response()
    }
}

async fn stub_send(State(stub): State<StubGateway>) -> axum::response::Response {
    if !stub.healthy.load(Ordering::SeqCst) {
        return offline_response();
    }
    Json(serde_json::json!({ "data": { "success": true } })).into_response()
}

async fn stub_transcript(
    State(stub): State<StubGateway>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if !stub.healthy.load(Ordering::SeqCst) {
        return offline_response();
    }
    Json(serde_json::json!({ "data": [{
        "role": "user",
        "content": format!("transcript for {id}"),
        "timestamp": 9_000u64,
    }] }))
    .into_response()
}

fn offline_response() -> axum::response::Response {
    (
        axum::http::StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "error": "gateway offline" })),
    )
        .into_response()
}

/// Spawn the stub gateway on an ephemeral port, seeded with one session.
pub async fn spawn_stub_gateway() -> StubGateway {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stub = StubGateway {
        addr,
        session_fetches: Arc::new(AtomicUsize::new(0)),
        healthy: Arc::new(AtomicBool::new(true)),
        sessions: Arc::new(RwLock::new(vec![default_session()])),
    };
    let router = Router::new()
        .route("/health", get(stub_health))
        .route("/api/sessions", get(stub_sessions))
        .route("/api/sessions/spawn", post(stub_spawn))
        .route("/api/sessions/{id}/kill", post(stub_kill))
        .route("/api/sessions/{id}/send", post(stub_send))
        .route("/api/sessions/{id}/transcript", get(stub_transcript))
        .with_state(stub.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    stub
}

/// Running dashboard backend plus everything a test needs to talk to it.
pub struct TestHarness {
    pub ctx: AppContext,
    pub addr: SocketAddr,
    pub token: String,
    _data_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws(&self, query: &str) -> String {
        format!("ws://{}/ws{}", self.addr, query)
    }
}

/// Build a context against the given gateway URL and serve the router on an
/// ephemeral port.
pub async fn spawn_dashboard(
    gateway_url: &str,
    poll_interval: Duration,
    cache_ttl: Duration,
) -> TestHarness {
    let data_dir = tempfile::tempdir().unwrap();
    let ctx = AppContext::build(ContextConfig {
        gateway: GatewayConfig {
            base_url: gateway_url.to_string(),
            probe_interval: Duration::from_millis(100),
            ..Default::default()
        },
        cache_ttl,
        password: TEST_PASSWORD.into(),
        jwt_secret: TEST_SECRET.into(),
        data_dir: data_dir.path().to_path_buf(),
    })
    .unwrap();
    ctx.start_polling(poll_interval);

    let app = opsdeck::api::router(ctx.clone(), RouterConfig::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let token = ctx.auth.issue("admin").unwrap();
    TestHarness {
        ctx,
        addr,
        token,
        _data_dir: data_dir,
    }
}
