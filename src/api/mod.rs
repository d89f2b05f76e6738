pub mod auth;
pub mod error;
mod handlers;
mod ws;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{HeaderName, HeaderValue},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::broadcast::Broadcaster;
use crate::cache::{FleetView, SessionCache};
use crate::connectivity::ConnectivityMonitor;
use crate::gateway::{GatewayClient, GatewayConfig};
use crate::shutdown::ShutdownCoordinator;
use crate::store::{Store, StoreError};

use auth::AuthVerifier;
use handlers::*;

/// Everything a handler can reach, constructed once at process start and
/// passed by reference to every route. There is no process-wide singleton:
/// lifecycle is create at startup, [`teardown`](AppContext::teardown) on
/// the shutdown signal.
#[derive(Clone)]
pub struct AppContext {
    pub gateway: GatewayClient,
    pub view: Arc<FleetView>,
    pub monitor: ConnectivityMonitor,
    pub broadcaster: Broadcaster,
    pub store: Arc<Store>,
    pub auth: AuthVerifier,
    pub shutdown: ShutdownCoordinator,
}

/// Inputs for [`AppContext::build`], fixed at construction time.
pub struct ContextConfig {
    pub gateway: GatewayConfig,
    pub cache_ttl: Duration,
    pub password: String,
    pub jwt_secret: String,
    pub data_dir: PathBuf,
}

impl AppContext {
    /// Wire up the full component graph: gateway adapter (probe started),
    /// cache + fleet view, connectivity monitor (bridged to the adapter's
    /// liveness events), broadcaster, store, and auth verifier.
    pub fn build(config: ContextConfig) -> Result<Self, StoreError> {
        let gateway = GatewayClient::spawn(config.gateway);
        let monitor = ConnectivityMonitor::new();
        let view = Arc::new(FleetView::new(
            gateway.clone(),
            SessionCache::new(config.cache_ttl),
            monitor.clone(),
        ));
        let broadcaster = Broadcaster::new(view.clone(), monitor.clone());
        let store = Arc::new(Store::open(&config.data_dir)?);
        let auth = AuthVerifier::new(&config.jwt_secret, &config.password);
        let shutdown = ShutdownCoordinator::new();

        monitor.watch_gateway(gateway.subscribe(), shutdown.subscribe());

        Ok(Self {
            gateway,
            view,
            monitor,
            broadcaster,
            store,
            auth,
            shutdown,
        })
    }

    /// Start the broadcaster's snapshot tick.
    pub fn start_polling(&self, interval: Duration) {
        self.broadcaster.spawn_tick(interval);
    }

    /// Single teardown path: stop the poll tick, cancel the gateway's
    /// retry probe, and signal every connection handler to wind down.
    pub fn teardown(&self) {
        self.broadcaster.shutdown();
        self.gateway.close();
        self.shutdown.shutdown();
    }
}

/// Configuration for the HTTP/WS router.
#[derive(Debug, Default)]
pub struct RouterConfig {
    /// Per-IP request rate limit (requests per second) on the protected
    /// API routes. None disables limiting.
    pub rate_limit: Option<u32>,
}

pub fn router(ctx: AppContext, config: RouterConfig) -> Router {
    let protected = Router::new()
        .route("/agents", get(agents_list))
        .route("/agents/spawn", post(agent_spawn))
        .route("/agents/{id}", get(agent_get))
        .route("/agents/{id}/kill", post(agent_kill))
        .route("/agents/{id}/send", post(agent_send))
        .route("/agents/{id}/transcript", get(agent_transcript))
        .route("/tasks", get(tasks_list).post(task_create))
        .route(
            "/tasks/{id}",
            get(task_get).put(task_update).delete(task_delete),
        )
        .route("/tasks/{id}/comment", post(task_comment))
        .route("/feed", get(feed_list))
        .route("/feed/stats", get(feed_stats));

    // Apply rate limiting to the protected routes if configured.
    let protected = if let Some(rps) = config.rate_limit {
        use tower_governor::{
            governor::GovernorConfigBuilder, key_extractor::PeerIpKeyExtractor, GovernorLayer,
        };
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(u64::from(rps))
                .burst_size(rps)
                .key_extractor(PeerIpKeyExtractor)
                .finish()
                .unwrap(),
        );
        protected.layer(GovernorLayer::new(governor_conf))
    } else {
        protected
    };

    let verifier = ctx.auth.clone();
    let protected = protected.layer(middleware::from_fn(move |req, next| {
        let v = verifier.clone();
        async move { auth::require_auth(v, req, next).await }
    }));

    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/verify", get(verify))
        .merge(protected);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .route("/ws", get(ws::ws_upgrade))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
}
