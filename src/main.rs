//! opsdeck -- operations dashboard backend.
//!
//! Supervises a fleet of agent sessions running behind an external gateway
//! control plane, tracks human-authored tasks, and streams state changes to
//! connected dashboard clients in real time. When the gateway is
//! unreachable the dashboard keeps working against cached or synthetic
//! session data.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser as ClapParser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opsdeck::api::{self, auth, AppContext, ContextConfig, RouterConfig};
use opsdeck::config::{default_config_path, default_data_dir, DashboardConfig};
use opsdeck::gateway::GatewayConfig;

/// opsdeck -- operations dashboard backend
///
/// Serves the dashboard HTTP API and the realtime WebSocket channel, and
/// talks to the session gateway on behalf of every connected client.
#[derive(ClapParser, Debug)]
#[command(name = "opsdeck", version, about, long_about = None)]
struct Cli {
    /// Address to bind the HTTP/WebSocket server
    #[arg(long, default_value = "127.0.0.1:3001")]
    bind: SocketAddr,

    /// Base URL of the session gateway control plane
    #[arg(long, env = "OPSDECK_GATEWAY_URL")]
    gateway_url: Option<String>,

    /// API key sent to the gateway on every request
    #[arg(long, env = "OPSDECK_GATEWAY_KEY")]
    gateway_key: Option<String>,

    /// Dashboard login password (generated and printed if omitted)
    #[arg(long, env = "OPSDECK_PASSWORD")]
    password: Option<String>,

    /// Secret used to sign dashboard tokens (ephemeral one generated if omitted)
    #[arg(long, env = "OPSDECK_JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Directory for the JSON task/feed store
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Path to a TOML config file (flags and env override file values)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Snapshot broadcast interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Session cache TTL in milliseconds
    #[arg(long)]
    cache_ttl_ms: Option<u64>,

    /// Per-IP request rate limit (requests per second) for the API
    #[arg(long)]
    rate_limit: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let file = DashboardConfig::load(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?
        .unwrap_or_default();
    let gateway_section = file.gateway.unwrap_or_default();
    let auth_section = file.auth.unwrap_or_default();

    let gateway_url = cli
        .gateway_url
        .or(gateway_section.url)
        .unwrap_or_else(|| "http://127.0.0.1:3002".to_string());
    let gateway_key = cli.gateway_key.or(gateway_section.api_key);
    let password = cli.password.or(auth_section.password).unwrap_or_else(|| {
        let generated = auth::generate_secret(16);
        eprintln!("opsdeck: dashboard password (generated): {generated}");
        generated
    });
    let jwt_secret = cli
        .jwt_secret
        .or(auth_section.jwt_secret)
        .unwrap_or_else(|| {
            tracing::info!("no JWT secret configured, generating an ephemeral one");
            auth::generate_secret(48)
        });
    let data_dir = cli.data_dir.or(file.data_dir).unwrap_or_else(default_data_dir);
    let poll_interval =
        Duration::from_millis(cli.poll_interval_ms.or(file.poll_interval_ms).unwrap_or(5_000));
    let cache_ttl = Duration::from_millis(cli.cache_ttl_ms.or(file.cache_ttl_ms).unwrap_or(5_000));

    let ctx = AppContext::build(ContextConfig {
        gateway: GatewayConfig {
            base_url: gateway_url.clone(),
            api_key: gateway_key,
            ..Default::default()
        },
        cache_ttl,
        password,
        jwt_secret,
        data_dir,
    })
    .context("opening store")?;
    ctx.start_polling(poll_interval);

    let app = api::router(
        ctx.clone(),
        RouterConfig {
            rate_limit: cli.rate_limit,
        },
    );
    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    tracing::info!(addr = %cli.bind, gateway = %gateway_url, "opsdeck listening");

    let (server_shutdown_tx, server_shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                server_shutdown_rx.await.ok();
            })
            .await
    });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    tracing::info!("received Ctrl+C, shutting down");

    // Single teardown path: poll tick, gateway probe, connection handlers.
    ctx.teardown();
    // Give WS handlers a moment to flush close frames before the server stops.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let _ = server_shutdown_tx.send(());

    match http_handle.await {
        Ok(result) => result.context("HTTP server error")?,
        Err(e) => tracing::warn!(?e, "HTTP server task panicked"),
    }

    tracing::info!("opsdeck exiting");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "opsdeck=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
