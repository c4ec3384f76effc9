// Path: crates/aex-gateway/src/lib.rs
//! The AEX HTTP surface (§6): the OpenAI-compatible northbound routes and
//! the admin surface, wired through `aex-core`'s `Runtime`. Grounded in
//! `http-rpc-gateway::run_server` for the tower middleware stack, rate
//! limiter, and graceful-shutdown wiring.

pub mod error;
pub mod handlers;
pub mod headers;
pub mod metrics;
pub mod middleware;
pub mod provider;
pub mod sse;
pub mod state;

use aex_core::Runtime;
use anyhow::Result;
use axum::error_handling::HandleErrorLayer;
use axum::routing::{get, post};
use axum::Router;
use provider::ProviderRegistry;
use state::GatewayState;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower::{limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Transport-level knobs, separate from `aex_core::RuntimeConfig`: these
/// are about shaping HTTP traffic, not governance semantics.
pub struct GatewayConfig {
    pub listen_addr: String,
    pub rps: u32,
    pub burst: u32,
    pub body_limit_kb: usize,
    pub trusted_proxies: Vec<String>,
    pub config_dir: Option<PathBuf>,
    pub concurrency_limit: usize,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            rps: 50,
            burst: 100,
            body_limit_kb: 512,
            trusted_proxies: Vec::new(),
            config_dir: None,
            concurrency_limit: 256,
            request_timeout: Duration::from_secs(30),
        }
    }
}

fn northbound_router() -> Router<GatewayState> {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/responses", post(handlers::responses))
        .route("/v1/embeddings", post(handlers::embeddings))
        .route("/v1/tools/execute", post(handlers::tools_execute))
        .route("/openai/v1/chat/completions", post(handlers::chat_completions))
        .route("/openai/v1/responses", post(handlers::responses))
        .route("/openai/v1/embeddings", post(handlers::embeddings))
        .route("/openai/v1/tools/execute", post(handlers::tools_execute))
}

fn admin_router() -> Router<GatewayState> {
    Router::new()
        .route("/health", get(handlers::admin::health))
        .route("/ready", get(handlers::admin::ready))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/admin/activity", get(handlers::admin::activity))
        .route("/admin/replay", get(handlers::admin::replay))
        .route("/admin/reload_config", post(handlers::admin::reload_config))
        .route("/admin/control/:action", post(handlers::admin::control))
}

pub fn build_router(state: GatewayState, limiter: middleware::IpLimiter, config: &GatewayConfig) -> Router {
    northbound_router()
        .merge(admin_router())
        .route_layer(axum::middleware::from_fn_with_state(limiter, middleware::rate_limit_middleware))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(error::map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(config.concurrency_limit))
                .layer(TimeoutLayer::new(config.request_timeout)),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_kb * 1024))
}

pub async fn run_server(config: GatewayConfig, rt: Arc<Runtime>, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let providers = ProviderRegistry::load(config.config_dir.as_deref())?;
    let state = GatewayState::new(rt, providers, config.config_dir.clone());

    let trusted_proxies: Vec<IpAddr> = config.trusted_proxies.iter().filter_map(|s| IpAddr::from_str(s).ok()).collect();
    let limiter = middleware::IpLimiter::new(config.rps, config.burst, trusted_proxies);

    let app = build_router(state, limiter, &config);

    let addr: SocketAddr = config.listen_addr.parse()?;
    tracing::info!(%addr, "aex gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).with_graceful_shutdown(async move {
        shutdown_rx.changed().await.ok();
        tracing::info!("gateway shutting down gracefully");
    });

    if let Err(e) = server.await {
        tracing::error!(error = %e, "gateway server error");
    }

    Ok(())
}
