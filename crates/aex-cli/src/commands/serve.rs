// Path: crates/aex-cli/src/commands/serve.rs
//! `aex serve`: boots the store, policy engine, and model catalog, runs
//! the C8 startup sweep, then hands off to `aex_gateway::run_server`.

use super::catalog;
use aex_core::{sweep, Runtime};
use aex_policy::{PluginRegistry, PolicyEngine};
use aex_store::{RedbStore, Store};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Directory holding `gateway.toml`, `models.toml`, and `providers.toml`.
    /// Also read from `AEX_CONFIG_DIR` if unset.
    #[clap(long, env = "AEX_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Overrides `gateway.toml`'s listen port.
    #[clap(long)]
    listen: Option<String>,

    #[clap(long, default_value_t = 50)]
    rps: u32,

    #[clap(long, default_value_t = 100)]
    burst: u32,

    #[clap(long, default_value_t = 512)]
    body_limit_kb: usize,

    /// Proxy IPs whose `x-forwarded-for` header is trusted (repeatable).
    #[clap(long = "trusted-proxy")]
    trusted_proxies: Vec<String>,

    #[clap(long, default_value_t = 256)]
    concurrency_limit: usize,
}

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    aex_telemetry::init_tracing()?;

    let runtime_config = aex_core::RuntimeConfig::load()?;
    let listen_addr = args.listen.clone().unwrap_or_else(|| format!("0.0.0.0:{}", runtime_config.port));

    let store: Arc<dyn Store> = Arc::new(RedbStore::open(&runtime_config.db_path)?);
    let policy = PolicyEngine::new(PluginRegistry::new(Vec::new())?);
    let model_catalog = catalog::load(args.config_dir.as_deref())?;

    let rt = Arc::new(Runtime::new(store, policy, model_catalog, runtime_config));

    let sink = aex_telemetry::prometheus_sink::install()?;
    aex_telemetry::sinks::SINK.set(sink).ok();

    let startup_report = sweep(&rt).await?;
    tracing::info!(
        failed_orphans = startup_report.failed_orphans,
        released_expired = startup_report.released_expired,
        "startup recovery sweep complete"
    );
    let _sweep_handle = aex_core::spawn_periodic(rt.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let gateway_config = aex_gateway::GatewayConfig {
        listen_addr,
        rps: args.rps,
        burst: args.burst,
        body_limit_kb: args.body_limit_kb,
        trusted_proxies: args.trusted_proxies,
        config_dir: args.config_dir,
        concurrency_limit: args.concurrency_limit,
        ..Default::default()
    };

    aex_gateway::run_server(gateway_config, rt, shutdown_rx).await
}
