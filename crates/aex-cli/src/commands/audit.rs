// Path: crates/aex-cli/src/commands/audit.rs
//! `aex audit`: replays the hash chain and reconciles ledger spend (C9),
//! exiting non-zero if anything is broken. Intended for a cron job or a
//! pre-deploy gate, not the serving path.

use aex_core::{verify, Runtime};
use aex_policy::{PluginRegistry, PolicyEngine};
use aex_store::{RedbStore, Store};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
pub struct AuditArgs {
    #[clap(long, env = "AEX_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Chain scopes to verify. Defaults to the single-tenant "global" scope.
    #[clap(long = "scope", default_value = "global")]
    scopes: Vec<String>,
}

pub async fn run(args: AuditArgs) -> anyhow::Result<()> {
    let runtime_config = aex_core::RuntimeConfig::load()?;
    let store: Arc<dyn Store> = Arc::new(RedbStore::open(&runtime_config.db_path)?);
    let policy = PolicyEngine::new(PluginRegistry::new(Vec::new())?);
    let model_catalog = super::catalog::load(args.config_dir.as_deref())?;
    let rt = Runtime::new(store, policy, model_catalog, runtime_config);

    let scopes: Vec<&str> = args.scopes.iter().map(String::as_str).collect();
    let report = verify(&rt, &scopes).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_healthy() {
        anyhow::bail!(
            "replay found {} chain mismatch(es) and {} spend mismatch(es)",
            report.chain_mismatches.len(),
            report.spend_mismatches.len()
        );
    }

    println!(
        "ok: {} scope(s), {} event(s) checked, chain and spend reconcile",
        report.scopes_checked.len(),
        report.events_checked
    );
    Ok(())
}
