// Path: crates/aex-gateway/src/state.rs
//! `GatewayState`: the axum `State` bundled once at startup, mirroring
//! `http-rpc-gateway::lib`'s `GatewayState`.

use crate::provider::ProviderRegistry;
use aex_core::Runtime;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Emergency controls wired to `POST /admin/control/{pause_all,sandbox_all,kill_all}`.
/// Transport-level switches, not a new governance primitive: they gate
/// the gateway's handlers, never the ledger's own invariants.
#[derive(Debug, Default)]
pub struct AdmissionGate {
    /// When set, every northbound route returns 503 before admission runs.
    paused: AtomicBool,
    /// When set, requests are admitted and policy-evaluated normally, but
    /// dispatch is skipped and the reservation is released: useful for
    /// rehearsing policy/budget changes without spending real money.
    sandboxed: AtomicBool,
}

impl AdmissionGate {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_sandboxed(&self) -> bool {
        self.sandboxed.load(Ordering::SeqCst)
    }

    pub fn pause_all(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn sandbox_all(&self) {
        self.sandboxed.store(true, Ordering::SeqCst);
    }

    pub fn unsandbox(&self) {
        self.sandboxed.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct GatewayState {
    pub rt: Arc<Runtime>,
    pub providers: Arc<RwLock<ProviderRegistry>>,
    pub config_dir: Option<PathBuf>,
    pub gate: Arc<AdmissionGate>,
}

impl GatewayState {
    pub fn new(rt: Arc<Runtime>, providers: ProviderRegistry, config_dir: Option<PathBuf>) -> Self {
        Self { rt, providers: Arc::new(RwLock::new(providers)), config_dir, gate: Arc::new(AdmissionGate::default()) }
    }

    /// Re-reads `providers.toml` from `config_dir` (`/admin/reload_config`).
    /// The model catalog itself is loaded and owned by `aex-cli`'s `serve`
    /// command at process start; a full catalog hot-swap would need
    /// interior mutability on `Runtime::catalog` that this implementation
    /// does not add (see DESIGN.md).
    pub fn reload_providers(&self) -> anyhow::Result<()> {
        let fresh = ProviderRegistry::load(self.config_dir.as_deref())?;
        *self.providers.write().expect("providers lock poisoned") = fresh;
        Ok(())
    }
}
