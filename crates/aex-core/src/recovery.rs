// Path: crates/aex-core/src/recovery.rs
//! Recovery Sweep (C8): reconciles executions orphaned by a process
//! restart or an expired reservation. Runs once at startup before
//! traffic is accepted, then every `reserve_ttl / 2` (§4.8).

use crate::runtime::Runtime;
use aex_store::StoreError;
use aex_types::ExecutionState;
use tracing::{info, warn};

/// Counts of rows reconciled in one pass, for logging and `/admin/activity`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub failed_orphans: usize,
    pub released_expired: usize,
}

/// Fails every `RESERVING`/`DISPATCHED` row (orphaned mid-flight by a
/// restart) and releases every `RESERVED` row past its TTL. Safe to call
/// repeatedly: every transition is a CAS, so a row already moved on by a
/// concurrent sweep or live traffic is simply skipped.
pub async fn sweep(rt: &Runtime) -> Result<SweepReport, StoreError> {
    let mut report = SweepReport::default();
    let now_ms = rt.now_ms();

    for execution in rt.store.non_terminal_executions().await? {
        if matches!(execution.state, ExecutionState::Reserving | ExecutionState::Dispatched) {
            match rt
                .store
                .fail(
                    &execution.execution_id,
                    0,
                    serde_json::json!({"error": "process_restart"}),
                    now_ms,
                )
                .await
            {
                Ok(_) => {
                    report.failed_orphans += 1;
                    warn!(execution_id = %execution.execution_id, "recovered orphaned execution: process_restart");
                }
                Err(StoreError::InvalidState { .. }) => {
                    // Already moved on concurrently; not our problem anymore.
                }
                Err(e) => return Err(e),
            }
        }
    }

    for execution in rt.store.expired_reservations(now_ms).await? {
        match rt.store.release(&execution.execution_id, "expired", now_ms).await {
            Ok(_) => {
                report.released_expired += 1;
                info!(execution_id = %execution.execution_id, "released expired reservation");
            }
            Err(StoreError::InvalidState { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// Spawns the periodic sweep loop (`reserve_ttl / 2` per §4.8), returning
/// a handle the caller can abort on shutdown. The caller is expected to
/// have already run one `sweep` synchronously before serving traffic.
pub fn spawn_periodic(rt: std::sync::Arc<Runtime>) -> tokio::task::JoinHandle<()> {
    let interval = rt.config.reserve_ttl() / 2;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it, startup already swept.
        loop {
            ticker.tick().await;
            match sweep(&rt).await {
                Ok(report) if report.failed_orphans > 0 || report.released_expired > 0 => {
                    info!(?report, "periodic recovery sweep reconciled rows");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "periodic recovery sweep failed"),
            }
        }
    })
}
