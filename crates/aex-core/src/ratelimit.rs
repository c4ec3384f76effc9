// Path: crates/aex-core/src/ratelimit.rs
//! Rate Limiter (C5): thin orchestration over `Store::check_and_record_rate`,
//! mapping the durable sliding-window outcome to an admission error and a
//! ledger event payload.

use crate::error::AdmissionError;
use crate::runtime::Runtime;
use aex_store::RateOutcome;

/// Checks and, on success, records one sample against the agent's 60s
/// request/token windows (§4.5). Returns the event payload to append on
/// denial; the caller is responsible for the `deny.rate` event itself
/// since only it knows the execution id.
pub async fn check_rate(
    rt: &Runtime,
    agent_id: &str,
    rpm_limit: u32,
    tpm_limit: u32,
    est_tokens: u32,
) -> Result<(), AdmissionError> {
    let now_ms = rt.now_ms();
    match rt
        .store
        .check_and_record_rate(agent_id, rpm_limit, tpm_limit, est_tokens, now_ms)
        .await?
    {
        RateOutcome::Admitted => Ok(()),
        RateOutcome::RequestsExceeded => Err(AdmissionError::RateExceeded("requests")),
        RateOutcome::TokensExceeded => Err(AdmissionError::RateExceeded("tokens")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::test_support::InMemoryStore;
    use aex_policy::{PluginRegistry, PolicyEngine};
    use aex_types::ModelCatalog;
    use std::sync::Arc;

    #[tokio::test]
    async fn fake_store_always_admits() {
        let rt = Runtime::new(
            Arc::new(InMemoryStore::new()),
            PolicyEngine::new(PluginRegistry::default()),
            ModelCatalog::default(),
            RuntimeConfig::default(),
        );
        assert!(check_rate(&rt, "agent-1", 10, 1000, 50).await.is_ok());
    }
}
