// Path: crates/aex-core/src/auth.rs
//! Identity & Auth (C2): bearer token to agent identity.

use crate::error::AdmissionError;
use crate::runtime::Runtime;
use aex_crypto::hex32;
use aex_types::{Capabilities, Scope};

/// Raw tokens below 32 hex chars carry under 128 bits of entropy (§4.2).
const MIN_TOKEN_HEX_CHARS: usize = 32;

/// The resolved identity of a caller, handed to C3 onward.
#[derive(Debug, Clone)]
pub struct AuthPrincipal {
    pub agent_id: String,
    pub scope: Scope,
    pub capabilities: Capabilities,
    pub rpm_limit: u32,
    pub tpm_limit: u32,
    pub budget_micro: aex_types::Micro,
}

/// Resolves a raw bearer token to an `AuthPrincipal` (§4.2). Expects the
/// token with any `Bearer ` prefix already stripped.
pub async fn authenticate(rt: &Runtime, raw_token: &str) -> Result<AuthPrincipal, AdmissionError> {
    if raw_token.is_empty() {
        return Err(AdmissionError::AuthMissing);
    }
    if raw_token.len() < MIN_TOKEN_HEX_CHARS {
        return Err(AdmissionError::AuthWeakToken);
    }

    let token_hash = hex32(aex_crypto::sha256(raw_token.as_bytes()));
    let agent = match rt.store.find_agent_by_token_hash(&token_hash).await? {
        Some(agent) => agent,
        None => {
            let agent = rt
                .store
                .find_agent_by_raw_token(raw_token)
                .await?
                .ok_or(AdmissionError::AuthInvalid)?;
            tracing::warn!(agent_id = %agent.agent_id, "authenticated via deprecated legacy raw-token fallback");
            agent
        }
    };

    if let Some(expires_at) = agent.token_expires_at {
        if expires_at < rt.now_ms() {
            return Err(AdmissionError::AuthExpired);
        }
    }

    Ok(AuthPrincipal {
        agent_id: agent.agent_id,
        scope: agent.scope,
        capabilities: agent.capabilities,
        rpm_limit: agent.rpm_limit,
        tpm_limit: agent.tpm_limit,
        budget_micro: agent.budget_micro,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_agent, InMemoryStore};
    use crate::config::RuntimeConfig;
    use aex_policy::{PluginRegistry, PolicyEngine};
    use aex_types::ModelCatalog;
    use std::sync::Arc;

    fn runtime_with(store: InMemoryStore) -> Runtime {
        Runtime::new(
            Arc::new(store),
            PolicyEngine::new(PluginRegistry::default()),
            ModelCatalog::default(),
            RuntimeConfig::default(),
        )
    }

    #[tokio::test]
    async fn rejects_short_token() {
        let rt = runtime_with(InMemoryStore::new());
        let err = authenticate(&rt, "short").await.unwrap_err();
        assert!(matches!(err, AdmissionError::AuthWeakToken));
    }

    #[tokio::test]
    async fn resolves_known_token() {
        let token = "a".repeat(40);
        let token_hash = hex32(aex_crypto::sha256(token.as_bytes()));
        let store = InMemoryStore::new();
        store.insert_agent(test_agent("agent-1", 1_000_000, &token_hash)).await;
        let rt = runtime_with(store);

        let principal = authenticate(&rt, &token).await.unwrap();
        assert_eq!(principal.agent_id, "agent-1");
    }

    #[tokio::test]
    async fn falls_back_to_legacy_raw_token_on_hash_miss() {
        let store = InMemoryStore::new();
        let mut agent = test_agent("agent-1", 1_000_000, "not-the-real-hash");
        agent.legacy_raw_token = Some("legacy-plaintext-token-0123456789".to_string());
        store.insert_agent(agent).await;
        let rt = runtime_with(store);

        let principal = authenticate(&rt, "legacy-plaintext-token-0123456789").await.unwrap();
        assert_eq!(principal.agent_id, "agent-1");
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let token = "b".repeat(40);
        let token_hash = hex32(aex_crypto::sha256(token.as_bytes()));
        let store = InMemoryStore::new();
        let mut agent = test_agent("agent-1", 1_000_000, &token_hash);
        agent.token_expires_at = Some(-1);
        store.insert_agent(agent).await;
        let rt = runtime_with(store);

        let err = authenticate(&rt, &token).await.unwrap_err();
        assert!(matches!(err, AdmissionError::AuthExpired));
    }
}
