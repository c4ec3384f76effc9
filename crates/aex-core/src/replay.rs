// Path: crates/aex-core/src/replay.rs
//! Replay Verifier (C9): recomputes the hash chain for one or more
//! ledger scopes and cross-checks aggregated `commit` amounts against
//! each agent's `spent_micro` (§4.9).

use crate::runtime::Runtime;
use aex_crypto::chain::event_hash;
use aex_store::StoreError;
use aex_types::event::GENESIS_HASH;
use serde::Serialize;
use std::collections::HashMap;

/// One broken link in the chain: the event at `seq` did not hash the way
/// its stored `event_hash` claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainMismatch {
    pub chain_scope: String,
    pub seq: u64,
    #[serde(with = "hex32_serde")]
    pub expected: [u8; 32],
    #[serde(with = "hex32_serde")]
    pub stored: [u8; 32],
}

mod hex32_serde {
    pub fn serialize<S: serde::Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&aex_crypto::hex32(*bytes))
    }
}

/// An agent whose ledger-derived spend disagrees with its stored
/// `spent_micro` (`commit` events summed, minus nothing — refunds never
/// retroactively reduce a past commit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendMismatch {
    pub agent_id: String,
    pub ledger_total_micro: u64,
    pub stored_spent_micro: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub scopes_checked: Vec<String>,
    pub events_checked: usize,
    pub chain_mismatches: Vec<ChainMismatch>,
    pub spend_mismatches: Vec<SpendMismatch>,
}

impl ReplayReport {
    pub fn is_healthy(&self) -> bool {
        self.chain_mismatches.is_empty() && self.spend_mismatches.is_empty()
    }
}

/// Walks `scopes` in ascending `seq` order, recomputing `event_hash` at
/// each step, then reconciles per-agent `commit` totals against
/// `agents.spent_micro` across every scope checked.
pub async fn verify(rt: &Runtime, scopes: &[&str]) -> Result<ReplayReport, StoreError> {
    let mut report = ReplayReport::default();
    let mut ledger_spend: HashMap<String, u64> = HashMap::new();

    for scope in scopes {
        report.scopes_checked.push((*scope).to_string());
        let mut events = rt.store.events_in_scope(scope).await?;
        events.sort_by_key(|e| e.seq);

        let mut prev_hash = GENESIS_HASH;
        for event in &events {
            report.events_checked += 1;
            let expected = event_hash(prev_hash, &event.payload, event.event_type, event.seq)
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            if expected != event.event_hash {
                report.chain_mismatches.push(ChainMismatch {
                    chain_scope: (*scope).to_string(),
                    seq: event.seq,
                    expected,
                    stored: event.event_hash,
                });
            }
            prev_hash = event.event_hash;

            if event.event_type == aex_types::EventType::Commit {
                if let (Some(agent_id), Some(amount)) = (
                    event.agent_id.as_deref(),
                    event.payload.get("actual_cost_micro").and_then(serde_json::Value::as_u64),
                ) {
                    *ledger_spend.entry(agent_id.to_string()).or_insert(0) += amount;
                }
            }
        }
    }

    for agent in rt.store.list_agents().await? {
        let ledger_total = ledger_spend.get(&agent.agent_id).copied().unwrap_or(0);
        if ledger_total != agent.spent_micro.0 {
            report.spend_mismatches.push(SpendMismatch {
                agent_id: agent.agent_id,
                ledger_total_micro: ledger_total,
                stored_spent_micro: agent.spent_micro.0,
            });
        }
    }

    Ok(report)
}

/// Convenience entry point for the single-tenant default scope.
pub async fn verify_global(rt: &Runtime) -> Result<ReplayReport, StoreError> {
    verify(rt, &["global"]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::test_support::{test_agent, InMemoryStore};
    use aex_policy::{PluginRegistry, PolicyEngine};
    use aex_store::Store;
    use aex_types::{execution::Route, ModelCatalog};
    use std::sync::Arc;

    async fn runtime_with(store: InMemoryStore) -> Runtime {
        Runtime::new(Arc::new(store), PolicyEngine::new(PluginRegistry::default()), ModelCatalog::default(), RuntimeConfig::default())
    }

    #[tokio::test]
    async fn healthy_chain_and_spend_reconcile() {
        let store = InMemoryStore::new();
        store.insert_agent(test_agent("agent-1", 1_000_000, &"d".repeat(64))).await;
        store
            .reserve("agent-1", "ex_1", None, [0u8; 32], Route::Chat, "gpt-x", "openai", 1_000, 60_000, 0)
            .await
            .unwrap();
        store.mark_dispatched("ex_1", 1).await.unwrap();
        store.commit("ex_1", 900, serde_json::json!({}), 200, false, true, 2).await.unwrap();

        let rt = runtime_with(store).await;
        let report = verify_global(&rt).await.unwrap();
        assert!(report.is_healthy(), "{report:?}");
        assert_eq!(report.events_checked, 2);
    }

    #[tokio::test]
    async fn spend_mismatch_is_detected() {
        let store = InMemoryStore::new();
        store.insert_agent(test_agent("agent-1", 1_000_000, &"e".repeat(64))).await;
        store
            .reserve("agent-1", "ex_2", None, [0u8; 32], Route::Chat, "gpt-x", "openai", 1_000, 60_000, 0)
            .await
            .unwrap();
        store.mark_dispatched("ex_2", 1).await.unwrap();
        store.commit("ex_2", 900, serde_json::json!({}), 200, false, true, 2).await.unwrap();

        let rt = runtime_with(store).await;
        // Tamper with the agent's stored spend directly through create_agent
        // (simulating a corrupted row) to exercise mismatch detection.
        let mut tampered = rt.store.get_agent("agent-1").await.unwrap().unwrap();
        tampered.spent_micro = aex_types::Micro(1);
        rt.store.create_agent(tampered).await.unwrap();

        let report = verify_global(&rt).await.unwrap();
        assert_eq!(report.spend_mismatches.len(), 1);
        assert_eq!(report.spend_mismatches[0].ledger_total_micro, 900);
    }
}
