// Path: crates/aex-types/src/event.rs
use serde::{Deserialize, Serialize};

/// The 32-byte all-zero hash that seeds every event-log chain.
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Tag for an event-log entry. `deny.*` variants never have a matching
/// `commit`/`release`/`fail` for the same execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Reserve,
    Dispatch,
    Commit,
    Release,
    Fail,
    DenyBudget,
    DenyRate,
    DenyPolicy,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Reserve => "reserve",
            EventType::Dispatch => "dispatch",
            EventType::Commit => "commit",
            EventType::Release => "release",
            EventType::Fail => "fail",
            EventType::DenyBudget => "deny.budget",
            EventType::DenyRate => "deny.rate",
            EventType::DenyPolicy => "deny.policy",
        }
    }
}

/// One immutable, hash-chained append to the audit ledger.
///
/// `event_hash = SHA256(prev_hash || canonical(payload) || event_type ||
/// seq)`. `chain_scope` is `"global"` for a single-tenant deployment and
/// one value per tenant for multi-tenant deployments (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub chain_scope: String,
    pub execution_id: Option<String>,
    /// Denormalized for cheap per-agent projections (`events_for_agent`);
    /// not part of the hashed payload.
    pub agent_id: Option<String>,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub prev_hash: [u8; 32],
    pub event_hash: [u8; 32],
    pub recorded_at: i64,
}
