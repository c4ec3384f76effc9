// Path: crates/aex-store/src/tables.rs
//! redb table definitions and key encoding helpers, in the style of
//! `ioi-storage::redb_epoch_store` (prefix-encoded keys, big-endian
//! integers for ordered scans).

use redb::TableDefinition;

pub const AGENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("AGENTS");
pub const AGENTS_BY_TOKEN_HASH: TableDefinition<&str, &str> =
    TableDefinition::new("AGENTS_BY_TOKEN_HASH");
/// Backward-compat index for agents carrying a `legacy_raw_token` (§4.2).
pub const AGENTS_BY_LEGACY_RAW_TOKEN: TableDefinition<&str, &str> =
    TableDefinition::new("AGENTS_BY_LEGACY_RAW_TOKEN");

pub const EXECUTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("EXECUTIONS");
pub const EXECUTIONS_BY_IDEMPOTENCY: TableDefinition<&str, &str> =
    TableDefinition::new("EXECUTIONS_BY_IDEMPOTENCY");

pub const RESERVATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("RESERVATIONS");

/// Keyed by `scope || 0x00 || seq_be(8)` for ordered per-scope scans.
pub const EVENT_LOG: TableDefinition<&[u8], &[u8]> = TableDefinition::new("EVENT_LOG");
/// Keyed by `scope`; value = `seq_be(8) || event_hash(32)`, the chain head
/// row used to linearize appends without a full scan (§4.1).
pub const CHAIN_HEAD: TableDefinition<&str, &[u8; 40]> = TableDefinition::new("CHAIN_HEAD");

pub const RATE_WINDOWS: TableDefinition<&str, &[u8]> = TableDefinition::new("RATE_WINDOWS");

pub fn be64(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}

pub fn idempotency_key(agent_id: &str, key: &str) -> String {
    format!("{agent_id}\u{0}{key}")
}

pub fn event_key(scope: &str, seq: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(scope.len() + 1 + 8);
    out.extend_from_slice(scope.as_bytes());
    out.push(0u8);
    out.extend_from_slice(&be64(seq));
    out
}

pub fn event_scope_prefix(scope: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(scope.len() + 1);
    out.extend_from_slice(scope.as_bytes());
    out.push(0u8);
    out
}
