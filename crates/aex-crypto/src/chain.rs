// Path: crates/aex-crypto/src/chain.rs
//! Hash-chain linking for the append-only event log (§3 EventLog,
//! §4.1 "Hash-chain linearization").

use crate::sha256;
use aex_types::codec::canonical_bytes;
use aex_types::error::TypesError;
use aex_types::event::EventType;
use serde::Serialize;

/// Computes `event_hash = SHA256(prev_hash || canonical(payload) ||
/// event_type || seq)`. `seq` is mixed in as its big-endian bytes so two
/// otherwise-identical events at different chain positions never collide.
pub fn event_hash<P: Serialize>(
    prev_hash: [u8; 32],
    payload: &P,
    event_type: EventType,
    seq: u64,
) -> Result<[u8; 32], TypesError> {
    let mut buf = Vec::with_capacity(32 + 256);
    buf.extend_from_slice(&prev_hash);
    buf.extend_from_slice(&canonical_bytes(payload)?);
    buf.extend_from_slice(event_type.as_str().as_bytes());
    buf.extend_from_slice(&seq.to_be_bytes());
    Ok(sha256(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aex_types::event::GENESIS_HASH;
    use serde_json::json;

    #[test]
    fn same_inputs_same_hash() {
        let p = json!({"a": 1});
        let h1 = event_hash(GENESIS_HASH, &p, EventType::Reserve, 0).unwrap();
        let h2 = event_hash(GENESIS_HASH, &p, EventType::Reserve, 0).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn seq_is_mixed_in() {
        let p = json!({"a": 1});
        let h1 = event_hash(GENESIS_HASH, &p, EventType::Reserve, 0).unwrap();
        let h2 = event_hash(GENESIS_HASH, &p, EventType::Reserve, 1).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn prev_hash_changes_chain() {
        let p = json!({"a": 1});
        let h1 = event_hash(GENESIS_HASH, &p, EventType::Reserve, 0).unwrap();
        let h2 = event_hash(h1, &p, EventType::Reserve, 1).unwrap();
        assert_ne!(h1, h2);
    }
}
