//! Hashing primitives shared by fingerprinting (C3), the policy engine
//! (C4's `decision_hash`), and the event-log hash chain (C1).
//!
//! Grounded in `ioi-crypto::algorithms::hash`, but using `sha2` directly
//! rather than the `dcrypt` wrapper — the AEX core has no use for
//! algorithm-agility here, only a single, ubiquitous SHA-256 primitive
//! (see DESIGN.md).

pub mod chain;
pub mod fingerprint;

use sha2::{Digest, Sha256};

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// Lowercase-hex encoding of a 32-byte digest, used for `token_hash` and
/// for display/logging of hashes.
pub fn hex32(bytes: [u8; 32]) -> String {
    hex::encode(bytes)
}

/// Unpadded Base32 (RFC 4648) encoding, used for `execution_id` and other
/// identifiers that must be URL-safe and case-insensitive.
pub fn base32_encode(bytes: &[u8]) -> String {
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, bytes)
}
