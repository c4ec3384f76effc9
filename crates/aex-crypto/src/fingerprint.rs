// Path: crates/aex-crypto/src/fingerprint.rs
//! Request fingerprinting (C3): canonical `request_hash` and deterministic
//! `execution_id` derivation.

use crate::{base32_encode, sha256};
use aex_types::codec::canonical_bytes;
use aex_types::error::TypesError;
use aex_types::execution::Route;
use serde::Serialize;
use serde_json::Value;

/// Fields stripped from the request body before hashing because they vary
/// between otherwise-identical retries without changing the semantic
/// content of the call (§4.3).
const VOLATILE_TOP_LEVEL_FIELDS: &[&str] = &["user", "timestamp", "request_timestamp"];

/// Removes the volatile fields named in §4.3 from a request body, leaving
/// message content (and everything else) verbatim.
pub fn strip_volatile_fields(body: &Value) -> Value {
    let mut out = body.clone();
    if let Some(obj) = out.as_object_mut() {
        for field in VOLATILE_TOP_LEVEL_FIELDS {
            obj.remove(*field);
        }
        if let Some(Value::Object(stream_options)) = obj.get_mut("stream_options") {
            stream_options.remove("include_usage");
            if stream_options.is_empty() {
                obj.remove("stream_options");
            }
        }
    }
    out
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    agent_id: &'a str,
    route: Route,
    model: &'a str,
    body: Value,
}

/// `request_hash = SHA256(canonical_json({agent_id, route, model,
/// body_without_volatile_fields}))`.
pub fn request_hash(
    agent_id: &str,
    route: Route,
    model: &str,
    body: &Value,
) -> Result<[u8; 32], TypesError> {
    let input = FingerprintInput {
        agent_id,
        route,
        model,
        body: strip_volatile_fields(body),
    };
    Ok(sha256(canonical_bytes(&input)?))
}

/// Derives the deterministic `execution_id` for a request.
///
/// With an `Idempotency-Key`: `"ex_" || base32(SHA256(agent_id ||
/// key))`. Without one: `"ex_" || base32(request_hash)[..22]`. Same
/// inputs always produce the same id (§4.3).
pub fn execution_id(agent_id: &str, idempotency_key: Option<&str>, request_hash: [u8; 32]) -> String {
    match idempotency_key {
        Some(key) => {
            let mut buf = Vec::with_capacity(agent_id.len() + key.len());
            buf.extend_from_slice(agent_id.as_bytes());
            buf.extend_from_slice(key.as_bytes());
            format!("ex_{}", base32_encode(&sha256(buf)))
        }
        None => {
            let encoded = base32_encode(&request_hash);
            let truncated: String = encoded.chars().take(22).collect();
            format!("ex_{}", truncated)
        }
    }
}
