//! Canonical JSON encoding used for fingerprints, decision hashes, and
//! event-log payload hashing. Two requests that are semantically identical
//! but differ in key order or whitespace must encode to the same bytes.

use crate::error::TypesError;
use serde::Serialize;

/// Encodes `value` as JCS (RFC 8785) canonical JSON bytes.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, TypesError> {
    serde_jcs::to_string(value)
        .map(String::into_bytes)
        .map_err(|e| TypesError::Encode(e.to_string()))
}

/// Encodes `value` as a JCS canonical JSON string.
pub fn canonical_string<T: Serialize>(value: &T) -> Result<String, TypesError> {
    serde_jcs::to_string(value).map_err(|e| TypesError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_is_irrelevant() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }
}
