// Path: crates/aex-gateway/src/headers.rs
//! §6 "Headers consumed"/"Headers emitted" — parsing and naming in one
//! place so every handler agrees on exact header spelling.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

pub const EXECUTION_ID: &str = "x-aex-execution-id";
pub const RESERVE_MICRO: &str = "x-aex-reserve-micro";
pub const COMMIT_MICRO: &str = "x-aex-commit-micro";
pub const IDEMPOTENT_HIT: &str = "x-aex-idempotent-hit";

pub fn bearer_token(headers: &HeaderMap) -> &str {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

pub fn idempotency_key(headers: &HeaderMap) -> Option<&str> {
    headers.get("idempotency-key").and_then(|v| v.to_str().ok())
}

pub fn provider_key(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-aex-provider-key").and_then(|v| v.to_str().ok())
}

pub fn admin_key(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-aex-admin-key").and_then(|v| v.to_str().ok())
}

pub fn insert_execution_headers(headers: &mut HeaderMap, execution_id: &str, reserve_micro: u64, commit_micro: Option<u64>, idempotent_hit: bool) {
    headers.insert(HeaderName::from_static(EXECUTION_ID), HeaderValue::from_str(execution_id).unwrap_or(HeaderValue::from_static("")));
    headers.insert(HeaderName::from_static(RESERVE_MICRO), HeaderValue::from(reserve_micro));
    if let Some(commit) = commit_micro {
        headers.insert(HeaderName::from_static(COMMIT_MICRO), HeaderValue::from(commit));
    }
    headers.insert(
        HeaderName::from_static(IDEMPOTENT_HIT),
        HeaderValue::from_static(if idempotent_hit { "true" } else { "false" }),
    );
}
