// Path: crates/aex-store/src/error.rs
use thiserror::Error;

/// Errors raised by the durable store (C1). Mirrors the granularity of
/// `ioi-api::storage::StorageError`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found")]
    NotFound,
    #[error("invalid state transition from {from} for execution {execution_id}")]
    InvalidState {
        execution_id: String,
        from: &'static str,
    },
    #[error("idempotency key conflict: same key, different request for agent {agent_id}")]
    IdempotencyConflict { agent_id: String },
    #[error("store busy: serialization failures exceeded retry budget")]
    Busy,
}

impl From<aex_types::error::TypesError> for StoreError {
    fn from(e: aex_types::error::TypesError) -> Self {
        StoreError::Encode(e.to_string())
    }
}
