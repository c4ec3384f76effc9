// Path: crates/aex-core/src/error.rs
//! Error taxonomy for the admission and dispatch pipelines (§7). Each
//! variant names its HTTP mapping and ledger event in its doc comment;
//! `aex-gateway` owns the actual `IntoResponse` impl so this crate stays
//! transport-agnostic.

use thiserror::Error;

/// Failures from auth (C2) through reservation (C6, backed by C1).
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// No `Authorization` header. HTTP 401, no ledger event.
    #[error("missing bearer token")]
    AuthMissing,
    /// Token hash does not match any agent. HTTP 401, no ledger event.
    #[error("invalid bearer token")]
    AuthInvalid,
    /// `token_expires_at` has passed. HTTP 401, no ledger event.
    #[error("bearer token expired")]
    AuthExpired,
    /// Raw token shorter than 32 hex chars (128 bits). HTTP 401.
    #[error("bearer token below minimum entropy")]
    AuthWeakToken,
    /// Same `Idempotency-Key` seen before with a different `request_hash`.
    /// HTTP 409, no ledger event.
    #[error("idempotency key reused with a different request body")]
    IdempotencyConflict,
    /// An execution with this id is non-terminal. HTTP 409, no ledger event.
    #[error("an identical request is already in flight")]
    InFlightDuplicate,
    /// Could not acquire the per-execution mutex within the bound. HTTP 503.
    #[error("timed out waiting for the in-flight request to settle")]
    MutexTimeout,
    /// C5 sliding-window check failed. HTTP 429, `deny.rate` event.
    #[error("rate limit exceeded: {0}")]
    RateExceeded(&'static str),
    /// C4 kernel or plugin denial. HTTP 403, `deny.policy` event.
    #[error("policy denied: {0}")]
    PolicyDenied(String),
    /// `spent + reserved + est > budget`. HTTP 402, `deny.budget` event.
    #[error("insufficient budget")]
    BudgetExhausted,
    /// Sustained store serialization failures; circuit breaker open. HTTP 503.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error(transparent)]
    Store(#[from] aex_store::StoreError),
    #[error(transparent)]
    Policy(#[from] aex_policy::PolicyError),
    #[error(transparent)]
    Types(#[from] aex_types::TypesError),
}

impl AdmissionError {
    /// Design-level error kind name from §7, used for metrics labels and
    /// log fields; never shown to callers verbatim.
    pub fn kind(&self) -> &'static str {
        match self {
            AdmissionError::AuthMissing => "auth.missing",
            AdmissionError::AuthInvalid => "auth.invalid",
            AdmissionError::AuthExpired => "auth.expired",
            AdmissionError::AuthWeakToken => "auth.invalid",
            AdmissionError::IdempotencyConflict => "idempotency.conflict",
            AdmissionError::InFlightDuplicate => "inflight.duplicate",
            AdmissionError::MutexTimeout => "store.conflict",
            AdmissionError::RateExceeded(_) => "rate.exceeded",
            AdmissionError::PolicyDenied(_) => "policy.denied",
            AdmissionError::BudgetExhausted => "budget.exhausted",
            AdmissionError::StoreUnavailable(_) => "store.conflict",
            AdmissionError::Store(_) => "store.conflict",
            AdmissionError::Policy(_) => "policy.denied",
            AdmissionError::Types(_) => "store.conflict",
        }
    }
}

/// Failures from the dispatch/settlement path (C7).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Upstream returned 4xx/5xx. HTTP passthrough or 502, `fail` event.
    #[error("provider error: {0}")]
    ProviderError(String),
    /// Upstream call exceeded the configured timeout. HTTP 504, `fail` event.
    #[error("provider timed out")]
    ProviderTimeout,
    /// Client disconnected before the unary response arrived. `release`
    /// with reason `client_cancel`; no HTTP response is sent.
    #[error("client canceled before settlement")]
    ClientCancel,
    #[error(transparent)]
    Store(#[from] aex_store::StoreError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl DispatchError {
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::ProviderError(_) => "provider.error",
            DispatchError::ProviderTimeout => "provider.timeout",
            DispatchError::ClientCancel => "provider.error",
            DispatchError::Store(_) => "store.conflict",
            DispatchError::Http(e) if e.is_timeout() => "provider.timeout",
            DispatchError::Http(_) => "provider.error",
        }
    }
}
