// Error taxonomy shared by every crate that depends on `aex-types`.
use thiserror::Error;

/// Errors raised while building, encoding, or validating domain records.
#[derive(Debug, Error)]
pub enum TypesError {
    #[error("canonical encode error: {0}")]
    Encode(String),
    #[error("canonical decode error: {0}")]
    Decode(String),
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: String, to: String },
    #[error("invariant violated: {0}")]
    InvariantViolated(&'static str),
}
