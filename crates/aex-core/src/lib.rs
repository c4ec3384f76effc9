// Path: crates/aex-core/src/lib.rs
//! The AEX governance core: identity & auth (C2), fingerprinting (C3),
//! rate limiting (C5), admission (C6), dispatch & settlement (C7),
//! recovery (C8), and replay verification (C9). C1 (the durable store)
//! and C4 (policy) live in their own crates (`aex-store`, `aex-policy`)
//! and are wired in through `Runtime`.

pub mod admission;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ratelimit;
pub mod recovery;
pub mod replay;
pub mod runtime;

#[cfg(test)]
mod test_support;

pub use admission::{admit, AdmissionDecision, AdmissionRequest, AdmitOutcome};
pub use auth::{authenticate, AuthPrincipal};
pub use config::RuntimeConfig;
pub use dispatch::{dispatch_stream, dispatch_unary, DispatchContext, StreamFrame, Usage};
pub use error::{AdmissionError, DispatchError};
pub use ratelimit::check_rate;
pub use replay::{verify, verify_global, ReplayReport};
pub use recovery::{spawn_periodic, sweep, SweepReport};
pub use runtime::{RouteOverrides, Runtime};
