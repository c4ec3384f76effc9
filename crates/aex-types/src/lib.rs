//! Shared data model for the AEX governance gateway.
//!
//! This crate holds the durable record types (`Agent`, `Execution`,
//! `Reservation`, `Event`), the canonical-JSON codec used for fingerprints
//! and hash-chain payloads, and the crate-wide error taxonomy. It has no
//! knowledge of storage or HTTP — those live in `aex-store` and
//! `aex-gateway` respectively.

pub mod agent;
pub mod catalog;
pub mod clock;
pub mod codec;
pub mod error;
pub mod event;
pub mod execution;
pub mod money;
pub mod ratewindow;

pub use agent::{Agent, Capabilities, Scope};
pub use catalog::{ModelCatalog, ModelInfo};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::TypesError;
pub use event::{Event, EventType};
pub use execution::{Execution, ExecutionState, Reservation, Route};
pub use money::Micro;
pub use ratewindow::RateWindow;
