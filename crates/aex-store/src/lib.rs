//! Transactional persistence for the AEX governance gateway (C1).
//!
//! `redb`-backed, mirroring `ioi-storage`'s table-definition style, but
//! with synchronous read-your-writes consistency: every admission/ledger
//! primitive commits one `redb` write transaction before returning, so
//! budget and idempotency invariants never observe a half-applied write.

mod codec;
pub mod error;
mod redb_store;
mod tables;
pub mod traits;

pub use error::StoreError;
pub use redb_store::RedbStore;
pub use traits::{CommitResult, RateOutcome, ReserveOutcome, Store};
