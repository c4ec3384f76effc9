// Path: crates/aex-store/src/traits.rs
//! The `Store` trait: every primitive in §4.1, exposed as `async fn` so
//! callers (the admission controller, dispatch settlement, recovery
//! sweep) never need to know the backend does its real work on a blocking
//! thread pool.

use crate::error::StoreError;
use aex_types::execution::Route;
use aex_types::{Agent, EventType, Execution, RateWindow, Reservation};
use async_trait::async_trait;
use serde_json::Value;

/// Outcome of `Store::reserve` (§4.1).
#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    /// Reservation admitted; the agent's `reserved_micro` has already been
    /// incremented and a `reserve` event appended.
    Reserved(Execution),
    /// `spent + reserved + est_cost > budget`; a `DENIED` row was written
    /// and a `deny.budget` event appended.
    AgentBudgetExceeded,
    /// An execution with this id already reached a terminal state; its
    /// cached response should be replayed verbatim.
    IdempotentHit(Execution),
    /// An execution with this id exists and is still in flight.
    InFlightDuplicate(Execution),
}

/// Outcome of the atomic rate-limit check-and-record (C5, backed by C1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOutcome {
    Admitted,
    RequestsExceeded,
    TokensExceeded,
}

/// Outcome of `Store::commit` describing whether the actual cost had to
/// be clamped to the reserved ceiling (§9 open question 1).
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub execution: Execution,
    pub clamped: bool,
    pub requested_cost_micro: u64,
}

/// The transactional persistence layer (C1). Implementations must run
/// every multi-row mutation inside one ACID transaction with row locking
/// on the affected agent and execution rows, and must serialize event-log
/// appends within a `chain_scope` (§4.1).
#[async_trait]
pub trait Store: Send + Sync {
    // -- Admission / ledger primitives (§4.1) --

    #[allow(clippy::too_many_arguments)]
    async fn reserve(
        &self,
        agent_id: &str,
        execution_id: &str,
        idempotency_key: Option<&str>,
        request_hash: [u8; 32],
        route: Route,
        model: &str,
        provider: &str,
        est_cost_micro: u64,
        ttl_ms: i64,
        now_ms: i64,
    ) -> Result<ReserveOutcome, StoreError>;

    async fn mark_dispatched(&self, execution_id: &str, now_ms: i64) -> Result<Execution, StoreError>;

    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        execution_id: &str,
        actual_cost_micro: u64,
        response_body: Value,
        status_code: u16,
        estimate: bool,
        clamp_overrun: bool,
        now_ms: i64,
    ) -> Result<CommitResult, StoreError>;

    async fn release(
        &self,
        execution_id: &str,
        reason: &str,
        now_ms: i64,
    ) -> Result<Execution, StoreError>;

    async fn fail(
        &self,
        execution_id: &str,
        status_code: u16,
        error_body: Value,
        now_ms: i64,
    ) -> Result<Execution, StoreError>;

    /// Records a denial that happens before any reservation exists (rate
    /// limit or policy, §4.6 steps 4-5): writes a terminal `DENIED`
    /// execution row and the matching `deny.rate`/`deny.policy` event.
    /// Idempotency-keyed identically to `reserve` so a retried denial
    /// does not create a duplicate row.
    #[allow(clippy::too_many_arguments)]
    async fn deny(
        &self,
        agent_id: &str,
        execution_id: &str,
        idempotency_key: Option<&str>,
        request_hash: [u8; 32],
        route: Route,
        model: &str,
        provider: &str,
        event_type: EventType,
        reason: &str,
        now_ms: i64,
    ) -> Result<(), StoreError>;

    // -- Reads --

    async fn lookup(&self, execution_id: &str) -> Result<Option<Execution>, StoreError>;
    async fn reservation(&self, execution_id: &str) -> Result<Option<Reservation>, StoreError>;
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError>;
    async fn find_agent_by_token_hash(&self, token_hash: &str) -> Result<Option<Agent>, StoreError>;

    /// Backward-compat lookup by raw token equality against deprecation-
    /// flagged legacy rows (§4.2), consulted only when `find_agent_by_token_hash`
    /// misses.
    async fn find_agent_by_raw_token(&self, raw_token: &str) -> Result<Option<Agent>, StoreError>;

    /// Every execution not yet in a terminal state; consumed by the
    /// recovery sweep (C8).
    async fn non_terminal_executions(&self) -> Result<Vec<Execution>, StoreError>;

    /// Executions whose `RESERVED` ticket has expired, for the recovery
    /// sweep's periodic pass.
    async fn expired_reservations(&self, now_ms: i64) -> Result<Vec<Execution>, StoreError>;

    // -- Rate limiting (C5) --

    async fn check_and_record_rate(
        &self,
        agent_id: &str,
        rpm_limit: u32,
        tpm_limit: u32,
        est_tokens: u32,
        now_ms: i64,
    ) -> Result<RateOutcome, StoreError>;

    async fn rate_window(&self, agent_id: &str) -> Result<RateWindow, StoreError>;

    // -- Agent administration --

    async fn create_agent(&self, agent: Agent) -> Result<(), StoreError>;
    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError>;

    // -- Event log (C9 replay verifier reads through these) --

    async fn events_in_scope(&self, scope: &str) -> Result<Vec<aex_types::Event>, StoreError>;
    async fn events_for_execution(&self, execution_id: &str) -> Result<Vec<aex_types::Event>, StoreError>;
    async fn events_for_agent(&self, agent_id: &str) -> Result<Vec<aex_types::Event>, StoreError>;
}
