// Path: crates/aex-store/src/redb_store.rs
//! `redb`-backed implementation of the `Store` trait (C1).
//!
//! Grounded in `ioi-storage::redb_epoch_store::RedbEpochStore`: one
//! `redb::Database`, `TableDefinition`s with big-endian-encoded keys for
//! ordered scans, and a write-transaction-per-mutation model. Budget and
//! ledger rows must be immediately (not eventually) consistent, so there
//! is no background-thread/memtable write-behind here — every mutating
//! primitive commits its `redb::WriteTransaction` synchronously before
//! returning (see DESIGN.md).

use crate::codec::{decode, encode};
use crate::error::StoreError;
use crate::tables::*;
use crate::traits::{CommitResult, RateOutcome, ReserveOutcome, Store};
use aex_crypto::chain::event_hash;
use aex_types::event::GENESIS_HASH;
use aex_types::execution::Route;
use aex_types::{Agent, Event, EventType, Execution, ExecutionState, RateWindow, Reservation};
use async_trait::async_trait;
use redb::{Database, ReadableTable, WriteTransaction};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const MAX_RETRY_ATTEMPTS: u32 = 5;
const CHAIN_SCOPE: &str = "global";

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(20u64.saturating_mul(1u64 << attempt.min(6)))
}

/// Runs `f` inside a fresh `redb::WriteTransaction`, retrying
/// `begin_write`/`commit` failures up to `MAX_RETRY_ATTEMPTS` times with
/// exponential backoff (§4.1 "Failure semantics"). Business-logic errors
/// returned by `f` (budget denial, invalid state, ...) are not retried —
/// they abort the transaction (by drop) and propagate immediately.
fn with_write_retry<T>(
    db: &Database,
    mut f: impl FnMut(&WriteTransaction) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut attempt = 0u32;
    loop {
        let txn = match db.begin_write() {
            Ok(t) => t,
            Err(e) => {
                attempt += 1;
                if attempt >= MAX_RETRY_ATTEMPTS {
                    return Err(StoreError::Busy);
                }
                std::thread::sleep(backoff(attempt));
                tracing::warn!(target: "aex-store", attempt, error = %e, "begin_write failed, retrying");
                continue;
            }
        };
        match f(&txn) {
            Ok(value) => match txn.commit() {
                Ok(()) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRY_ATTEMPTS {
                        return Err(StoreError::Busy);
                    }
                    std::thread::sleep(backoff(attempt));
                    tracing::warn!(target: "aex-store", attempt, error = %e, "commit failed, retrying");
                }
            },
            Err(business_error) => return Err(business_error),
        }
    }
}

/// Appends one event to the scope's hash chain, using `CHAIN_HEAD` as the
/// O(1) lock/lookup row that linearizes appends within a scope (§4.1).
fn append_event(
    txn: &WriteTransaction,
    scope: &str,
    execution_id: Option<&str>,
    agent_id: Option<&str>,
    event_type: EventType,
    payload: Value,
    now_ms: i64,
) -> Result<Event, StoreError> {
    let mut head_tbl = txn
        .open_table(CHAIN_HEAD)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    let (seq, prev_hash) = match head_tbl
        .get(scope)
        .map_err(|e| StoreError::Backend(e.to_string()))?
    {
        Some(v) => {
            let bytes = v.value();
            let mut seq_bytes = [0u8; 8];
            seq_bytes.copy_from_slice(&bytes[0..8]);
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&bytes[8..40]);
            (u64::from_be_bytes(seq_bytes) + 1, hash)
        }
        None => (0, GENESIS_HASH),
    };

    let hash = event_hash(prev_hash, &payload, event_type, seq)?;
    let event = Event {
        seq,
        chain_scope: scope.to_string(),
        execution_id: execution_id.map(str::to_string),
        agent_id: agent_id.map(str::to_string),
        event_type,
        payload,
        prev_hash,
        event_hash: hash,
        recorded_at: now_ms,
    };

    let mut log_tbl = txn
        .open_table(EVENT_LOG)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    log_tbl
        .insert(event_key(scope, seq).as_slice(), encode(&event)?.as_slice())
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    let mut head_buf = [0u8; 40];
    head_buf[0..8].copy_from_slice(&be64(seq));
    head_buf[8..40].copy_from_slice(&hash);
    head_tbl
        .insert(scope, &head_buf)
        .map_err(|e| StoreError::Backend(e.to_string()))?;

    Ok(event)
}

fn read_agent(txn: &WriteTransaction, agent_id: &str) -> Result<Option<Agent>, StoreError> {
    let tbl = txn
        .open_table(AGENTS)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    tbl.get(agent_id)
        .map_err(|e| StoreError::Backend(e.to_string()))?
        .map(|v| decode(v.value()))
        .transpose()
}

fn write_agent(txn: &WriteTransaction, agent: &Agent) -> Result<(), StoreError> {
    let mut tbl = txn
        .open_table(AGENTS)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    tbl.insert(agent.agent_id.as_str(), encode(agent)?.as_slice())
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(())
}

fn read_execution(txn: &WriteTransaction, execution_id: &str) -> Result<Option<Execution>, StoreError> {
    let tbl = txn
        .open_table(EXECUTIONS)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    tbl.get(execution_id)
        .map_err(|e| StoreError::Backend(e.to_string()))?
        .map(|v| decode(v.value()))
        .transpose()
}

fn write_execution(txn: &WriteTransaction, exec: &Execution) -> Result<(), StoreError> {
    let mut tbl = txn
        .open_table(EXECUTIONS)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    tbl.insert(exec.execution_id.as_str(), encode(exec)?.as_slice())
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(())
}

fn write_reservation(txn: &WriteTransaction, r: &Reservation) -> Result<(), StoreError> {
    let mut tbl = txn
        .open_table(RESERVATIONS)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    tbl.insert(r.execution_id.as_str(), encode(r)?.as_slice())
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(())
}

fn delete_reservation(txn: &WriteTransaction, execution_id: &str) -> Result<(), StoreError> {
    let mut tbl = txn
        .open_table(RESERVATIONS)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    tbl.remove(execution_id)
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(())
}

/// Un-reserves `reserve_micro` from an agent on a non-commit terminal
/// transition (release/fail). The matching `Reservation` row is deleted
/// by the caller, which also knows the execution id.
fn refund_reserve(agent: &mut Agent, reserve_micro: aex_types::Micro) {
    agent.reserved_micro = agent.reserved_micro.saturating_sub(reserve_micro);
}

/// A durable, `redb`-backed implementation of [`Store`].
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        let txn = db.begin_write().map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            txn.open_table(AGENTS).map_err(|e| StoreError::Backend(e.to_string()))?;
            txn.open_table(AGENTS_BY_TOKEN_HASH)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            txn.open_table(AGENTS_BY_LEGACY_RAW_TOKEN)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            txn.open_table(EXECUTIONS).map_err(|e| StoreError::Backend(e.to_string()))?;
            txn.open_table(EXECUTIONS_BY_IDEMPOTENCY)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            txn.open_table(RESERVATIONS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            txn.open_table(EVENT_LOG).map_err(|e| StoreError::Backend(e.to_string()))?;
            txn.open_table(CHAIN_HEAD).map_err(|e| StoreError::Backend(e.to_string()))?;
            txn.open_table(RATE_WINDOWS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Database>) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(db))
            .await
            .map_err(|e| StoreError::Backend(format!("blocking task panicked: {e}")))?
    }
}

#[async_trait]
impl Store for RedbStore {
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
    ) -> Result<ReserveOutcome, StoreError> {
        let agent_id = agent_id.to_string();
        let execution_id = execution_id.to_string();
        let idempotency_key = idempotency_key.map(str::to_string);
        let model = model.to_string();
        let provider = provider.to_string();

        self.blocking(move |db| {
            with_write_retry(&db, |txn| {
                // Idempotency-key index takes precedence over the bare execution id.
                if let Some(key) = &idempotency_key {
                    let idem_tbl = txn
                        .open_table(EXECUTIONS_BY_IDEMPOTENCY)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    let existing_id = idem_tbl
                        .get(idempotency_key(&agent_id, key).as_str())
                        .map_err(|e| StoreError::Backend(e.to_string()))?
                        .map(|v| v.value().to_string());
                    if let Some(existing_id) = existing_id {
                        let existing = read_execution(txn, &existing_id)?
                            .ok_or(StoreError::NotFound)?;
                        if existing.request_hash != request_hash {
                            return Err(StoreError::IdempotencyConflict { agent_id: agent_id.clone() });
                        }
                        return Ok(if existing.state.is_terminal() {
                            ReserveOutcome::IdempotentHit(existing)
                        } else {
                            ReserveOutcome::InFlightDuplicate(existing)
                        });
                    }
                }

                if let Some(existing) = read_execution(txn, &execution_id)? {
                    return Ok(if existing.state.is_terminal() {
                        ReserveOutcome::IdempotentHit(existing)
                    } else {
                        ReserveOutcome::InFlightDuplicate(existing)
                    });
                }

                let mut agent = read_agent(txn, &agent_id)?.ok_or(StoreError::NotFound)?;

                let mut exec = Execution {
                    execution_id: execution_id.clone(),
                    agent_id: agent_id.clone(),
                    idempotency_key: idempotency_key.clone(),
                    request_hash,
                    route,
                    model: model.clone(),
                    provider: provider.clone(),
                    state: ExecutionState::Reserving,
                    reserve_micro: aex_types::Micro(0),
                    commit_micro: aex_types::Micro(0),
                    release_micro: aex_types::Micro(0),
                    response_cache: None,
                    status_code: None,
                    created_at: now_ms,
                    terminal_at: None,
                };

                let est = aex_types::Micro(est_cost_micro);
                let projected = agent
                    .spent_micro
                    .checked_add(agent.reserved_micro)
                    .and_then(|t| t.checked_add(est));

                let outcome = match projected {
                    Some(total) if total <= agent.budget_micro => {
                        exec.apply_transition(ExecutionState::Reserved)?;
                        exec.reserve_micro = est;
                        agent.reserved_micro = agent
                            .reserved_micro
                            .checked_add(est)
                            .ok_or(StoreError::Backend("reserved_micro overflow".into()))?;

                        let reservation = Reservation {
                            execution_id: execution_id.clone(),
                            agent_id: agent_id.clone(),
                            reserved_micro: est,
                            state: ExecutionState::Reserved,
                            expires_at: now_ms + ttl_ms,
                            version: 1,
                        };
                        write_reservation(txn, &reservation)?;

                        if let Some(key) = &idempotency_key {
                            let mut idem_tbl = txn
                                .open_table(EXECUTIONS_BY_IDEMPOTENCY)
                                .map_err(|e| StoreError::Backend(e.to_string()))?;
                            idem_tbl
                                .insert(idempotency_key(&agent_id, key).as_str(), execution_id.as_str())
                                .map_err(|e| StoreError::Backend(e.to_string()))?;
                        }

                        append_event(
                            txn,
                            CHAIN_SCOPE,
                            Some(&execution_id),
                            Some(&agent_id),
                            EventType::Reserve,
                            serde_json::json!({
                                "execution_id": execution_id,
                                "agent_id": agent_id,
                                "route": route,
                                "model": model,
                                "reserve_micro": est.0,
                            }),
                            now_ms,
                        )?;

                        ReserveOutcome::Reserved(exec.clone())
                    }
                    _ => {
                        exec.apply_transition(ExecutionState::Denied)?;
                        exec.terminal_at = Some(now_ms);

                        if let Some(key) = &idempotency_key {
                            let mut idem_tbl = txn
                                .open_table(EXECUTIONS_BY_IDEMPOTENCY)
                                .map_err(|e| StoreError::Backend(e.to_string()))?;
                            idem_tbl
                                .insert(idempotency_key(&agent_id, key).as_str(), execution_id.as_str())
                                .map_err(|e| StoreError::Backend(e.to_string()))?;
                        }

                        append_event(
                            txn,
                            CHAIN_SCOPE,
                            Some(&execution_id),
                            Some(&agent_id),
                            EventType::DenyBudget,
                            serde_json::json!({
                                "execution_id": execution_id,
                                "agent_id": agent_id,
                                "requested_micro": est_cost_micro,
                                "budget_micro": agent.budget_micro.0,
                                "spent_micro": agent.spent_micro.0,
                                "reserved_micro": agent.reserved_micro.0,
                            }),
                            now_ms,
                        )?;

                        ReserveOutcome::AgentBudgetExceeded
                    }
                };

                write_execution(txn, &exec)?;
                write_agent(txn, &agent)?;
                Ok(outcome)
            })
        })
        .await
    }

    async fn mark_dispatched(&self, execution_id: &str, now_ms: i64) -> Result<Execution, StoreError> {
        let execution_id = execution_id.to_string();
        self.blocking(move |db| {
            with_write_retry(&db, |txn| {
                let mut exec = read_execution(txn, &execution_id)?.ok_or(StoreError::NotFound)?;
                if exec.state != ExecutionState::Reserved {
                    return Err(StoreError::InvalidState {
                        execution_id: execution_id.clone(),
                        from: state_name(exec.state),
                    });
                }
                exec.apply_transition(ExecutionState::Dispatched)?;
                write_execution(txn, &exec)?;
                append_event(
                    txn,
                    CHAIN_SCOPE,
                    Some(&execution_id),
                    Some(&exec.agent_id),
                    EventType::Dispatch,
                    serde_json::json!({"execution_id": execution_id}),
                    now_ms,
                )?;
                Ok(exec)
            })
        })
        .await
    }

    async fn commit(
        &self,
        execution_id: &str,
        actual_cost_micro: u64,
        response_body: Value,
        status_code: u16,
        estimate: bool,
        clamp_overrun: bool,
        now_ms: i64,
    ) -> Result<CommitResult, StoreError> {
        let execution_id = execution_id.to_string();
        self.blocking(move |db| {
            with_write_retry(&db, |txn| {
                let mut exec = read_execution(txn, &execution_id)?.ok_or(StoreError::NotFound)?;
                if exec.state != ExecutionState::Dispatched {
                    return Err(StoreError::InvalidState {
                        execution_id: execution_id.clone(),
                        from: state_name(exec.state),
                    });
                }
                let mut agent = read_agent(txn, &exec.agent_id)?.ok_or(StoreError::NotFound)?;

                let requested = aex_types::Micro(actual_cost_micro);
                let overran = requested > exec.reserve_micro;
                let clamped = overran && clamp_overrun;
                let settled = if clamped { exec.reserve_micro } else { requested };
                if overran && !clamp_overrun {
                    tracing::warn!(
                        target: "aex-store",
                        execution_id = %execution_id,
                        requested_micro = actual_cost_micro,
                        reserve_micro = exec.reserve_micro.0,
                        "commit exceeded reservation with clamp_overrun disabled; settling full actual cost"
                    );
                }

                agent.reserved_micro = agent.reserved_micro.saturating_sub(exec.reserve_micro);
                agent.spent_micro = agent
                    .spent_micro
                    .checked_add(settled)
                    .ok_or(StoreError::Backend("spent_micro overflow".into()))?;

                exec.commit_micro = settled;
                exec.response_cache = Some(response_body);
                exec.status_code = Some(status_code);
                exec.terminal_at = Some(now_ms);
                exec.apply_transition(ExecutionState::Committed)?;
                exec.check_invariant()?;
                agent.check_invariant()?;

                write_execution(txn, &exec)?;
                write_agent(txn, &agent)?;
                delete_reservation(txn, &execution_id)?;

                append_event(
                    txn,
                    CHAIN_SCOPE,
                    Some(&execution_id),
                    Some(&exec.agent_id),
                    EventType::Commit,
                    serde_json::json!({
                        "execution_id": execution_id,
                        "actual_cost_micro": settled.0,
                        "requested_cost_micro": actual_cost_micro,
                        "clamped": clamped,
                        "estimate": estimate,
                    }),
                    now_ms,
                )?;

                Ok(CommitResult {
                    execution: exec,
                    clamped,
                    requested_cost_micro: actual_cost_micro,
                })
            })
        })
        .await
    }

    async fn release(
        &self,
        execution_id: &str,
        reason: &str,
        now_ms: i64,
    ) -> Result<Execution, StoreError> {
        let execution_id = execution_id.to_string();
        let reason = reason.to_string();
        self.blocking(move |db| {
            with_write_retry(&db, |txn| {
                let mut exec = read_execution(txn, &execution_id)?.ok_or(StoreError::NotFound)?;
                if !matches!(
                    exec.state,
                    ExecutionState::Reserving | ExecutionState::Reserved | ExecutionState::Dispatched
                ) {
                    return Err(StoreError::InvalidState {
                        execution_id: execution_id.clone(),
                        from: state_name(exec.state),
                    });
                }
                let mut agent = read_agent(txn, &exec.agent_id)?.ok_or(StoreError::NotFound)?;
                refund_reserve(&mut agent, exec.reserve_micro);

                exec.release_micro = exec.reserve_micro.saturating_sub(exec.commit_micro);
                exec.terminal_at = Some(now_ms);
                exec.apply_transition(ExecutionState::Released)?;
                exec.check_invariant()?;
                agent.check_invariant()?;

                write_execution(txn, &exec)?;
                write_agent(txn, &agent)?;
                delete_reservation(txn, &execution_id)?;

                append_event(
                    txn,
                    CHAIN_SCOPE,
                    Some(&execution_id),
                    Some(&exec.agent_id),
                    EventType::Release,
                    serde_json::json!({"execution_id": execution_id, "reason": reason}),
                    now_ms,
                )?;

                Ok(exec)
            })
        })
        .await
    }

    async fn fail(
        &self,
        execution_id: &str,
        status_code: u16,
        error_body: Value,
        now_ms: i64,
    ) -> Result<Execution, StoreError> {
        let execution_id = execution_id.to_string();
        self.blocking(move |db| {
            with_write_retry(&db, |txn| {
                let mut exec = read_execution(txn, &execution_id)?.ok_or(StoreError::NotFound)?;
                if !matches!(
                    exec.state,
                    ExecutionState::Reserving | ExecutionState::Reserved | ExecutionState::Dispatched
                ) {
                    return Err(StoreError::InvalidState {
                        execution_id: execution_id.clone(),
                        from: state_name(exec.state),
                    });
                }
                let mut agent = read_agent(txn, &exec.agent_id)?.ok_or(StoreError::NotFound)?;
                refund_reserve(&mut agent, exec.reserve_micro);

                exec.release_micro = exec.reserve_micro.saturating_sub(exec.commit_micro);
                exec.status_code = Some(status_code);
                exec.response_cache = Some(error_body.clone());
                exec.terminal_at = Some(now_ms);
                exec.apply_transition(ExecutionState::Failed)?;
                exec.check_invariant()?;
                agent.check_invariant()?;

                write_execution(txn, &exec)?;
                write_agent(txn, &agent)?;
                delete_reservation(txn, &execution_id)?;

                append_event(
                    txn,
                    CHAIN_SCOPE,
                    Some(&execution_id),
                    Some(&exec.agent_id),
                    EventType::Fail,
                    serde_json::json!({
                        "execution_id": execution_id,
                        "status_code": status_code,
                        "error": error_body,
                    }),
                    now_ms,
                )?;

                Ok(exec)
            })
        })
        .await
    }

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
    ) -> Result<(), StoreError> {
        let agent_id = agent_id.to_string();
        let execution_id = execution_id.to_string();
        let idempotency_key = idempotency_key.map(str::to_string);
        let model = model.to_string();
        let provider = provider.to_string();
        let reason = reason.to_string();

        self.blocking(move |db| {
            with_write_retry(&db, |txn| {
                if read_execution(txn, &execution_id)?.is_some() {
                    // Already recorded (retry of the same denial); no-op.
                    return Ok(());
                }

                let exec = Execution {
                    execution_id: execution_id.clone(),
                    agent_id: agent_id.clone(),
                    idempotency_key: idempotency_key.clone(),
                    request_hash,
                    route,
                    model: model.clone(),
                    provider: provider.clone(),
                    state: ExecutionState::Denied,
                    reserve_micro: aex_types::Micro(0),
                    commit_micro: aex_types::Micro(0),
                    release_micro: aex_types::Micro(0),
                    response_cache: None,
                    status_code: None,
                    created_at: now_ms,
                    terminal_at: Some(now_ms),
                };
                write_execution(txn, &exec)?;

                if let Some(key) = &idempotency_key {
                    let mut idem_tbl = txn
                        .open_table(EXECUTIONS_BY_IDEMPOTENCY)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    idem_tbl
                        .insert(idempotency_key(&agent_id, key).as_str(), execution_id.as_str())
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                }

                append_event(
                    txn,
                    CHAIN_SCOPE,
                    Some(&execution_id),
                    Some(&agent_id),
                    event_type,
                    serde_json::json!({
                        "execution_id": execution_id,
                        "agent_id": agent_id,
                        "reason": reason,
                    }),
                    now_ms,
                )?;

                Ok(())
            })
        })
        .await
    }

    async fn lookup(&self, execution_id: &str) -> Result<Option<Execution>, StoreError> {
        let execution_id = execution_id.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
            let tbl = txn
                .open_table(EXECUTIONS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            tbl.get(execution_id.as_str())
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .map(|v| decode(v.value()))
                .transpose()
        })
        .await
    }

    async fn reservation(&self, execution_id: &str) -> Result<Option<Reservation>, StoreError> {
        let execution_id = execution_id.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
            let tbl = txn
                .open_table(RESERVATIONS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            tbl.get(execution_id.as_str())
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .map(|v| decode(v.value()))
                .transpose()
        })
        .await
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        let agent_id = agent_id.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
            let tbl = txn
                .open_table(AGENTS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            tbl.get(agent_id.as_str())
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .map(|v| decode(v.value()))
                .transpose()
        })
        .await
    }

    async fn find_agent_by_token_hash(&self, token_hash: &str) -> Result<Option<Agent>, StoreError> {
        let token_hash = token_hash.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
            let idx = txn
                .open_table(AGENTS_BY_TOKEN_HASH)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let agent_id = idx
                .get(token_hash.as_str())
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .map(|v| v.value().to_string());
            match agent_id {
                None => Ok(None),
                Some(agent_id) => {
                    let tbl = txn
                        .open_table(AGENTS)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    tbl.get(agent_id.as_str())
                        .map_err(|e| StoreError::Backend(e.to_string()))?
                        .map(|v| decode(v.value()))
                        .transpose()
                }
            }
        })
        .await
    }

    async fn find_agent_by_raw_token(&self, raw_token: &str) -> Result<Option<Agent>, StoreError> {
        let raw_token = raw_token.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
            let idx = txn
                .open_table(AGENTS_BY_LEGACY_RAW_TOKEN)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let agent_id = idx
                .get(raw_token.as_str())
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .map(|v| v.value().to_string());
            match agent_id {
                None => Ok(None),
                Some(agent_id) => {
                    let tbl = txn
                        .open_table(AGENTS)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    tbl.get(agent_id.as_str())
                        .map_err(|e| StoreError::Backend(e.to_string()))?
                        .map(|v| decode(v.value()))
                        .transpose()
                }
            }
        })
        .await
    }

    async fn non_terminal_executions(&self) -> Result<Vec<Execution>, StoreError> {
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
            let tbl = txn
                .open_table(EXECUTIONS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let mut out = Vec::new();
            for entry in tbl.iter().map_err(|e| StoreError::Backend(e.to_string()))? {
                let (_, v) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
                let exec: Execution = decode(v.value())?;
                if !exec.state.is_terminal() {
                    out.push(exec);
                }
            }
            Ok(out)
        })
        .await
    }

    async fn expired_reservations(&self, now_ms: i64) -> Result<Vec<Execution>, StoreError> {
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
            let res_tbl = txn
                .open_table(RESERVATIONS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let exec_tbl = txn
                .open_table(EXECUTIONS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let mut out = Vec::new();
            for entry in res_tbl.iter().map_err(|e| StoreError::Backend(e.to_string()))? {
                let (k, v) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
                let reservation: Reservation = decode(v.value())?;
                if reservation.expires_at < now_ms {
                    if let Some(v) = exec_tbl
                        .get(k.value())
                        .map_err(|e| StoreError::Backend(e.to_string()))?
                    {
                        let exec: Execution = decode(v.value())?;
                        if exec.state == ExecutionState::Reserved {
                            out.push(exec);
                        }
                    }
                }
            }
            Ok(out)
        })
        .await
    }

    async fn check_and_record_rate(
        &self,
        agent_id: &str,
        rpm_limit: u32,
        tpm_limit: u32,
        est_tokens: u32,
        now_ms: i64,
    ) -> Result<RateOutcome, StoreError> {
        let agent_id = agent_id.to_string();
        self.blocking(move |db| {
            with_write_retry(&db, |txn| {
                let mut tbl = txn
                    .open_table(RATE_WINDOWS)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                let mut window: RateWindow = tbl
                    .get(agent_id.as_str())
                    .map_err(|e| StoreError::Backend(e.to_string()))?
                    .map(|v| decode(v.value()))
                    .transpose()?
                    .unwrap_or_default();
                window.trim(now_ms);

                let outcome = if rpm_limit > 0 && window.request_count() + 1 > rpm_limit {
                    RateOutcome::RequestsExceeded
                } else if tpm_limit > 0 && window.token_count() + est_tokens as u64 > tpm_limit as u64 {
                    RateOutcome::TokensExceeded
                } else {
                    window.push(now_ms, est_tokens);
                    RateOutcome::Admitted
                };

                tbl.insert(agent_id.as_str(), encode(&window)?.as_slice())
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                Ok(outcome)
            })
        })
        .await
    }

    async fn rate_window(&self, agent_id: &str) -> Result<RateWindow, StoreError> {
        let agent_id = agent_id.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
            let tbl = txn
                .open_table(RATE_WINDOWS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(tbl
                .get(agent_id.as_str())
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .map(|v| decode(v.value()))
                .transpose()?
                .unwrap_or_default())
        })
        .await
    }

    async fn create_agent(&self, agent: Agent) -> Result<(), StoreError> {
        self.blocking(move |db| {
            with_write_retry(&db, |txn| {
                agent.check_invariant()?;
                write_agent(txn, &agent)?;
                let mut idx = txn
                    .open_table(AGENTS_BY_TOKEN_HASH)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                idx.insert(agent.token_hash.as_str(), agent.agent_id.as_str())
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                if let Some(raw_token) = &agent.legacy_raw_token {
                    let mut legacy_idx = txn
                        .open_table(AGENTS_BY_LEGACY_RAW_TOKEN)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    legacy_idx
                        .insert(raw_token.as_str(), agent.agent_id.as_str())
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
            let tbl = txn
                .open_table(AGENTS)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let mut out = Vec::new();
            for entry in tbl.iter().map_err(|e| StoreError::Backend(e.to_string()))? {
                let (_, v) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
                out.push(decode(v.value())?);
            }
            Ok(out)
        })
        .await
    }

    async fn events_in_scope(&self, scope: &str) -> Result<Vec<Event>, StoreError> {
        let scope = scope.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
            let tbl = txn
                .open_table(EVENT_LOG)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            let prefix = event_scope_prefix(&scope);
            let mut out = Vec::new();
            for entry in tbl
                .range(prefix.as_slice()..)
                .map_err(|e| StoreError::Backend(e.to_string()))?
            {
                let (k, v) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
                if !k.value().starts_with(prefix.as_slice()) {
                    break;
                }
                out.push(decode(v.value())?);
            }
            Ok(out)
        })
        .await
    }

    async fn events_for_execution(&self, execution_id: &str) -> Result<Vec<Event>, StoreError> {
        let execution_id = execution_id.to_string();
        let all = self.events_in_scope(CHAIN_SCOPE).await?;
        Ok(all
            .into_iter()
            .filter(|e| e.execution_id.as_deref() == Some(execution_id.as_str()))
            .collect())
    }

    async fn events_for_agent(&self, agent_id: &str) -> Result<Vec<Event>, StoreError> {
        let agent_id = agent_id.to_string();
        let all = self.events_in_scope(CHAIN_SCOPE).await?;
        Ok(all
            .into_iter()
            .filter(|e| e.agent_id.as_deref() == Some(agent_id.as_str()))
            .collect())
    }
}

fn state_name(state: ExecutionState) -> &'static str {
    match state {
        ExecutionState::Reserving => "RESERVING",
        ExecutionState::Reserved => "RESERVED",
        ExecutionState::Dispatched => "DISPATCHED",
        ExecutionState::Committed => "COMMITTED",
        ExecutionState::Released => "RELEASED",
        ExecutionState::Denied => "DENIED",
        ExecutionState::Failed => "FAILED",
    }
}
