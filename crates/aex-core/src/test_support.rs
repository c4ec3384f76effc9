// Path: crates/aex-core/src/test_support.rs
//! Hand-rolled in-memory `Store` fake for `aex-core`'s unit tests,
//! mirroring the mock pattern in `ioi-api::test_utils`: a small
//! `Mutex`-guarded struct implementing the real trait, good enough to
//! exercise orchestration logic without pulling in `aex-store`.

#![cfg(test)]

use aex_store::{CommitResult, RateOutcome, ReserveOutcome, Store, StoreError};
use aex_types::execution::Route;
use aex_types::{Agent, Event, EventType, Execution, ExecutionState, RateWindow, Reservation};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

pub fn test_agent(agent_id: &str, budget_micro: u64, token_hash: &str) -> Agent {
    Agent {
        agent_id: agent_id.to_string(),
        name: agent_id.to_string(),
        token_hash: token_hash.to_string(),
        legacy_raw_token: None,
        token_expires_at: None,
        scope: aex_types::Scope::Execution,
        budget_micro: aex_types::Micro(budget_micro),
        spent_micro: aex_types::Micro(0),
        reserved_micro: aex_types::Micro(0),
        rpm_limit: 1_000,
        tpm_limit: 1_000_000,
        capabilities: aex_types::Capabilities::default(),
        created_at: 0,
        last_activity_at: None,
    }
}

#[derive(Default)]
struct State {
    agents: HashMap<String, Agent>,
    executions: HashMap<String, Execution>,
    reservations: HashMap<String, Reservation>,
    idempotency: HashMap<(String, String), String>,
    events: Vec<Event>,
}

pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }

    pub async fn insert_agent(&self, agent: Agent) {
        self.state.lock().unwrap().agents.insert(agent.agent_id.clone(), agent);
    }

    fn append_event(
        state: &mut State,
        execution_id: Option<&str>,
        agent_id: Option<&str>,
        event_type: EventType,
        payload: Value,
        now_ms: i64,
    ) -> Event {
        let (seq, prev_hash) = match state.events.last() {
            Some(e) => (e.seq + 1, e.event_hash),
            None => (0, aex_types::event::GENESIS_HASH),
        };
        let event_hash = aex_crypto::chain::event_hash(&prev_hash, &payload, event_type, seq).unwrap();
        let event = Event {
            seq,
            chain_scope: "global".to_string(),
            execution_id: execution_id.map(str::to_string),
            agent_id: agent_id.map(str::to_string),
            event_type,
            payload,
            prev_hash,
            event_hash,
            recorded_at: now_ms,
        };
        state.events.push(event.clone());
        event
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
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
        let mut state = self.state.lock().unwrap();

        if let Some(key) = idempotency_key {
            if let Some(existing_id) = state.idempotency.get(&(agent_id.to_string(), key.to_string())).cloned() {
                let existing = state.executions.get(&existing_id).cloned().ok_or(StoreError::NotFound)?;
                if existing.request_hash != request_hash {
                    return Err(StoreError::IdempotencyConflict { agent_id: agent_id.to_string() });
                }
                return Ok(if existing.state.is_terminal() {
                    ReserveOutcome::IdempotentHit(existing)
                } else {
                    ReserveOutcome::InFlightDuplicate(existing)
                });
            }
        } else if let Some(existing) = state.executions.get(execution_id).cloned() {
            return Ok(if existing.state.is_terminal() {
                ReserveOutcome::IdempotentHit(existing)
            } else {
                ReserveOutcome::InFlightDuplicate(existing)
            });
        }

        let mut agent = state.agents.get(agent_id).cloned().ok_or(StoreError::NotFound)?;
        let est = aex_types::Micro(est_cost_micro);
        let would_use = agent
            .spent_micro
            .checked_add(agent.reserved_micro)
            .and_then(|t| t.checked_add(est));

        let exec = match would_use {
            Some(total) if total <= agent.budget_micro => {
                agent.reserved_micro = agent.reserved_micro.checked_add(est).unwrap();
                state.agents.insert(agent_id.to_string(), agent);

                let execution = Execution {
                    execution_id: execution_id.to_string(),
                    agent_id: agent_id.to_string(),
                    idempotency_key: idempotency_key.map(str::to_string),
                    request_hash,
                    route,
                    model: model.to_string(),
                    provider: provider.to_string(),
                    state: ExecutionState::Reserved,
                    reserve_micro: est,
                    commit_micro: aex_types::Micro::ZERO,
                    release_micro: aex_types::Micro::ZERO,
                    response_cache: None,
                    status_code: None,
                    created_at: now_ms,
                    terminal_at: None,
                };
                state.executions.insert(execution_id.to_string(), execution.clone());
                state.reservations.insert(
                    execution_id.to_string(),
                    Reservation {
                        execution_id: execution_id.to_string(),
                        agent_id: agent_id.to_string(),
                        reserved_micro: est,
                        state: ExecutionState::Reserved,
                        expires_at: now_ms + ttl_ms,
                        version: 0,
                    },
                );
                if let Some(key) = idempotency_key {
                    state
                        .idempotency
                        .insert((agent_id.to_string(), key.to_string()), execution_id.to_string());
                }
                Self::append_event(
                    &mut state,
                    Some(execution_id),
                    Some(agent_id),
                    EventType::Reserve,
                    serde_json::json!({"execution_id": execution_id, "reserve_micro": est_cost_micro}),
                    now_ms,
                );
                ReserveOutcome::Reserved(execution)
            }
            _ => {
                let execution = Execution {
                    execution_id: execution_id.to_string(),
                    agent_id: agent_id.to_string(),
                    idempotency_key: idempotency_key.map(str::to_string),
                    request_hash,
                    route,
                    model: model.to_string(),
                    provider: provider.to_string(),
                    state: ExecutionState::Denied,
                    reserve_micro: aex_types::Micro::ZERO,
                    commit_micro: aex_types::Micro::ZERO,
                    release_micro: aex_types::Micro::ZERO,
                    response_cache: None,
                    status_code: Some(402),
                    created_at: now_ms,
                    terminal_at: Some(now_ms),
                };
                state.executions.insert(execution_id.to_string(), execution);
                Self::append_event(
                    &mut state,
                    Some(execution_id),
                    Some(agent_id),
                    EventType::DenyBudget,
                    serde_json::json!({"execution_id": execution_id}),
                    now_ms,
                );
                ReserveOutcome::AgentBudgetExceeded
            }
        };
        Ok(exec)
    }

    async fn mark_dispatched(&self, execution_id: &str, now_ms: i64) -> Result<Execution, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut exec = state.executions.get(execution_id).cloned().ok_or(StoreError::NotFound)?;
        exec.apply_transition(ExecutionState::Dispatched)
            .map_err(|_| StoreError::InvalidState { execution_id: execution_id.to_string(), from: "non-reserved" })?;
        state.executions.insert(execution_id.to_string(), exec.clone());
        Self::append_event(&mut state, Some(execution_id), Some(&exec.agent_id), EventType::Dispatch, serde_json::json!({}), now_ms);
        Ok(exec)
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
        let mut state = self.state.lock().unwrap();
        let mut exec = state.executions.get(execution_id).cloned().ok_or(StoreError::NotFound)?;
        exec.apply_transition(ExecutionState::Committed)
            .map_err(|_| StoreError::InvalidState { execution_id: execution_id.to_string(), from: "non-dispatched" })?;

        let requested = aex_types::Micro(actual_cost_micro);
        let overran = requested > exec.reserve_micro;
        let clamped = overran && clamp_overrun;
        let settled = if clamped { exec.reserve_micro } else { requested };

        let mut agent = state.agents.get(&exec.agent_id).cloned().ok_or(StoreError::NotFound)?;
        agent.reserved_micro = agent.reserved_micro.saturating_sub(exec.reserve_micro);
        agent.spent_micro = agent.spent_micro.checked_add(settled).ok_or_else(|| {
            StoreError::Backend("spent_micro overflow".to_string())
        })?;
        state.agents.insert(exec.agent_id.clone(), agent);

        exec.commit_micro = settled;
        exec.status_code = Some(status_code);
        exec.response_cache = Some(response_body);
        exec.terminal_at = Some(now_ms);
        state.executions.insert(execution_id.to_string(), exec.clone());
        state.reservations.remove(execution_id);

        Self::append_event(
            &mut state,
            Some(execution_id),
            Some(&exec.agent_id),
            EventType::Commit,
            serde_json::json!({
                "execution_id": execution_id,
                "actual_cost_micro": settled.0,
                "requested_cost_micro": requested.0,
                "clamped": clamped,
                "estimate": estimate,
            }),
            now_ms,
        );

        Ok(CommitResult { execution: exec, clamped, requested_cost_micro: requested.0 })
    }

    async fn release(&self, execution_id: &str, reason: &str, now_ms: i64) -> Result<Execution, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut exec = state.executions.get(execution_id).cloned().ok_or(StoreError::NotFound)?;
        exec.apply_transition(ExecutionState::Released)
            .map_err(|_| StoreError::InvalidState { execution_id: execution_id.to_string(), from: "terminal" })?;

        let mut agent = state.agents.get(&exec.agent_id).cloned().ok_or(StoreError::NotFound)?;
        agent.reserved_micro = agent.reserved_micro.saturating_sub(exec.reserve_micro);
        state.agents.insert(exec.agent_id.clone(), agent);

        exec.release_micro = exec.reserve_micro.saturating_sub(exec.commit_micro);
        exec.terminal_at = Some(now_ms);
        state.executions.insert(execution_id.to_string(), exec.clone());
        state.reservations.remove(execution_id);

        Self::append_event(
            &mut state,
            Some(execution_id),
            Some(&exec.agent_id),
            EventType::Release,
            serde_json::json!({"execution_id": execution_id, "reason": reason}),
            now_ms,
        );
        Ok(exec)
    }

    async fn fail(&self, execution_id: &str, status_code: u16, error_body: Value, now_ms: i64) -> Result<Execution, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut exec = state.executions.get(execution_id).cloned().ok_or(StoreError::NotFound)?;
        exec.apply_transition(ExecutionState::Failed)
            .map_err(|_| StoreError::InvalidState { execution_id: execution_id.to_string(), from: "terminal" })?;

        let mut agent = state.agents.get(&exec.agent_id).cloned().ok_or(StoreError::NotFound)?;
        agent.reserved_micro = agent.reserved_micro.saturating_sub(exec.reserve_micro);
        state.agents.insert(exec.agent_id.clone(), agent);

        exec.status_code = Some(status_code);
        exec.terminal_at = Some(now_ms);
        state.executions.insert(execution_id.to_string(), exec.clone());
        state.reservations.remove(execution_id);

        Self::append_event(
            &mut state,
            Some(execution_id),
            Some(&exec.agent_id),
            EventType::Fail,
            serde_json::json!({"execution_id": execution_id, "status_code": status_code, "error": error_body}),
            now_ms,
        );
        Ok(exec)
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
        let mut state = self.state.lock().unwrap();
        if state.executions.contains_key(execution_id) {
            return Ok(());
        }
        let exec = Execution {
            execution_id: execution_id.to_string(),
            agent_id: agent_id.to_string(),
            idempotency_key: idempotency_key.map(str::to_string),
            request_hash,
            route,
            model: model.to_string(),
            provider: provider.to_string(),
            state: ExecutionState::Denied,
            reserve_micro: aex_types::Micro::ZERO,
            commit_micro: aex_types::Micro::ZERO,
            release_micro: aex_types::Micro::ZERO,
            response_cache: None,
            status_code: None,
            created_at: now_ms,
            terminal_at: Some(now_ms),
        };
        state.executions.insert(execution_id.to_string(), exec);
        if let Some(key) = idempotency_key {
            state
                .idempotency
                .insert((agent_id.to_string(), key.to_string()), execution_id.to_string());
        }
        Self::append_event(
            &mut state,
            Some(execution_id),
            Some(agent_id),
            event_type,
            serde_json::json!({"execution_id": execution_id, "reason": reason}),
            now_ms,
        );
        Ok(())
    }

    async fn lookup(&self, execution_id: &str) -> Result<Option<Execution>, StoreError> {
        Ok(self.state.lock().unwrap().executions.get(execution_id).cloned())
    }

    async fn reservation(&self, execution_id: &str) -> Result<Option<Reservation>, StoreError> {
        Ok(self.state.lock().unwrap().reservations.get(execution_id).cloned())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self.state.lock().unwrap().agents.get(agent_id).cloned())
    }

    async fn find_agent_by_token_hash(&self, token_hash: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self.state.lock().unwrap().agents.values().find(|a| a.token_hash == token_hash).cloned())
    }

    async fn find_agent_by_raw_token(&self, raw_token: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .agents
            .values()
            .find(|a| a.legacy_raw_token.as_deref() == Some(raw_token))
            .cloned())
    }

    async fn non_terminal_executions(&self) -> Result<Vec<Execution>, StoreError> {
        Ok(self.state.lock().unwrap().executions.values().filter(|e| !e.state.is_terminal()).cloned().collect())
    }

    async fn expired_reservations(&self, now_ms: i64) -> Result<Vec<Execution>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .reservations
            .values()
            .filter(|r| r.expires_at < now_ms)
            .filter_map(|r| state.executions.get(&r.execution_id).cloned())
            .collect())
    }

    async fn check_and_record_rate(
        &self,
        _agent_id: &str,
        _rpm_limit: u32,
        _tpm_limit: u32,
        _est_tokens: u32,
        _now_ms: i64,
    ) -> Result<RateOutcome, StoreError> {
        Ok(RateOutcome::Admitted)
    }

    async fn rate_window(&self, _agent_id: &str) -> Result<RateWindow, StoreError> {
        Ok(RateWindow::default())
    }

    async fn create_agent(&self, agent: Agent) -> Result<(), StoreError> {
        self.state.lock().unwrap().agents.insert(agent.agent_id.clone(), agent);
        Ok(())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        Ok(self.state.lock().unwrap().agents.values().cloned().collect())
    }

    async fn events_in_scope(&self, scope: &str) -> Result<Vec<Event>, StoreError> {
        Ok(self.state.lock().unwrap().events.iter().filter(|e| e.chain_scope == scope).cloned().collect())
    }

    async fn events_for_execution(&self, execution_id: &str) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.execution_id.as_deref() == Some(execution_id))
            .cloned()
            .collect())
    }

    async fn events_for_agent(&self, agent_id: &str) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.agent_id.as_deref() == Some(agent_id))
            .cloned()
            .collect())
    }
}
