// Path: crates/aex-types/src/execution.rs
use crate::error::TypesError;
use crate::money::Micro;
use serde::{Deserialize, Serialize};

/// The OpenAI-compatible route an execution targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Chat,
    Embeddings,
    Responses,
    Tools,
}

/// One admission attempt's lifecycle state. Transitions are monotone along
/// `Reserving -> Reserved -> Dispatched -> {Committed|Failed}`, with side
/// branches `Reserving -> Denied` and `{Reserving,Reserved,Dispatched} ->
/// Released`. See `ExecutionState::can_transition_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Reserving,
    Reserved,
    Dispatched,
    Committed,
    Released,
    Denied,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Committed
                | ExecutionState::Released
                | ExecutionState::Denied
                | ExecutionState::Failed
        )
    }

    /// Whether `self -> to` is a legal edge in the §4.7 state machine.
    pub fn can_transition_to(self, to: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, to),
            (Reserving, Reserved)
                | (Reserving, Denied)
                | (Reserving, Failed)
                | (Reserved, Dispatched)
                | (Reserved, Released)
                | (Reserved, Failed)
                | (Dispatched, Committed)
                | (Dispatched, Released)
                | (Dispatched, Failed)
        )
    }
}

/// One admission attempt, from reserve through a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub agent_id: String,
    pub idempotency_key: Option<String>,
    /// 32-byte SHA-256 of the canonicalized, volatile-stripped request.
    pub request_hash: [u8; 32],
    pub route: Route,
    pub model: String,
    pub provider: String,
    pub state: ExecutionState,
    pub reserve_micro: Micro,
    pub commit_micro: Micro,
    pub release_micro: Micro,
    /// Cached terminal response body, served verbatim on idempotent replay.
    pub response_cache: Option<serde_json::Value>,
    pub status_code: Option<u16>,
    pub created_at: i64,
    pub terminal_at: Option<i64>,
}

impl Execution {
    pub fn apply_transition(&mut self, to: ExecutionState) -> Result<(), TypesError> {
        if !self.state.can_transition_to(to) {
            return Err(TypesError::InvalidTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", to),
            });
        }
        self.state = to;
        Ok(())
    }

    /// `commit_micro <= reserve_micro` and `release_micro <= reserve_micro
    /// - commit_micro` must hold for every persisted row.
    pub fn check_invariant(&self) -> Result<(), TypesError> {
        if self.commit_micro > self.reserve_micro {
            return Err(TypesError::InvariantViolated(
                "commit_micro exceeds reserve_micro",
            ));
        }
        let remaining = self.reserve_micro.saturating_sub(self.commit_micro);
        if self.release_micro > remaining {
            return Err(TypesError::InvariantViolated(
                "release_micro exceeds reserve_micro - commit_micro",
            ));
        }
        Ok(())
    }
}

/// Fast lookup row for a live reservation ticket; mirrors a subset of
/// `Execution` plus the fields needed for TTL expiry and optimistic CAS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub execution_id: String,
    pub agent_id: String,
    pub reserved_micro: Micro,
    pub state: ExecutionState,
    pub expires_at: i64,
    pub version: u64,
}
