// Path: crates/aex-types/src/agent.rs
use crate::error::TypesError;
use crate::money::Micro;
use serde::{Deserialize, Serialize};

/// Scope granted to a bearer token: full execution, or read-only (admin
/// dashboards, status pollers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Execution,
    ReadOnly,
}

/// Capability flags gating what an agent is allowed to request, evaluated
/// by the policy engine's kernel rules before any plugin runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub allowed_models: Vec<String>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub allow_passthrough: bool,
}

impl Capabilities {
    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.iter().any(|m| m == model)
    }
}

/// Identity of a caller. `spent_micro` and `reserved_micro` are mutated
/// only by the store's transactional commit/release/reserve primitives;
/// every other field is set at creation or by an explicit auth action
/// (token rotation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub name: String,
    /// 64-hex SHA-256 digest of the bearer token.
    pub token_hash: String,
    /// Pre-migration plaintext token, kept only for agents provisioned
    /// before the token-hash index existed. `authenticate` falls back to
    /// an equality lookup against this field on a `token_hash` miss. New
    /// agents never set it; rotate the token to clear it.
    #[serde(default)]
    pub legacy_raw_token: Option<String>,
    pub token_expires_at: Option<i64>,
    pub scope: Scope,
    pub budget_micro: Micro,
    pub spent_micro: Micro,
    pub reserved_micro: Micro,
    pub rpm_limit: u32,
    pub tpm_limit: u32,
    pub capabilities: Capabilities,
    pub created_at: i64,
    pub last_activity_at: Option<i64>,
}

impl Agent {
    /// `spent_micro + reserved_micro <= budget_micro` must hold for every
    /// persisted agent row; checked on construction and after every
    /// in-memory mutation path that does not go through the store.
    pub fn check_invariant(&self) -> Result<(), TypesError> {
        let total = self
            .spent_micro
            .checked_add(self.reserved_micro)
            .ok_or(TypesError::InvariantViolated("spent+reserved overflow"))?;
        if total > self.budget_micro {
            return Err(TypesError::InvariantViolated(
                "spent_micro + reserved_micro exceeds budget_micro",
            ));
        }
        Ok(())
    }

    pub fn available_micro(&self) -> Micro {
        self.budget_micro
            .saturating_sub(self.spent_micro)
            .saturating_sub(self.reserved_micro)
    }
}
