// Path: crates/aex-core/src/admission.rs
//! Admission Controller (C6): the single entry point that orchestrates
//! auth, fingerprinting, rate limiting, policy, and reservation in one
//! pass (§4.6).

use crate::auth::{authenticate, AuthPrincipal};
use crate::error::AdmissionError;
use crate::ratelimit::check_rate;
use crate::runtime::Runtime;
use aex_crypto::fingerprint::{execution_id, request_hash};
use aex_store::ReserveOutcome;
use aex_types::execution::Route;
use aex_types::{EventType, Execution, ModelInfo};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// Process-local per-execution mutexes (§5 "process-local per-execution
/// mutex avoids redundant DB work ... but is never the source of truth").
/// Keyed by `execution_id`; the `Store`'s own `UNIQUE(execution_id)`
/// constraint remains authoritative.
static INFLIGHT_LOCKS: Lazy<DashMap<String, Arc<AsyncMutex<()>>>> = Lazy::new(DashMap::new);

fn inflight_lock(execution_id: &str) -> Arc<AsyncMutex<()>> {
    INFLIGHT_LOCKS
        .entry(execution_id.to_string())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Everything the caller's HTTP layer must supply to attempt admission.
pub struct AdmissionRequest<'a> {
    pub raw_token: &'a str,
    pub idempotency_key: Option<&'a str>,
    pub route: Route,
    pub model: &'a str,
    pub body: &'a Value,
    pub requested_max_tokens: u32,
    pub streaming_requested: bool,
    pub estimated_input_tokens: u32,
}

/// What C7 needs to actually perform the call.
#[derive(Debug, Clone)]
pub struct AdmissionDecision {
    pub execution_id: String,
    pub agent_id: String,
    pub provider: String,
    pub routed_body: Value,
    pub reserve_micro: u64,
    pub model_info: ModelInfo,
    /// Whether this agent may supply its own upstream provider credential
    /// via `x-aex-provider-key` (§6, requires `capabilities.allow_passthrough`).
    pub allow_passthrough: bool,
}

/// `admit`'s possible non-error outcomes. Errors carrying an HTTP mapping
/// and ledger-event kind are modeled as `AdmissionError` instead (§9
/// "dynamic typing -> tagged variants": `AdmitResult` here, folded into
/// `Result` since every non-`Admitted` branch already has a fixed HTTP
/// status in `AdmissionError`).
#[derive(Debug)]
pub enum AdmitOutcome {
    Admitted(AdmissionDecision),
    /// A prior call with the same execution identity already reached a
    /// terminal state; replay its cached response verbatim.
    IdempotentHit(Execution),
}

/// Applies a policy patch (temperature, max_tokens, system_prepend) over
/// the caller's original body, producing the body C7 actually forwards.
fn apply_routed_body(body: &Value, patch: &Value) -> Value {
    let mut routed = body.clone();
    if let (Some(routed_obj), Some(patch_obj)) = (routed.as_object_mut(), patch.as_object()) {
        for (k, v) in patch_obj {
            routed_obj.insert(k.clone(), v.clone());
        }
    }
    routed
}

/// Single entry point for admission (§4.6, steps 1-8).
pub async fn admit(rt: &Runtime, req: AdmissionRequest<'_>) -> Result<AdmitOutcome, AdmissionError> {
    let principal: AuthPrincipal = authenticate(rt, req.raw_token).await?;

    let model_info = rt
        .catalog
        .get(req.model)
        .cloned()
        .ok_or_else(|| AdmissionError::PolicyDenied(format!("unknown model '{}'", req.model)))?;

    let allow_passthrough = principal.capabilities.allow_passthrough;

    let rhash = request_hash(&principal.agent_id, req.route, req.model, req.body)?;
    let exec_id = execution_id(&principal.agent_id, req.idempotency_key, rhash);

    let lock = inflight_lock(&exec_id);
    let _guard = tokio::time::timeout(rt.config.inflight_mutex_wait(), lock.lock())
        .await
        .map_err(|_| AdmissionError::MutexTimeout)?;

    // §4.6 step 3: pre-check before doing any rate/policy/reserve work.
    if let Some(existing) = rt.store.lookup(&exec_id).await? {
        if existing.state.is_terminal() {
            return Ok(AdmitOutcome::IdempotentHit(existing));
        }
        return Err(AdmissionError::InFlightDuplicate);
    }

    if let Err(e) = check_rate(
        rt,
        &principal.agent_id,
        principal.rpm_limit,
        principal.tpm_limit,
        req.estimated_input_tokens,
    )
    .await
    {
        if let AdmissionError::RateExceeded(dimension) = &e {
            rt.store
                .deny(
                    &principal.agent_id,
                    &exec_id,
                    req.idempotency_key,
                    rhash,
                    req.route,
                    req.model,
                    &model_info.provider,
                    EventType::DenyRate,
                    dimension,
                    rt.now_ms(),
                )
                .await?;
        }
        return Err(e);
    }

    let decision = rt
        .policy
        .evaluate(&aex_policy::PolicyRequest {
            agent_id: &principal.agent_id,
            capabilities: &principal.capabilities,
            route: req.route,
            model: req.model,
            model_info: &model_info,
            body: req.body,
            requested_max_tokens: req.requested_max_tokens,
            streaming_requested: req.streaming_requested,
        })
        .await?;

    if !decision.allowed {
        let reason = decision.deny_reason.clone().unwrap_or_default();
        rt.store
            .deny(
                &principal.agent_id,
                &exec_id,
                req.idempotency_key,
                rhash,
                req.route,
                req.model,
                &model_info.provider,
                EventType::DenyPolicy,
                &reason,
                rt.now_ms(),
            )
            .await?;
        return Err(AdmissionError::PolicyDenied(reason));
    }

    let routed_body = apply_routed_body(req.body, &decision.patch);

    let est_cost_micro = (req.estimated_input_tokens as u64)
        .saturating_mul(model_info.input_micro.0)
        .saturating_add((req.requested_max_tokens as u64).saturating_mul(model_info.output_micro.0));

    let ttl_ms = rt
        .route_overrides
        .reserve_ttl_ms
        .get(route_key(req.route))
        .copied()
        .unwrap_or(rt.config.reserve_ttl_ms);

    match rt
        .store
        .reserve(
            &principal.agent_id,
            &exec_id,
            req.idempotency_key,
            rhash,
            req.route,
            req.model,
            &model_info.provider,
            est_cost_micro,
            ttl_ms,
            rt.now_ms(),
        )
        .await?
    {
        ReserveOutcome::Reserved(execution) => Ok(AdmitOutcome::Admitted(AdmissionDecision {
            execution_id: execution.execution_id,
            agent_id: principal.agent_id,
            provider: model_info.provider.clone(),
            routed_body,
            reserve_micro: est_cost_micro,
            model_info,
            allow_passthrough,
        })),
        ReserveOutcome::AgentBudgetExceeded => Err(AdmissionError::BudgetExhausted),
        ReserveOutcome::IdempotentHit(execution) => Ok(AdmitOutcome::IdempotentHit(execution)),
        ReserveOutcome::InFlightDuplicate(_) => Err(AdmissionError::InFlightDuplicate),
    }
}

fn route_key(route: Route) -> &'static str {
    match route {
        Route::Chat => "chat",
        Route::Embeddings => "embeddings",
        Route::Responses => "responses",
        Route::Tools => "tools",
    }
}
