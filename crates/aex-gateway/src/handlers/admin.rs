// Path: crates/aex-gateway/src/handlers/admin.rs
//! The admin HTTP surface (§6): health/readiness probes, `/metrics`
//! (wired directly in `lib.rs`), activity/replay introspection, and the
//! operator kill-switches behind `x-aex-admin-key`.

use crate::error::{AppError, AppResult};
use crate::headers;
use crate::state::GatewayState;
use aex_core::{verify_global, ReplayReport};
use aex_types::ExecutionState;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

const ONE_DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn ready(State(state): State<GatewayState>) -> AppResult<Response> {
    match state.rt.store.list_agents().await {
        Ok(_) => Ok(Json(serde_json::json!({"status": "ready"})).into_response()),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            Ok((axum::http::StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"status": "not_ready"}))).into_response())
        }
    }
}

#[derive(Serialize)]
struct AgentActivity {
    agent_id: String,
    open_reservations: usize,
    spend_last_24h_micro: u64,
    budget_micro: u64,
    reserved_micro: u64,
}

pub async fn activity(State(state): State<GatewayState>) -> AppResult<Json<serde_json::Value>> {
    let now_ms = state.rt.now_ms();
    let agents = state.rt.store.list_agents().await?;
    let non_terminal = state.rt.store.non_terminal_executions().await?;

    let mut rows = Vec::with_capacity(agents.len());
    for agent in agents {
        let open_reservations = non_terminal.iter().filter(|e| e.agent_id == agent.agent_id).count();
        let events = state.rt.store.events_for_agent(&agent.agent_id).await?;
        let spend_last_24h_micro: u64 = events
            .iter()
            .filter(|e| e.event_type == aex_types::EventType::Commit && now_ms - e.recorded_at <= ONE_DAY_MS)
            .filter_map(|e| e.payload.get("actual_cost_micro").and_then(serde_json::Value::as_u64))
            .sum();
        rows.push(AgentActivity {
            agent_id: agent.agent_id,
            open_reservations,
            spend_last_24h_micro,
            budget_micro: agent.budget_micro.0,
            reserved_micro: agent.reserved_micro.0,
        });
    }

    Ok(Json(serde_json::json!({"agents": rows})))
}

pub async fn replay(State(state): State<GatewayState>) -> AppResult<Json<ReplayReport>> {
    let report = verify_global(&state.rt).await?;
    Ok(Json(report))
}

fn require_admin_key(state: &GatewayState, headers: &HeaderMap) -> AppResult<()> {
    let configured = state.rt.config.admin_control_key.as_deref();
    let provided = headers::admin_key(headers);
    match (configured, provided) {
        (Some(expected), Some(got)) if expected == got => Ok(()),
        (None, _) => Err(AppError::Unauthorized("admin control is disabled: no AEX_ADMIN_CONTROL_KEY configured".to_string())),
        _ => Err(AppError::Unauthorized("invalid or missing x-aex-admin-key".to_string())),
    }
}

pub async fn reload_config(State(state): State<GatewayState>, headers: HeaderMap) -> AppResult<Response> {
    require_admin_key(&state, &headers)?;
    state.reload_providers()?;
    Ok(Json(serde_json::json!({"reloaded": true})).into_response())
}

/// `pause_all`/`sandbox_all`/`kill_all`, per §6 and §11's admin surface.
/// `kill_all` additionally drains every non-terminal execution
/// immediately, ignoring TTL, then pauses the gateway.
pub async fn control(State(state): State<GatewayState>, headers: HeaderMap, Path(action): Path<String>) -> AppResult<Response> {
    require_admin_key(&state, &headers)?;

    match action.as_str() {
        "pause_all" => {
            state.gate.pause_all();
            Ok(Json(serde_json::json!({"paused": true})).into_response())
        }
        "sandbox_all" => {
            state.gate.sandbox_all();
            Ok(Json(serde_json::json!({"sandboxed": true})).into_response())
        }
        "kill_all" => {
            let now_ms = state.rt.now_ms();
            let non_terminal = state.rt.store.non_terminal_executions().await?;
            let mut drained = 0usize;
            for execution in non_terminal {
                let outcome = match execution.state {
                    ExecutionState::Reserving | ExecutionState::Dispatched => {
                        state.rt.store.fail(&execution.execution_id, 0, serde_json::json!({"error": "admin_kill_all"}), now_ms).await
                    }
                    _ => state.rt.store.release(&execution.execution_id, "admin_kill_all", now_ms).await,
                };
                if outcome.is_ok() {
                    drained += 1;
                }
            }
            state.gate.pause_all();
            Ok(Json(serde_json::json!({"paused": true, "drained": drained})).into_response())
        }
        other => Err(AppError::NotFound(format!("unknown admin control action '{other}'"))),
    }
}
