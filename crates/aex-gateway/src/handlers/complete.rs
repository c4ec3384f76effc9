// Path: crates/aex-gateway/src/handlers/complete.rs
//! The four northbound OpenAI-compatible routes (§6). All four share one
//! admission -> dispatch pipeline; only the `Route`, upstream path suffix,
//! and whether streaming is legal for the route differ.

use crate::error::{AppError, AppResult};
use crate::headers::{self, insert_execution_headers};
use crate::sse::stream_response;
use crate::state::GatewayState;
use aex_core::{admit, dispatch_stream, dispatch_unary, AdmissionRequest, AdmitOutcome, DispatchContext};
use aex_telemetry::sinks::global as metrics;
use aex_types::execution::Route;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use serde_json::Value;
use std::time::Instant;
use tokio::sync::oneshot;

/// Four characters per token, the same coarse heuristic `aex-core` uses
/// for missing streaming `usage` (§12 resolution #2), applied here to
/// estimate the *request* size before a provider round trip happens.
fn estimate_input_tokens(body: &Value) -> u32 {
    let len = serde_json::to_string(body).map(|s| s.chars().count()).unwrap_or(0);
    ((len as u64 + 3) / 4).min(u32::MAX as u64) as u32
}

fn requested_max_tokens(body: &Value, ceiling: u32) -> u32 {
    body.get("max_tokens").and_then(Value::as_u64).map(|v| v.min(ceiling as u64) as u32).unwrap_or(ceiling)
}

fn streaming_requested(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool).unwrap_or(false)
}

async fn handle(
    state: GatewayState,
    headers: HeaderMap,
    route: Route,
    upstream_path: &str,
    streaming_allowed: bool,
    body: Value,
) -> AppResult<Response> {
    let started = Instant::now();
    let route_label = upstream_path;

    if state.gate.is_paused() {
        return Err(AppError::from(anyhow::anyhow!("gateway paused by operator")));
    }

    let model = body
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::BadRequest("missing 'model' field".to_string()))?
        .to_string();

    let raw_token = headers::bearer_token(&headers).to_string();
    let idempotency_key = headers::idempotency_key(&headers).map(str::to_string);
    let caller_provider_key = headers::provider_key(&headers).map(str::to_string);

    let est_input_tokens = estimate_input_tokens(&body);
    let wants_stream = streaming_allowed && streaming_requested(&body);

    let req = AdmissionRequest {
        raw_token: &raw_token,
        idempotency_key: idempotency_key.as_deref(),
        route,
        model: &model,
        body: &body,
        requested_max_tokens: requested_max_tokens(&body, 4096),
        streaming_requested: wants_stream,
        estimated_input_tokens: est_input_tokens,
    };

    let outcome = admit(&state.rt, req).await?;

    let decision = match outcome {
        AdmitOutcome::IdempotentHit(execution) => {
            let mut resp_headers = HeaderMap::new();
            insert_execution_headers(
                &mut resp_headers,
                &execution.execution_id,
                execution.reserve_micro.0,
                Some(execution.commit_micro.0),
                true,
            );
            metrics().inc_requests_total(route_label, execution.status_code.unwrap_or(200));
            metrics().observe_request_duration(route_label, started.elapsed().as_secs_f64());
            let body = execution.response_cache.clone().unwrap_or(Value::Null);
            return Ok((resp_headers, Json(body)).into_response());
        }
        AdmitOutcome::Admitted(decision) => decision,
    };

    if state.gate.is_sandboxed() {
        state.rt.store.release(&decision.execution_id, "sandbox_mode", state.rt.now_ms()).await.map_err(AppError::from)?;
        let mut resp_headers = HeaderMap::new();
        insert_execution_headers(&mut resp_headers, &decision.execution_id, decision.reserve_micro, None, false);
        metrics().inc_requests_total(route_label, 200);
        return Ok((resp_headers, Json(serde_json::json!({"sandboxed": true, "execution_id": decision.execution_id}))).into_response());
    }

    let providers = state.providers.read().expect("providers lock poisoned").clone();
    let upstream_url = providers
        .resolve(&decision.provider, upstream_path)
        .ok_or_else(|| AppError::from(anyhow::anyhow!("no upstream endpoint configured for provider '{}'", decision.provider)))?;

    if caller_provider_key.is_some() && !decision.allow_passthrough {
        state.rt.store.release(&decision.execution_id, "passthrough_denied", state.rt.now_ms()).await.map_err(AppError::from)?;
        return Err(AppError::Forbidden("agent capability 'allow_passthrough' is not granted".to_string()));
    }
    let api_key = match caller_provider_key {
        Some(key) if decision.allow_passthrough => Some(key),
        _ => providers.api_key(&decision.provider),
    };

    let ctx = DispatchContext { execution_id: decision.execution_id.clone(), agent_id: decision.agent_id.clone(), model: decision.model_info.clone() };

    if wants_stream && decision.model_info.supports_streaming {
        metrics().inc_streaming_sessions();
        let rx = dispatch_stream(state.rt.clone(), ctx, upstream_url, api_key, decision.routed_body.clone());
        let mut resp_headers = HeaderMap::new();
        insert_execution_headers(&mut resp_headers, &decision.execution_id, decision.reserve_micro, None, false);
        return Ok((resp_headers, stream_response(rx)).into_response());
    }

    let (_cancel_tx, cancel_rx) = oneshot::channel();
    let result = dispatch_unary(&state.rt, &ctx, &upstream_url, api_key.as_deref(), &decision.routed_body, cancel_rx).await;

    match result {
        Ok(response_body) => {
            let execution = state.rt.store.lookup(&decision.execution_id).await.map_err(AppError::from)?;
            let commit_micro = execution.as_ref().map(|e| e.commit_micro.0).unwrap_or(0);
            let mut resp_headers = HeaderMap::new();
            insert_execution_headers(&mut resp_headers, &decision.execution_id, decision.reserve_micro, Some(commit_micro), false);
            metrics().inc_requests_total(route_label, 200);
            metrics().inc_committed_micro(commit_micro);
            metrics().observe_request_duration(route_label, started.elapsed().as_secs_f64());
            Ok((resp_headers, Json(response_body)).into_response())
        }
        Err(e) => {
            metrics().inc_requests_total(route_label, 0);
            Err(AppError::from(e))
        }
    }
}

pub async fn chat_completions(State(state): State<GatewayState>, headers: HeaderMap, Json(body): Json<Value>) -> AppResult<Response> {
    handle(state, headers, Route::Chat, "/v1/chat/completions", true, body).await
}

pub async fn responses(State(state): State<GatewayState>, headers: HeaderMap, Json(body): Json<Value>) -> AppResult<Response> {
    handle(state, headers, Route::Responses, "/v1/responses", true, body).await
}

pub async fn embeddings(State(state): State<GatewayState>, headers: HeaderMap, Json(body): Json<Value>) -> AppResult<Response> {
    handle(state, headers, Route::Embeddings, "/v1/embeddings", false, body).await
}

pub async fn tools_execute(State(state): State<GatewayState>, headers: HeaderMap, Json(body): Json<Value>) -> AppResult<Response> {
    handle(state, headers, Route::Tools, "/v1/tools/execute", false, body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_scales_with_body_size() {
        let small = serde_json::json!({"model": "x"});
        let large = serde_json::json!({"model": "x", "messages": [{"role": "user", "content": "a".repeat(400)}]});
        assert!(estimate_input_tokens(&large) > estimate_input_tokens(&small));
    }

    #[test]
    fn requested_max_tokens_clamps_to_ceiling() {
        let body = serde_json::json!({"max_tokens": 99999});
        assert_eq!(requested_max_tokens(&body, 4096), 4096);
    }

    #[test]
    fn missing_max_tokens_defaults_to_ceiling() {
        let body = serde_json::json!({});
        assert_eq!(requested_max_tokens(&body, 2048), 2048);
    }
}
