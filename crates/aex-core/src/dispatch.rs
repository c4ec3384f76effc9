// Path: crates/aex-core/src/dispatch.rs
//! Dispatch & Settlement (C7): wraps the provider call (unary or SSE
//! relay), computes actual cost from `usage`, and drives the execution to
//! its terminal state. Grounded in
//! `ioi-api::vm::inference::http_adapter::HttpInferenceRuntime` for the
//! `reqwest` call shape; the settlement bookkeeping is this crate's own.

use crate::error::DispatchError;
use crate::runtime::Runtime;
use aex_types::ModelInfo;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Everything C7 needs that C6 already resolved.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub execution_id: String,
    pub agent_id: String,
    pub model: ModelInfo,
}

/// Token usage as reported by (or estimated for) the provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

fn actual_cost_micro(usage: Usage, model: &ModelInfo) -> u64 {
    usage
        .prompt_tokens
        .saturating_mul(model.input_micro.0)
        .saturating_add(usage.completion_tokens.saturating_mul(model.output_micro.0))
}

/// `usage.prompt_tokens`/`usage.completion_tokens` from an OpenAI-shaped
/// response or chunk; `None` if the object carries no `usage` field.
fn extract_usage(body: &Value) -> Option<Usage> {
    let usage = body.get("usage")?;
    Some(Usage {
        prompt_tokens: usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
        completion_tokens: usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
    })
}

/// §12 resolution #2: when no `usage` ever arrives, estimate completion
/// tokens from the accumulated visible text, four characters per token.
fn chars_over_4(text: &str) -> u64 {
    (text.chars().count() as u64 + 3) / 4
}

fn delta_content(chunk: &Value) -> Option<&str> {
    chunk
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

/// Performs one unary provider call and settles the execution.
///
/// `cancel` resolves when the client disconnects before the provider
/// responds (§5 "cancellation ... unary: cancellation before provider
/// response returns -> release").
pub async fn dispatch_unary(
    rt: &Runtime,
    ctx: &DispatchContext,
    upstream_url: &str,
    api_key: Option<&str>,
    body: &Value,
    cancel: oneshot::Receiver<()>,
) -> Result<Value, DispatchError> {
    rt.store.mark_dispatched(&ctx.execution_id, rt.now_ms()).await?;

    let mut request = rt.http.post(upstream_url).json(body).timeout(rt.config.provider_unary_timeout());
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    let send = request.send();
    tokio::pin!(send);
    tokio::pin!(cancel);

    let response = tokio::select! {
        result = &mut send => result,
        _ = &mut cancel => {
            rt.store.release(&ctx.execution_id, "client_cancel", rt.now_ms()).await?;
            return Err(DispatchError::ClientCancel);
        }
    };

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
            rt.store
                .fail(&ctx.execution_id, status, serde_json::json!({"error": e.to_string()}), rt.now_ms())
                .await?;
            return Err(DispatchError::Http(e));
        }
    };

    let status = response.status();
    if !status.is_success() {
        let status_code = status.as_u16();
        let error_body: Value = response
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({"error": "provider returned a non-JSON error body"}));
        rt.store.fail(&ctx.execution_id, status_code, error_body.clone(), rt.now_ms()).await?;
        return Err(DispatchError::ProviderError(error_body.to_string()));
    }

    let response_body: Value = match response.json().await {
        Ok(v) => v,
        Err(e) => {
            rt.store
                .fail(&ctx.execution_id, status.as_u16(), serde_json::json!({"error": e.to_string()}), rt.now_ms())
                .await?;
            return Err(DispatchError::Http(e));
        }
    };

    let usage = extract_usage(&response_body).unwrap_or_default();
    let actual = actual_cost_micro(usage, &ctx.model);

    rt.store
        .commit(&ctx.execution_id, actual, response_body.clone(), status.as_u16(), false, rt.config.clamp_overrun, rt.now_ms())
        .await?;

    Ok(response_body)
}

/// One relayed SSE frame (the raw `data: ...` payload, `[DONE]` excluded)
/// or a fatal upstream error.
pub type StreamFrame = Result<String, DispatchError>;

/// Opens an upstream SSE stream and relays frames on a channel while
/// accumulating `usage`. The background task keeps draining upstream
/// after the receiver is dropped (client disconnect), per §5: streaming
/// disconnects never cancel the upstream call, to keep accounting
/// truthful. Settlement happens inside the task, not the caller.
pub fn dispatch_stream(
    rt: std::sync::Arc<Runtime>,
    ctx: DispatchContext,
    upstream_url: String,
    api_key: Option<String>,
    body: Value,
) -> mpsc::Receiver<StreamFrame> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        if let Err(e) = run_stream(&rt, &ctx, &upstream_url, api_key.as_deref(), &body, &tx).await {
            let _ = tx.send(Err(e)).await;
        }
    });
    rx
}

async fn run_stream(
    rt: &Runtime,
    ctx: &DispatchContext,
    upstream_url: &str,
    api_key: Option<&str>,
    body: &Value,
    tx: &mpsc::Sender<StreamFrame>,
) -> Result<(), DispatchError> {
    use futures::StreamExt;

    rt.store.mark_dispatched(&ctx.execution_id, rt.now_ms()).await?;

    let mut request = rt.http.post(upstream_url).json(body);
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {key}"));
    }

    let response = match request.send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            let status = r.status().as_u16();
            let error_body: Value = r.json().await.unwrap_or_else(|_| serde_json::json!({"error": "upstream error"}));
            rt.store.fail(&ctx.execution_id, status, error_body.clone(), rt.now_ms()).await?;
            return Err(DispatchError::ProviderError(error_body.to_string()));
        }
        Err(e) => {
            rt.store
                .fail(&ctx.execution_id, 0, serde_json::json!({"error": e.to_string()}), rt.now_ms())
                .await?;
            return Err(DispatchError::Http(e));
        }
    };

    let mut byte_stream = response.bytes_stream();
    let mut buf = String::new();
    let mut usage: Option<Usage> = None;
    let mut seen_text = String::new();
    let inactivity = rt.config.stream_inactivity_timeout();

    loop {
        let next = tokio::time::timeout(inactivity, byte_stream.next()).await;
        let chunk = match next {
            Ok(Some(Ok(bytes))) => bytes,
            Ok(Some(Err(e))) => {
                rt.store
                    .fail(&ctx.execution_id, 0, serde_json::json!({"error": e.to_string()}), rt.now_ms())
                    .await?;
                return Err(DispatchError::Http(e));
            }
            Ok(None) => break,
            Err(_) => {
                // Inactivity timeout: settle with whatever usage we have.
                break;
            }
        };
        buf.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(idx) = buf.find("\n\n") {
            let event = buf[..idx].to_string();
            buf.drain(..idx + 2);

            for line in event.lines() {
                let Some(payload) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
                    continue;
                };
                let payload = payload.trim();
                if payload == "[DONE]" {
                    let _ = tx.send(Ok("[DONE]".to_string())).await;
                    return settle_stream(rt, ctx, usage, &seen_text, tx).await;
                }
                if let Ok(parsed) = serde_json::from_str::<Value>(payload) {
                    if let Some(u) = extract_usage(&parsed) {
                        usage = Some(u);
                    }
                    if let Some(text) = delta_content(&parsed) {
                        seen_text.push_str(text);
                    }
                }
                let _ = tx.send(Ok(payload.to_string())).await;
            }
        }
    }

    settle_stream(rt, ctx, usage, &seen_text, tx).await
}

/// Commits the stream's execution once relaying has ended, whether by
/// `[DONE]`, upstream close, or inactivity timeout (§4.7 streaming path).
async fn settle_stream(
    rt: &Runtime,
    ctx: &DispatchContext,
    usage: Option<Usage>,
    seen_text: &str,
    _tx: &mpsc::Sender<StreamFrame>,
) -> Result<(), DispatchError> {
    let (usage, estimate) = match usage {
        Some(u) => (u, false),
        None => (
            Usage {
                prompt_tokens: 0,
                completion_tokens: chars_over_4(seen_text),
            },
            true,
        ),
    };
    let actual = actual_cost_micro(usage, &ctx.model);
    let response_body = serde_json::json!({
        "execution_id": ctx.execution_id,
        "usage": {"prompt_tokens": usage.prompt_tokens, "completion_tokens": usage.completion_tokens},
    });
    rt.store
        .commit(&ctx.execution_id, actual, response_body, 200, estimate, rt.config.clamp_overrun, rt.now_ms())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aex_types::Micro;

    fn model() -> ModelInfo {
        ModelInfo {
            provider: "openai".to_string(),
            provider_model: "gpt-x".to_string(),
            input_micro: Micro(10),
            output_micro: Micro(20),
            max_tokens: 4096,
            supports_streaming: true,
            supports_tools: false,
            supports_vision: false,
        }
    }

    #[test]
    fn usage_extraction_reads_openai_shape() {
        let body = serde_json::json!({"usage": {"prompt_tokens": 10, "completion_tokens": 5}});
        let usage = extract_usage(&body).unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
    }

    #[test]
    fn missing_usage_falls_back_to_none() {
        let body = serde_json::json!({"choices": []});
        assert!(extract_usage(&body).is_none());
    }

    #[test]
    fn actual_cost_matches_micro_pricing() {
        let usage = Usage { prompt_tokens: 100, completion_tokens: 50 };
        assert_eq!(actual_cost_micro(usage, &model()), 100 * 10 + 50 * 20);
    }

    #[test]
    fn chars_over_4_rounds_up() {
        assert_eq!(chars_over_4("abcd"), 1);
        assert_eq!(chars_over_4("abcde"), 2);
        assert_eq!(chars_over_4(""), 0);
    }

    #[test]
    fn delta_content_reads_chat_completion_chunk_shape() {
        let chunk = serde_json::json!({"choices": [{"delta": {"content": "hi"}}]});
        assert_eq!(delta_content(&chunk), Some("hi"));
    }
}
