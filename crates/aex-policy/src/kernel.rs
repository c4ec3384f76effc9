// Path: crates/aex-policy/src/kernel.rs
//! Kernel rules (§4.4): always-on checks that run before any plugin and
//! can never be overridden by one. A kernel denial short-circuits the
//! pipeline with no plugin invoked.

use aex_types::agent::Capabilities;
use aex_types::catalog::ModelInfo;
use aex_types::execution::Route;
use serde_json::Value;

/// Gate on `allowed_models`, `streaming`, `tools`, `vision`, `strict`.
#[allow(clippy::too_many_arguments)]
pub fn capability_gate(
    caps: &Capabilities,
    route: Route,
    model: &str,
    model_info: &ModelInfo,
    streaming_requested: bool,
    body: &Value,
) -> Result<(), String> {
    if !caps.allows_model(model) {
        return Err(format!("model '{model}' not in agent's allowed_models"));
    }
    if streaming_requested && !caps.streaming {
        return Err("agent capability 'streaming' is not granted".to_string());
    }
    if route == Route::Tools && !caps.tools {
        return Err("agent capability 'tools' is not granted".to_string());
    }
    if body_requests_vision(body) {
        if !caps.vision {
            return Err("agent capability 'vision' is not granted".to_string());
        }
        if !model_info.supports_vision {
            return Err(format!("model '{model}' does not support vision input"));
        }
    }
    if body_requests_strict(body) && !caps.strict {
        return Err("agent capability 'strict' is not granted".to_string());
    }
    Ok(())
}

/// Whether any chat message carries an `image_url` (or `image`) content
/// part, the OpenAI-shaped way of asking for vision input.
fn body_requests_vision(body: &Value) -> bool {
    let Some(messages) = body.get("messages").and_then(Value::as_array) else {
        return false;
    };
    messages.iter().any(|m| {
        m.get("content")
            .and_then(Value::as_array)
            .map(|parts| {
                parts.iter().any(|p| matches!(p.get("type").and_then(Value::as_str), Some("image_url") | Some("image")))
            })
            .unwrap_or(false)
    })
}

/// Whether the caller asked for strict schema/tool-call adherence:
/// `response_format.strict` or any `tools[].function.strict` set `true`.
fn body_requests_strict(body: &Value) -> bool {
    if body.get("response_format").and_then(|f| f.get("strict")).and_then(Value::as_bool).unwrap_or(false) {
        return true;
    }
    body.get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .any(|t| t.get("function").and_then(|f| f.get("strict")).and_then(Value::as_bool).unwrap_or(false))
        })
        .unwrap_or(false)
}

/// `token-count vs. max_tokens`: reject requests whose declared
/// `max_tokens` exceeds what the routed model supports.
pub fn token_count_gate(requested_max_tokens: u32, model: &ModelInfo) -> Result<(), String> {
    if requested_max_tokens > model.max_tokens {
        return Err(format!(
            "requested max_tokens {requested_max_tokens} exceeds model ceiling {}",
            model.max_tokens
        ));
    }
    Ok(())
}

/// Payload-shape validation: the minimal structural checks every route
/// body must satisfy before it reaches a plugin or the provider.
pub fn payload_shape_gate(route: Route, body: &Value) -> Result<(), String> {
    let obj = body
        .as_object()
        .ok_or_else(|| "request body must be a JSON object".to_string())?;

    match route {
        Route::Chat | Route::Responses => {
            let messages = obj
                .get("messages")
                .ok_or_else(|| "missing required field 'messages'".to_string())?;
            let arr = messages
                .as_array()
                .ok_or_else(|| "'messages' must be an array".to_string())?;
            if arr.is_empty() {
                return Err("'messages' must not be empty".to_string());
            }
        }
        Route::Embeddings => {
            if !obj.contains_key("input") {
                return Err("missing required field 'input'".to_string());
            }
        }
        Route::Tools => {
            if !obj.contains_key("tool") {
                return Err("missing required field 'tool'".to_string());
            }
        }
    }
    Ok(())
}
