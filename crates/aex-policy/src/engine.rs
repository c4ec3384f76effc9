// Path: crates/aex-policy/src/engine.rs
//! The policy pipeline entry point (C4): kernel rules, then the
//! topologically ordered plugin chain, reduced deny-first (§4.4).

use crate::decision::{PluginTraceEntry, PolicyDecision, Verdict};
use crate::error::PolicyError;
use crate::kernel::{capability_gate, payload_shape_gate, token_count_gate};
use crate::merge::apply_patch;
use crate::plugin::{PluginRegistry, PolicyContext};
use aex_types::agent::Capabilities;
use aex_types::catalog::ModelInfo;
use aex_types::execution::Route;
use serde_json::Value;

/// Everything the policy engine needs to evaluate one request.
pub struct PolicyRequest<'a> {
    pub agent_id: &'a str,
    pub capabilities: &'a Capabilities,
    pub route: Route,
    pub model: &'a str,
    pub model_info: &'a ModelInfo,
    pub body: &'a Value,
    pub requested_max_tokens: u32,
    pub streaming_requested: bool,
}

#[derive(Clone, Default)]
pub struct PolicyEngine {
    plugins: PluginRegistry,
}

impl PolicyEngine {
    pub fn new(plugins: PluginRegistry) -> Self {
        Self { plugins }
    }

    /// Runs the kernel rules, then each plugin in declared order, folding
    /// patches and reducing deny-first. A kernel denial short-circuits
    /// before any plugin runs (the plugin trace is empty in that case).
    pub async fn evaluate(&self, req: &PolicyRequest<'_>) -> Result<PolicyDecision, PolicyError> {
        if let Err(reason) = capability_gate(req.capabilities, req.route, req.model, req.model_info, req.streaming_requested, req.body) {
            tracing::info!(agent_id = req.agent_id, reason = %reason, "kernel capability gate denied request");
            return PolicyDecision::deny(reason, Vec::new());
        }
        if let Err(reason) = token_count_gate(req.requested_max_tokens, req.model_info) {
            tracing::info!(agent_id = req.agent_id, reason = %reason, "kernel token-count gate denied request");
            return PolicyDecision::deny(reason, Vec::new());
        }
        if let Err(reason) = payload_shape_gate(req.route, req.body) {
            tracing::info!(agent_id = req.agent_id, reason = %reason, "kernel payload-shape gate denied request");
            return PolicyDecision::deny(reason, Vec::new());
        }

        let ctx = PolicyContext {
            agent_id: req.agent_id,
            route: req.route,
            model: req.model,
            body: req.body,
        };

        let mut patch = Value::Object(Default::default());
        let mut obligations = Vec::new();
        let mut trace = Vec::with_capacity(self.plugins.len());

        for plugin in self.plugins.plugins() {
            let outcome = plugin.evaluate(&ctx).await;
            trace.push(PluginTraceEntry {
                plugin: plugin.name().to_string(),
                verdict: outcome.verdict.clone(),
            });

            match &outcome.verdict {
                Verdict::Deny { reason } => {
                    tracing::info!(agent_id = req.agent_id, plugin = plugin.name(), reason = %reason, "plugin denied request");
                    return PolicyDecision::deny(reason.clone(), trace);
                }
                Verdict::Modify { patch: plugin_patch } => {
                    apply_patch(&mut patch, plugin_patch);
                    obligations.extend(outcome.obligations);
                }
                Verdict::Allow => {
                    obligations.extend(outcome.obligations);
                }
            }
        }

        PolicyDecision::allow(patch, obligations, trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginOutcome, PolicyPlugin};
    use aex_types::money::Micro;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct TemperatureCapper;

    #[async_trait]
    impl PolicyPlugin for TemperatureCapper {
        fn name(&self) -> &str {
            "temperature_capper"
        }
        async fn evaluate(&self, _ctx: &PolicyContext<'_>) -> PluginOutcome {
            PluginOutcome::modify(json!({"temperature": 0.5}))
        }
    }

    struct ToolDenier;

    #[async_trait]
    impl PolicyPlugin for ToolDenier {
        fn name(&self) -> &str {
            "tool_denier"
        }
        fn depends_on(&self) -> &[&str] {
            &["temperature_capper"]
        }
        async fn evaluate(&self, ctx: &PolicyContext<'_>) -> PluginOutcome {
            if ctx.route == Route::Tools {
                PluginOutcome::deny("tools are disabled for this deployment")
            } else {
                PluginOutcome::allow()
            }
        }
    }

    fn model_info() -> ModelInfo {
        ModelInfo {
            provider: "openai".into(),
            provider_model: "gpt-x".into(),
            input_micro: Micro(10),
            output_micro: Micro(20),
            max_tokens: 4096,
            supports_streaming: true,
            supports_tools: true,
            supports_vision: false,
        }
    }

    #[tokio::test]
    async fn allow_path_merges_patch_and_hashes_deterministically() {
        let registry = PluginRegistry::new(vec![
            Arc::new(TemperatureCapper) as Arc<dyn PolicyPlugin>,
            Arc::new(ToolDenier) as Arc<dyn PolicyPlugin>,
        ])
        .unwrap();
        let engine = PolicyEngine::new(registry);
        let caps = Capabilities { allowed_models: vec![], ..Default::default() };
        let body = json!({"messages": [{"role": "user", "content": "hi"}]});
        let req = PolicyRequest {
            agent_id: "agent-1",
            capabilities: &caps,
            route: Route::Chat,
            model: "gpt-x",
            model_info: &model_info(),
            body: &body,
            requested_max_tokens: 100,
            streaming_requested: false,
        };
        let decision = engine.evaluate(&req).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.patch["temperature"], json!(0.5));
        assert_eq!(decision.plugin_trace.len(), 2);

        let decision2 = engine.evaluate(&req).await.unwrap();
        assert_eq!(decision.decision_hash, decision2.decision_hash);
    }

    #[tokio::test]
    async fn plugin_deny_short_circuits_remaining_plugins() {
        let registry = PluginRegistry::new(vec![
            Arc::new(TemperatureCapper) as Arc<dyn PolicyPlugin>,
            Arc::new(ToolDenier) as Arc<dyn PolicyPlugin>,
        ])
        .unwrap();
        let engine = PolicyEngine::new(registry);
        let caps = Capabilities { allowed_models: vec![], tools: true, ..Default::default() };
        let body = json!({"tool": "search"});
        let req = PolicyRequest {
            agent_id: "agent-1",
            capabilities: &caps,
            route: Route::Tools,
            model: "gpt-x",
            model_info: &model_info(),
            body: &body,
            requested_max_tokens: 100,
            streaming_requested: false,
        };
        let decision = engine.evaluate(&req).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.deny_reason.unwrap(), "tools are disabled for this deployment");
    }

    #[tokio::test]
    async fn kernel_capability_gate_denies_before_any_plugin_runs() {
        let registry = PluginRegistry::new(vec![Arc::new(TemperatureCapper) as Arc<dyn PolicyPlugin>]).unwrap();
        let engine = PolicyEngine::new(registry);
        let caps = Capabilities { allowed_models: vec!["other-model".into()], ..Default::default() };
        let body = json!({"messages": [{"role": "user", "content": "hi"}]});
        let req = PolicyRequest {
            agent_id: "agent-1",
            capabilities: &caps,
            route: Route::Chat,
            model: "gpt-x",
            model_info: &model_info(),
            body: &body,
            requested_max_tokens: 100,
            streaming_requested: false,
        };
        let decision = engine.evaluate(&req).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.plugin_trace.is_empty());
    }
}
