// Path: crates/aex-policy/src/decision.rs
//! Decision artifact produced by the policy pipeline (§4.4, §9 "dynamic
//! typing -> tagged variants").

use crate::error::PolicyError;
use aex_crypto::sha256;
use aex_types::codec::canonical_bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single plugin's verdict on a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny { reason: String },
    Modify { patch: Value },
}

/// One row of `plugin_trace`, recorded for every plugin that ran
/// regardless of verdict, so the decision hash captures the full pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginTraceEntry {
    pub plugin: String,
    pub verdict: Verdict,
}

/// The pipeline's final output: an admit/deny call, the merged patch, any
/// obligations the caller/dispatcher must honor, and an auditable hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub deny_reason: Option<String>,
    pub patch: Value,
    pub obligations: Vec<String>,
    pub plugin_trace: Vec<PluginTraceEntry>,
    pub decision_hash: [u8; 32],
}

/// The fields that are actually hashed; `decision_hash` itself is excluded
/// (hashing its own output would be circular).
#[derive(Serialize)]
struct HashedFields<'a> {
    allowed: bool,
    deny_reason: &'a Option<String>,
    patch: &'a Value,
    obligations: &'a [String],
    plugin_trace: &'a [PluginTraceEntry],
}

impl PolicyDecision {
    pub fn allow(patch: Value, obligations: Vec<String>, plugin_trace: Vec<PluginTraceEntry>) -> Result<Self, PolicyError> {
        Self::finish(true, None, patch, obligations, plugin_trace)
    }

    pub fn deny(reason: String, plugin_trace: Vec<PluginTraceEntry>) -> Result<Self, PolicyError> {
        Self::finish(false, Some(reason), Value::Object(Default::default()), Vec::new(), plugin_trace)
    }

    fn finish(
        allowed: bool,
        deny_reason: Option<String>,
        patch: Value,
        obligations: Vec<String>,
        plugin_trace: Vec<PluginTraceEntry>,
    ) -> Result<Self, PolicyError> {
        let hashed = HashedFields {
            allowed,
            deny_reason: &deny_reason,
            patch: &patch,
            obligations: &obligations,
            plugin_trace: &plugin_trace,
        };
        let decision_hash = sha256(canonical_bytes(&hashed)?);
        Ok(Self {
            allowed,
            deny_reason,
            patch,
            obligations,
            plugin_trace,
            decision_hash,
        })
    }
}
