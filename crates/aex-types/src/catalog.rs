// Path: crates/aex-types/src/catalog.rs
use crate::money::Micro;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pricing and capability facts for one upstream model, loaded from the
/// operator's model YAML (hot-reloaded externally; the core only ever
/// sees a read-only snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub provider_model: String,
    pub input_micro: Micro,
    pub output_micro: Micro,
    pub max_tokens: u32,
    #[serde(default)]
    pub supports_streaming: bool,
    #[serde(default)]
    pub supports_tools: bool,
    #[serde(default)]
    pub supports_vision: bool,
}

/// Read-only snapshot of every model AEX knows how to route to, keyed by
/// the caller-facing model name. Swapped out wholesale on hot-reload by
/// the (out-of-scope) config loader; the core never mutates it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCatalog {
    models: HashMap<String, ModelInfo>,
}

impl ModelCatalog {
    pub fn new(models: HashMap<String, ModelInfo>) -> Self {
        Self { models }
    }

    pub fn get(&self, model: &str) -> Option<&ModelInfo> {
        self.models.get(model)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
