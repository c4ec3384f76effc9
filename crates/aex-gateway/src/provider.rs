// Path: crates/aex-gateway/src/provider.rs
//! Resolves a `ModelInfo.provider` name to the upstream base URL and the
//! environment variable holding its API key. This is transport plumbing,
//! not governance, so it lives here rather than in `aex-core`: C6/C7 only
//! ever see an already-resolved URL and an optional key.
//!
//! Loaded from `AEX_CONFIG_DIR/providers.toml`, hot-reloadable via
//! `POST /admin/reload_config` (§11, mirroring the model catalog's own
//! documented hot-reload story).

use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpoint {
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderRegistry {
    #[serde(flatten)]
    endpoints: HashMap<String, ProviderEndpoint>,
}

fn builtin_defaults() -> HashMap<String, ProviderEndpoint> {
    let mut m = HashMap::new();
    m.insert(
        "openai".to_string(),
        ProviderEndpoint { base_url: "https://api.openai.com".to_string(), api_key_env: Some("OPENAI_API_KEY".to_string()) },
    );
    m.insert(
        "groq".to_string(),
        ProviderEndpoint { base_url: "https://api.groq.com/openai".to_string(), api_key_env: Some("GROQ_API_KEY".to_string()) },
    );
    m
}

impl ProviderRegistry {
    /// Loads `providers.toml` from `dir` if present, falling back to the
    /// OpenAI-compatible builtins for any provider it doesn't mention.
    pub fn load(dir: Option<&Path>) -> anyhow::Result<Self> {
        let mut endpoints = builtin_defaults();
        if let Some(dir) = dir {
            let path = dir.join("providers.toml");
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                let parsed: ProviderRegistry = toml::from_str(&raw)?;
                for (name, endpoint) in parsed.endpoints {
                    endpoints.insert(name, endpoint);
                }
            }
        }
        Ok(Self { endpoints })
    }

    pub fn resolve(&self, provider: &str, path: &str) -> Option<String> {
        let endpoint = self.endpoints.get(provider)?;
        Some(format!("{}{}", endpoint.base_url.trim_end_matches('/'), path))
    }

    /// The provider's API key from its configured environment variable,
    /// unless the caller supplied its own via `x-aex-provider-key`.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        let endpoint = self.endpoints.get(provider)?;
        let var = endpoint.api_key_env.as_ref()?;
        env::var(var).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_openai_resolves() {
        let registry = ProviderRegistry::load(None).unwrap();
        let url = registry.resolve("openai", "/v1/chat/completions").unwrap();
        assert_eq!(url, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn unknown_provider_resolves_to_none() {
        let registry = ProviderRegistry::load(None).unwrap();
        assert!(registry.resolve("unknown-provider", "/v1/chat/completions").is_none());
    }

    #[test]
    fn providers_toml_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("providers.toml"),
            "[openai]\nbase_url = \"https://proxy.internal\"\n",
        )
        .unwrap();
        let registry = ProviderRegistry::load(Some(dir.path())).unwrap();
        let url = registry.resolve("openai", "/v1/chat/completions").unwrap();
        assert_eq!(url, "https://proxy.internal/v1/chat/completions");
    }
}
