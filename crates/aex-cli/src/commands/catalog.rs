// Path: crates/aex-cli/src/commands/catalog.rs
//! Loads the operator's model catalog from `AEX_CONFIG_DIR/models.toml`.
//! Falls back to a small built-in catalog so `aex serve` works out of the
//! box against OpenAI and Groq without any operator configuration.

use aex_types::catalog::ModelInfo;
use aex_types::{Micro, ModelCatalog};
use std::collections::HashMap;
use std::path::Path;

fn builtin_models() -> HashMap<String, ModelInfo> {
    let mut models = HashMap::new();
    models.insert(
        "gpt-4o-mini".to_string(),
        ModelInfo {
            provider: "openai".to_string(),
            provider_model: "gpt-4o-mini".to_string(),
            input_micro: Micro(150),
            output_micro: Micro(600),
            max_tokens: 16_384,
            supports_streaming: true,
            supports_tools: true,
            supports_vision: true,
        },
    );
    models.insert(
        "llama3-70b".to_string(),
        ModelInfo {
            provider: "groq".to_string(),
            provider_model: "llama3-70b-8192".to_string(),
            input_micro: Micro(590),
            output_micro: Micro(790),
            max_tokens: 8_192,
            supports_streaming: true,
            supports_tools: false,
            supports_vision: false,
        },
    );
    models
}

pub fn load(config_dir: Option<&Path>) -> anyhow::Result<ModelCatalog> {
    let path = config_dir.map(|dir| dir.join("models.toml"));
    let models = match path {
        Some(p) if p.exists() => {
            let raw = std::fs::read_to_string(&p)?;
            toml::from_str::<HashMap<String, ModelInfo>>(&raw)?
        }
        _ => builtin_models(),
    };
    Ok(ModelCatalog::new(models))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_config_dir_yields_builtins() {
        let catalog = load(None).unwrap();
        assert!(catalog.get("gpt-4o-mini").is_some());
        assert!(catalog.get("llama3-70b").is_some());
    }

    #[test]
    fn models_toml_overrides_builtins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("models.toml"),
            r#"
            [my-model]
            provider = "openai"
            provider_model = "gpt-4o"
            input_micro = 2500
            output_micro = 10000
            max_tokens = 128000
            supports_streaming = true
            "#,
        )
        .unwrap();
        let catalog = load(Some(dir.path())).unwrap();
        assert!(catalog.get("my-model").is_some());
        assert!(catalog.get("gpt-4o-mini").is_none());
    }
}
