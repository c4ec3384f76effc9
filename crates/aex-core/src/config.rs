// Path: crates/aex-core/src/config.rs
//! Runtime configuration (§6 Environment, §9 "module-level singletons ->
//! explicit context"). Grounded in `ioi-api::config::WorkloadConfig`: a
//! small serde `Deserialize` struct loaded from a TOML file, with
//! environment variables layered on top for the values operators most
//! commonly override per deployment.

use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

fn default_reserve_ttl_ms() -> i64 {
    60_000
}
fn default_unary_timeout_ms() -> i64 {
    120_000
}
fn default_stream_inactivity_ms() -> i64 {
    60_000
}
fn default_mutex_wait_ms() -> i64 {
    5_000
}
fn default_port() -> u16 {
    8080
}

/// `AEX_CONFIG_DIR/gateway.toml`. Every field has a default so an empty
/// or absent file still produces a usable config.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_reserve_ttl_ms")]
    pub reserve_ttl_ms: i64,
    #[serde(default = "default_unary_timeout_ms")]
    pub provider_unary_timeout_ms: i64,
    #[serde(default = "default_stream_inactivity_ms")]
    pub stream_inactivity_timeout_ms: i64,
    #[serde(default = "default_mutex_wait_ms")]
    pub inflight_mutex_wait_ms: i64,
    #[serde(default = "default_port")]
    pub port: u16,
    /// §9 open question 1: clamp actual cost to `reserve_micro` on
    /// commit rather than settling the full requested cost. Threaded
    /// into `Store::commit`. When `false`, an over-reserve commit still
    /// cannot push an agent's `spent_micro + reserved_micro` past its
    /// `budget_micro`: the store's invariant check rejects the commit
    /// rather than silently recording an over-budget spend.
    #[serde(default = "default_true")]
    pub clamp_overrun: bool,
    pub db_path: String,
    #[serde(default)]
    pub admin_control_key: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reserve_ttl_ms: default_reserve_ttl_ms(),
            provider_unary_timeout_ms: default_unary_timeout_ms(),
            stream_inactivity_timeout_ms: default_stream_inactivity_ms(),
            inflight_mutex_wait_ms: default_mutex_wait_ms(),
            port: default_port(),
            clamp_overrun: true,
            db_path: "aex.redb".to_string(),
            admin_control_key: None,
        }
    }
}

impl RuntimeConfig {
    /// Loads `gateway.toml` from `AEX_CONFIG_DIR` if set and present, then
    /// applies `AEX_*` environment overrides on top. Never fails on a
    /// missing config directory; a missing or malformed file is an error
    /// since an operator who set `AEX_CONFIG_DIR` expects it to be read.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match env::var("AEX_CONFIG_DIR") {
            Ok(dir) => Self::from_dir(Path::new(&dir))?,
            Err(_) => Self::default(),
        };

        if let Ok(path) = env::var("AEX_DB_PATH") {
            cfg.db_path = path;
        }
        if let Ok(port) = env::var("AEX_PORT") {
            cfg.port = port.parse()?;
        }
        if let Ok(key) = env::var("AEX_ADMIN_CONTROL_KEY") {
            cfg.admin_control_key = Some(key);
        }
        Ok(cfg)
    }

    fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join("gateway.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn reserve_ttl(&self) -> Duration {
        Duration::from_millis(self.reserve_ttl_ms.max(0) as u64)
    }

    pub fn provider_unary_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_unary_timeout_ms.max(0) as u64)
    }

    pub fn stream_inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_inactivity_timeout_ms.max(0) as u64)
    }

    pub fn inflight_mutex_wait(&self) -> Duration {
        Duration::from_millis(self.inflight_mutex_wait_ms.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.reserve_ttl(), Duration::from_secs(60));
        assert!(cfg.clamp_overrun);
    }

    #[test]
    fn missing_config_dir_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RuntimeConfig::from_dir(dir.path()).unwrap();
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn partial_toml_fills_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gateway.toml"), "port = 9000\n").unwrap();
        let cfg = RuntimeConfig::from_dir(dir.path()).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.reserve_ttl_ms, default_reserve_ttl_ms());
    }
}
