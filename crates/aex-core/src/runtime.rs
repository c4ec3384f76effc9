// Path: crates/aex-core/src/runtime.rs
//! The explicit `Runtime` context (§9 "module-level singletons -> explicit
//! context"). Every handler in `aex-gateway` receives `State<Arc<Runtime>>`
//! instead of reaching for globals; tests build a `Runtime` with a
//! `FakeClock` and an in-memory `Store` fake.

use aex_policy::PolicyEngine;
use aex_store::Store;
use aex_types::{Clock, ModelCatalog, SystemClock};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RuntimeConfig;

/// Per-route timeout and TTL overrides, keyed by `Route::as_str()`-style
/// names (§5 "tunable per route").
#[derive(Debug, Clone, Default)]
pub struct RouteOverrides {
    pub reserve_ttl_ms: HashMap<String, i64>,
    pub unary_timeout_ms: HashMap<String, i64>,
}

/// Everything a handler needs, bundled once at startup and shared via
/// `Arc`. Nothing here is mutated in place after construction except
/// through the store's own transactional primitives.
pub struct Runtime {
    pub store: Arc<dyn Store>,
    pub policy: PolicyEngine,
    pub catalog: ModelCatalog,
    pub clock: Arc<dyn Clock>,
    pub config: RuntimeConfig,
    pub route_overrides: RouteOverrides,
    pub http: reqwest::Client,
}

impl Runtime {
    pub fn new(
        store: Arc<dyn Store>,
        policy: PolicyEngine,
        catalog: ModelCatalog,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            store,
            policy,
            catalog,
            clock: Arc::new(SystemClock),
            config,
            route_overrides: RouteOverrides::default(),
            http: reqwest::Client::new(),
        }
    }

    /// Test/CLI constructor taking an explicit clock (e.g. `FakeClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}
