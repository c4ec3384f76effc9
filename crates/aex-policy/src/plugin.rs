// Path: crates/aex-policy/src/plugin.rs
//! Declared policy plugins (§4.4) and their load-time ordering.
//!
//! Grounded in `ioi-api::services::access`'s `ServiceDirectory`: plugins
//! are `Arc<dyn PolicyPlugin>` kept in one deterministically ordered
//! list. Unlike `ServiceDirectory`'s lexicographic-by-id sort, plugins
//! here declare dependencies by name and are topologically sorted at
//! startup (§9 "cyclic policy plugins -> static dependency declaration"),
//! falling back to name order among plugins with no relative ordering
//! constraint so the sort is stable across runs.

use crate::decision::Verdict;
use crate::error::PolicyError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Request context handed to every plugin. Immutable; a plugin that wants
/// to change the routed body returns a JSON merge-patch instead.
pub struct PolicyContext<'a> {
    pub agent_id: &'a str,
    pub route: aex_types::execution::Route,
    pub model: &'a str,
    pub body: &'a serde_json::Value,
}

/// One plugin's outcome for this request.
pub struct PluginOutcome {
    pub verdict: Verdict,
    pub obligations: Vec<String>,
}

impl PluginOutcome {
    pub fn allow() -> Self {
        Self { verdict: Verdict::Allow, obligations: Vec::new() }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self { verdict: Verdict::Deny { reason: reason.into() }, obligations: Vec::new() }
    }

    pub fn modify(patch: serde_json::Value) -> Self {
        Self { verdict: Verdict::Modify { patch }, obligations: Vec::new() }
    }

    pub fn with_obligations(mut self, obligations: Vec<String>) -> Self {
        self.obligations = obligations;
        self
    }
}

/// A declared policy plugin. Plugins are pure functions of
/// `(request, prior decision)`; they must not perform side effects beyond
/// logging — any durable state belongs in `aex-store`.
#[async_trait]
pub trait PolicyPlugin: Send + Sync {
    /// Unique name used in `depends_on` declarations and the plugin trace.
    fn name(&self) -> &str;

    /// Names of plugins that must run (and whose patches must be merged)
    /// before this one.
    fn depends_on(&self) -> &[&str] {
        &[]
    }

    async fn evaluate(&self, ctx: &PolicyContext<'_>) -> PluginOutcome;
}

/// Topologically sorted, deterministic plugin pipeline.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    ordered: Arc<Vec<Arc<dyn PolicyPlugin>>>,
}

impl PluginRegistry {
    /// Builds a registry from an unordered set of plugins, sorting them
    /// topologically by `depends_on`. Rejects unknown dependencies and
    /// cycles (§9).
    pub fn new(plugins: Vec<Arc<dyn PolicyPlugin>>) -> Result<Self, PolicyError> {
        let mut by_name: HashMap<String, Arc<dyn PolicyPlugin>> = HashMap::new();
        for p in &plugins {
            by_name.insert(p.name().to_string(), p.clone());
        }
        for p in &plugins {
            for dep in p.depends_on() {
                if !by_name.contains_key(*dep) {
                    return Err(PolicyError::UnknownDependency {
                        plugin: p.name().to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }

        // Kahn's algorithm with a deterministic tie-break: among plugins
        // with no remaining unsatisfied dependency, pick the
        // lexicographically smallest name.
        let mut names: Vec<String> = by_name.keys().cloned().collect();
        names.sort();

        let remaining_deps: HashMap<String, HashSet<String>> = by_name
            .iter()
            .map(|(name, p)| (name.clone(), p.depends_on().iter().map(|s| s.to_string()).collect()))
            .collect();

        let mut ordered = Vec::with_capacity(names.len());
        let mut placed: HashSet<String> = HashSet::new();

        while placed.len() < names.len() {
            let ready: Option<String> = names
                .iter()
                .filter(|n| !placed.contains(*n))
                .find(|n| remaining_deps[*n].iter().all(|d| placed.contains(d)))
                .cloned();

            match ready {
                Some(name) => {
                    placed.insert(name.clone());
                    ordered.push(by_name[&name].clone());
                }
                None => {
                    let stuck: Vec<String> = names.into_iter().filter(|n| !placed.contains(n)).collect();
                    return Err(PolicyError::CyclicDependency(stuck));
                }
            }
        }

        Ok(Self { ordered: Arc::new(ordered) })
    }

    pub fn plugins(&self) -> impl Iterator<Item = &Arc<dyn PolicyPlugin>> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
