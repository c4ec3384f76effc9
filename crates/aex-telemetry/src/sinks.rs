// Path: crates/aex-telemetry/src/sinks.rs
//! Abstract metrics traits, decoupling C1/C4/C5/C7 instrumentation from
//! the Prometheus backend, mirroring `ioi-telemetry::sinks`.

use once_cell::sync::OnceCell;

/// A no-op sink for tests or when metrics are disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// Lazily-initialized global `MetricsSink`. Unset until `aex-cli`'s
/// `serve` command calls `prometheus_sink::install`.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns the configured global sink, or a no-op sink if none was
/// installed (unit tests, `aex audit`/`aex agent` CLI paths).
pub fn global() -> &'static dyn MetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Metrics for the durable store (C1): reserve/commit/release/fail
/// counts and transaction retry behavior.
pub trait StoreMetricsSink: Send + Sync + std::fmt::Debug {
    fn inc_reserve(&self, outcome: &'static str);
    fn inc_terminal_transition(&self, event_type: &'static str);
    fn inc_write_retry(&self);
    fn observe_write_duration(&self, primitive: &'static str, duration_secs: f64);
}
impl StoreMetricsSink for NopSink {
    fn inc_reserve(&self, _outcome: &'static str) {}
    fn inc_terminal_transition(&self, _event_type: &'static str) {}
    fn inc_write_retry(&self) {}
    fn observe_write_duration(&self, _primitive: &'static str, _duration_secs: f64) {}
}

/// Metrics for the policy engine (C4).
pub trait PolicyMetricsSink: Send + Sync + std::fmt::Debug {
    fn inc_kernel_deny(&self, rule: &'static str);
    fn inc_plugin_deny(&self, plugin: &str);
    fn observe_pipeline_duration(&self, duration_secs: f64);
}
impl PolicyMetricsSink for NopSink {
    fn inc_kernel_deny(&self, _rule: &'static str) {}
    fn inc_plugin_deny(&self, _plugin: &str) {}
    fn observe_pipeline_duration(&self, _duration_secs: f64) {}
}

/// Metrics for the rate limiter (C5).
pub trait RateLimitMetricsSink: Send + Sync + std::fmt::Debug {
    fn inc_rate_denied(&self, dimension: &'static str);
    fn set_window_occupancy(&self, agent_id: &str, requests: u32);
}
impl RateLimitMetricsSink for NopSink {
    fn inc_rate_denied(&self, _dimension: &'static str) {}
    fn set_window_occupancy(&self, _agent_id: &str, _requests: u32) {}
}

/// Metrics for the HTTP gateway surface (C6/C7 entry point).
pub trait GatewayMetricsSink: Send + Sync + std::fmt::Debug {
    fn observe_request_duration(&self, route: &str, duration_secs: f64);
    fn inc_requests_total(&self, route: &str, status_code: u16);
    fn inc_committed_micro(&self, amount: u64);
    fn inc_streaming_sessions(&self);
    fn dec_streaming_sessions(&self);
}
impl GatewayMetricsSink for NopSink {
    fn observe_request_duration(&self, _route: &str, _duration_secs: f64) {}
    fn inc_requests_total(&self, _route: &str, _status_code: u16) {}
    fn inc_committed_micro(&self, _amount: u64) {}
    fn inc_streaming_sessions(&self) {}
    fn dec_streaming_sessions(&self) {}
}

/// Generic structured error counter, categorized by kind/variant.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    fn inc_error(&self, kind: &'static str, variant: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _variant: &'static str) {}
}

/// Unified sink implemented once per backend (Prometheus, no-op).
pub trait MetricsSink:
    StoreMetricsSink + PolicyMetricsSink + RateLimitMetricsSink + GatewayMetricsSink + ErrorMetricsSink
{
}

impl<T> MetricsSink for T where
    T: StoreMetricsSink + PolicyMetricsSink + RateLimitMetricsSink + GatewayMetricsSink + ErrorMetricsSink
{
}
