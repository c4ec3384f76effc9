// Path: crates/aex-telemetry/src/prometheus_sink.rs
//! Concrete `MetricsSink` backed by the `prometheus` crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge_vec, register_histogram, register_histogram_vec,
    register_int_counter, register_int_counter_vec, GaugeVec, Histogram, HistogramVec,
    IntCounter, IntCounterVec,
};

static RESERVE_OUTCOMES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static TERMINAL_TRANSITIONS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static WRITE_RETRIES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static WRITE_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();

static KERNEL_DENIES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static PLUGIN_DENIES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static PIPELINE_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();

static RATE_DENIES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static WINDOW_OCCUPANCY: OnceCell<GaugeVec> = OnceCell::new();

static GATEWAY_REQUEST_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static GATEWAY_REQUESTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static COMMITTED_MICRO_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STREAMING_SESSIONS: OnceCell<GaugeVec> = OnceCell::new();

static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("prometheus sink not initialized; call aex_telemetry::prometheus_sink::install() first")
    };
}

impl StoreMetricsSink for PrometheusSink {
    fn inc_reserve(&self, outcome: &'static str) {
        get_metric!(RESERVE_OUTCOMES_TOTAL).with_label_values(&[outcome]).inc();
    }
    fn inc_terminal_transition(&self, event_type: &'static str) {
        get_metric!(TERMINAL_TRANSITIONS_TOTAL).with_label_values(&[event_type]).inc();
    }
    fn inc_write_retry(&self) {
        get_metric!(WRITE_RETRIES_TOTAL).inc();
    }
    fn observe_write_duration(&self, primitive: &'static str, duration_secs: f64) {
        get_metric!(WRITE_DURATION_SECONDS).with_label_values(&[primitive]).observe(duration_secs);
    }
}

impl PolicyMetricsSink for PrometheusSink {
    fn inc_kernel_deny(&self, rule: &'static str) {
        get_metric!(KERNEL_DENIES_TOTAL).with_label_values(&[rule]).inc();
    }
    fn inc_plugin_deny(&self, plugin: &str) {
        get_metric!(PLUGIN_DENIES_TOTAL).with_label_values(&[plugin]).inc();
    }
    fn observe_pipeline_duration(&self, duration_secs: f64) {
        get_metric!(PIPELINE_DURATION_SECONDS).observe(duration_secs);
    }
}

impl RateLimitMetricsSink for PrometheusSink {
    fn inc_rate_denied(&self, dimension: &'static str) {
        get_metric!(RATE_DENIES_TOTAL).with_label_values(&[dimension]).inc();
    }
    fn set_window_occupancy(&self, agent_id: &str, requests: u32) {
        get_metric!(WINDOW_OCCUPANCY).with_label_values(&[agent_id]).set(requests as f64);
    }
}

impl GatewayMetricsSink for PrometheusSink {
    fn observe_request_duration(&self, route: &str, duration_secs: f64) {
        get_metric!(GATEWAY_REQUEST_DURATION_SECONDS).with_label_values(&[route]).observe(duration_secs);
    }
    fn inc_requests_total(&self, route: &str, status_code: u16) {
        get_metric!(GATEWAY_REQUESTS_TOTAL)
            .with_label_values(&[route, &status_code.to_string()])
            .inc();
    }
    fn inc_committed_micro(&self, amount: u64) {
        get_metric!(COMMITTED_MICRO_TOTAL).inc_by(amount);
    }
    fn inc_streaming_sessions(&self) {
        get_metric!(STREAMING_SESSIONS).with_label_values(&["active"]).inc();
    }
    fn dec_streaming_sessions(&self) {
        get_metric!(STREAMING_SESSIONS).with_label_values(&["active"]).dec();
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, variant: &'static str) {
        get_metric!(ERRORS_TOTAL).with_label_values(&[kind, variant]).inc();
    }
}

/// Registers every AEX collector with the default Prometheus registry and
/// returns a static `MetricsSink`. Call exactly once at startup.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    RESERVE_OUTCOMES_TOTAL
        .set(register_int_counter_vec!(
            "aex_store_reserve_outcomes_total",
            "Reserve outcomes by kind (reserved, budget_exceeded, idempotent_hit, in_flight_duplicate).",
            &["outcome"]
        )?)
        .expect("static already initialized");
    TERMINAL_TRANSITIONS_TOTAL
        .set(register_int_counter_vec!(
            "aex_store_terminal_transitions_total",
            "Terminal event appends by event type.",
            &["event_type"]
        )?)
        .expect("static already initialized");
    WRITE_RETRIES_TOTAL
        .set(register_int_counter!(
            "aex_store_write_retries_total",
            "Total write-transaction retries due to transient backend failures."
        )?)
        .expect("static already initialized");
    WRITE_DURATION_SECONDS
        .set(register_histogram_vec!(
            "aex_store_write_duration_seconds",
            "Latency of store write primitives.",
            &["primitive"],
            exponential_buckets(0.0001, 2.0, 16)?
        )?)
        .expect("static already initialized");

    KERNEL_DENIES_TOTAL
        .set(register_int_counter_vec!(
            "aex_policy_kernel_denies_total",
            "Kernel rule denials by rule name.",
            &["rule"]
        )?)
        .expect("static already initialized");
    PLUGIN_DENIES_TOTAL
        .set(register_int_counter_vec!(
            "aex_policy_plugin_denies_total",
            "Plugin denials by plugin name.",
            &["plugin"]
        )?)
        .expect("static already initialized");
    PIPELINE_DURATION_SECONDS
        .set(register_histogram!(
            "aex_policy_pipeline_duration_seconds",
            "Latency of the full kernel+plugin evaluation.",
            exponential_buckets(0.0001, 2.0, 16)?
        )?)
        .expect("static already initialized");

    RATE_DENIES_TOTAL
        .set(register_int_counter_vec!(
            "aex_rate_limit_denies_total",
            "Rate-limit denials by dimension (requests, tokens).",
            &["dimension"]
        )?)
        .expect("static already initialized");
    WINDOW_OCCUPANCY
        .set(register_gauge_vec!(
            "aex_rate_limit_window_occupancy",
            "Current request count in the trailing 60s window per agent.",
            &["agent_id"]
        )?)
        .expect("static already initialized");

    GATEWAY_REQUEST_DURATION_SECONDS
        .set(register_histogram_vec!(
            "aex_gateway_request_duration_seconds",
            "Latency of gateway HTTP requests.",
            &["route"],
            exponential_buckets(0.001, 2.0, 15)?
        )?)
        .expect("static already initialized");
    GATEWAY_REQUESTS_TOTAL
        .set(register_int_counter_vec!(
            "aex_gateway_requests_total",
            "Total gateway HTTP requests by route and status.",
            &["route", "status"]
        )?)
        .expect("static already initialized");
    COMMITTED_MICRO_TOTAL
        .set(register_int_counter!(
            "aex_gateway_committed_micro_total",
            "Total settled cost in micro-units across all agents."
        )?)
        .expect("static already initialized");
    STREAMING_SESSIONS
        .set(register_gauge_vec!(
            "aex_gateway_streaming_sessions",
            "Current number of open SSE relay sessions.",
            &["state"]
        )?)
        .expect("static already initialized");

    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "aex_errors_total",
            "Total errors by kind and variant.",
            &["kind", "variant"]
        )?)
        .expect("static already initialized");

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}
