//! Observability for the AEX governance gateway: structured JSON logging
//! and Prometheus-backed `*MetricsSink` traits, mirroring
//! `ioi-telemetry`'s split between abstract sinks and a concrete backend.

pub mod init;
pub mod prometheus_sink;
pub mod sinks;

pub use init::init_tracing;
pub use sinks::{
    global, ErrorMetricsSink, GatewayMetricsSink, MetricsSink, NopSink, PolicyMetricsSink,
    RateLimitMetricsSink, StoreMetricsSink,
};
