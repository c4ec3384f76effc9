// Path: crates/aex-gateway/src/metrics.rs
//! `GET /metrics`: Prometheus text exposition, mirroring
//! `http-rpc-gateway::metrics_handler`.

use prometheus::Encoder;

pub async fn metrics_handler() -> ([(axum::http::HeaderName, String); 1], axum::body::Bytes) {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::with_capacity(1 << 16);
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::error!(error = %e, "failed to encode prometheus metrics");
    }
    ([(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())], buf.into())
}
