// Path: crates/aex-gateway/src/middleware.rs
//! IP-based request shaping ahead of the agent rate limiter (§11): a
//! lightweight token-bucket `tower` middleware, ported in spirit from
//! `http-rpc-gateway::IpLimiter`. This is pure transport hygiene — it
//! never touches the ledger and a denial here never writes a `deny.rate`
//! event.

use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Trusted reverse-proxy addresses whose `X-Forwarded-For` header is
/// honored when computing the client IP. Exact-match only: this
/// deployment's proxies sit at fixed addresses, so CIDR-range matching
/// is not needed here (see DESIGN.md).
#[derive(Clone)]
pub struct IpLimiter {
    buckets: Arc<DashMap<IpAddr, Bucket>>,
    rps: f64,
    burst: f64,
    trusted_proxies: Arc<Vec<IpAddr>>,
}

impl IpLimiter {
    pub fn new(rps: u32, burst: u32, trusted_proxies: Vec<IpAddr>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            rps: rps as f64,
            burst: burst as f64,
            trusted_proxies: Arc::new(trusted_proxies),
        }
    }

    fn client_ip<B>(&self, req: &Request<B>) -> IpAddr {
        let peer_ip = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|c| c.0.ip());
        if let Some(peer_ip) = peer_ip {
            if self.trusted_proxies.contains(&peer_ip) {
                if let Some(xff) = req.headers().get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
                    if let Some(first) = xff.split(',').next() {
                        if let Ok(ip) = first.trim().parse::<IpAddr>() {
                            return ip;
                        }
                    }
                }
            }
            return peer_ip;
        }
        IpAddr::from([127, 0, 0, 1])
    }

    fn allow<B>(&self, req: &Request<B>) -> bool {
        let ip = self.client_ip(req);
        let now = Instant::now();
        let mut entry = self.buckets.entry(ip).or_insert_with(|| Bucket { tokens: self.burst, last: now });
        let elapsed = now.duration_since(entry.last).as_secs_f64();
        entry.tokens = (entry.tokens + elapsed * self.rps).min(self.burst);
        entry.last = now;
        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<IpLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if limiter.allow(&req) {
        next.run(req).await
    } else {
        (
            StatusCode::TOO_MANY_REQUESTS,
            axum::response::Json(serde_json::json!({
                "error": {"code": "rate.exceeded", "message": "too many requests from this source"}
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn req_from(ip: &str) -> Request<()> {
        let mut req = Request::new(());
        req.extensions_mut().insert(ConnectInfo(SocketAddr::new(ip.parse().unwrap(), 0)));
        req
    }

    #[test]
    fn allows_burst_then_throttles() {
        let limiter = IpLimiter::new(1, 2, vec![]);
        let req = req_from("10.0.0.1");
        assert!(limiter.allow(&req));
        assert!(limiter.allow(&req));
        assert!(!limiter.allow(&req));
    }

    #[test]
    fn separate_ips_have_independent_buckets() {
        let limiter = IpLimiter::new(1, 1, vec![]);
        assert!(limiter.allow(&req_from("10.0.0.1")));
        assert!(limiter.allow(&req_from("10.0.0.2")));
    }

    #[test]
    fn untrusted_peer_ignores_forwarded_for() {
        let limiter = IpLimiter::new(1, 1, vec![]);
        let mut req = req_from("10.0.0.1");
        req.headers_mut().insert("x-forwarded-for", "9.9.9.9".parse().unwrap());
        assert_eq!(limiter.client_ip(&req), "10.0.0.1".parse::<IpAddr>().unwrap());
    }
}
