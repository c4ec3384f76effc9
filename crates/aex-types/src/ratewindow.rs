// Path: crates/aex-types/src/ratewindow.rs
use serde::{Deserialize, Serialize};

/// Per-agent sliding window sample: a request observed at `at_ms` that
/// consumed (or is estimated to consume) `tokens` input tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateSample {
    pub at_ms: i64,
    pub tokens: u32,
}

/// The durable sliding-window row for one agent: every sample observed in
/// the trailing 60s window. Trimming happens on read (see `aex-core`'s
/// rate limiter), so the row is append-mostly and self-healing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateWindow {
    pub samples: Vec<RateSample>,
}

impl RateWindow {
    pub const WINDOW_MS: i64 = 60_000;

    pub fn trim(&mut self, now_ms: i64) {
        let floor = now_ms - Self::WINDOW_MS;
        self.samples.retain(|s| s.at_ms > floor);
    }

    pub fn request_count(&self) -> u32 {
        self.samples.len() as u32
    }

    pub fn token_count(&self) -> u64 {
        self.samples.iter().map(|s| s.tokens as u64).sum()
    }

    pub fn push(&mut self, at_ms: i64, tokens: u32) {
        self.samples.push(RateSample { at_ms, tokens });
    }
}
