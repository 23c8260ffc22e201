//! Sync throttling and failure backoff
//!
//! The operator only ever works on a single key, so both limiters are
//! plain values guarded by the controller context.

use std::time::{Duration, Instant};

/// Token refill rate: one sync every 20 seconds on average
pub const SYNC_RATE_PER_SEC: f64 = 0.05;
/// Syncs allowed back to back before throttling kicks in
pub const SYNC_BURST: u32 = 4;

pub const BACKOFF_BASE: Duration = Duration::from_millis(5);
pub const BACKOFF_MAX: Duration = Duration::from_secs(1000);

/// Token bucket limiter
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// A full bucket
    pub fn new(rate: f64, burst: u32, now: Instant) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            tokens: f64::from(burst),
            last: now,
        }
    }

    /// Take a token and return how long the caller has to wait before using
    /// it. The bucket may go negative; later callers queue behind.
    pub fn reserve(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.tokens -= 1.0;

        if self.tokens >= 0.0 || self.rate <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rate)
        }
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new(SYNC_RATE_PER_SEC, SYNC_BURST, Instant::now())
    }
}

/// Per-item exponential backoff: base, 2x base, 4x base, ... capped at max.
#[derive(Debug, Clone)]
pub struct ItemBackoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl ItemBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
        }
    }

    /// Record a failure and return the delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.failures.min(31);
        self.failures = self.failures.saturating_add(1);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }

    /// Forget past failures
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

impl Default for ItemBackoff {
    fn default() -> Self {
        Self::new(BACKOFF_BASE, BACKOFF_MAX)
    }
}
