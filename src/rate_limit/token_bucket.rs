//! Process-wide request budget for the music provider.
//!
//! One [`RateLimiter`] is created at startup and handed by `Arc` to every
//! component that talks to the provider.

use crate::server::metrics;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Permits handed out per window.
    pub permits: u32,
    /// Length of the fixed replenishment window.
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            permits: 20,
            window: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterStats {
    pub available: u32,
    pub permits: u32,
    pub window: Duration,
    pub is_blocked: bool,
}

struct BucketState {
    available: u32,
    window_start: Instant,
    blocked_until: Option<Instant>,
}

/// Fixed-window token bucket.
///
/// At most `permits` calls are admitted per window. When the provider answers
/// with a rate-limit response, [`RateLimiter::penalize`] empties the bucket
/// until the server-requested delay has passed, so every caller backs off.
pub struct RateLimiter {
    state: Mutex<BucketState>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let permits = config.permits.max(1);
        Self {
            state: Mutex::new(BucketState {
                available: permits,
                window_start: Instant::now(),
                blocked_until: None,
            }),
            config: RateLimiterConfig { permits, ..config },
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimiterConfig::default())
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        if let Some(until) = state.blocked_until {
            if now < until {
                return;
            }
            state.blocked_until = None;
            state.window_start = now;
            state.available = self.config.permits;
            return;
        }
        if now.duration_since(state.window_start) >= self.config.window {
            state.window_start = now;
            state.available = self.config.permits;
        }
    }

    /// Takes a permit if one is available, otherwise returns how long to wait.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        self.refill(&mut state, now);

        if let Some(until) = state.blocked_until {
            return Err(until.duration_since(now));
        }
        if state.available > 0 {
            state.available -= 1;
            return Ok(());
        }
        let window_end = state.window_start + self.config.window;
        Err(window_end.duration_since(now).max(Duration::from_millis(1)))
    }

    /// Suspends until a permit is available. Returns the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let start = Instant::now();
        loop {
            match self.try_acquire().await {
                Ok(()) => {
                    let waited = start.elapsed();
                    if !waited.is_zero() {
                        debug!("Rate limiter admitted call after {:?}", waited);
                    }
                    metrics::record_rate_limiter_wait(waited);
                    return waited;
                }
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Withholds all permits for `retry_after`.
    pub async fn penalize(&self, retry_after: Duration) {
        let mut state = self.state.lock().await;
        let until = Instant::now() + retry_after;
        state.available = 0;
        state.blocked_until = Some(match state.blocked_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
        warn!("Provider rate limit hit, pausing all calls for {:?}", retry_after);
        metrics::record_rate_limit_hit();
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let mut state = self.state.lock().await;
        self.refill(&mut state, Instant::now());
        RateLimiterStats {
            available: state.available,
            permits: self.config.permits,
            window: self.config.window,
            is_blocked: state.blocked_until.is_some(),
        }
    }
}
