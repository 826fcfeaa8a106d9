//! Rate limiter bounding the invocation rate of an operation category.
//!
//! This is a windowed burst limiter, deliberately not a token bucket: a
//! short burst of up to `burst_size` calls passes unthrottled, after which
//! callers are paced to the minimum inter-call interval
//! `1 / requests_per_second`. The burst allowance replenishes whenever a
//! full interval passes without a call.
//!
//! The shared pacing state lives under one mutex; the pacing sleep itself
//! happens outside the lock. A caller reserves its send slot inside the
//! critical section, so concurrent callers observe a consistent schedule.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum sustained requests per second. `None` disables the limiter
    /// entirely (pass-through with no state mutation).
    pub requests_per_second: Option<f64>,
    /// Number of calls allowed to burst before pacing begins. Values below
    /// 1 are treated as 1.
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: None,
            burst_size: 1,
        }
    }
}

impl RateLimiterConfig {
    /// Create a configuration limiting to the given sustained rate.
    pub fn new(requests_per_second: f64) -> Self {
        Self {
            requests_per_second: Some(requests_per_second),
            burst_size: 1,
        }
    }

    /// Set the burst size.
    pub fn with_burst_size(mut self, size: u32) -> Self {
        self.burst_size = size;
        self
    }

    /// A configuration that never throttles.
    pub fn unlimited() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
struct PacerState {
    /// Scheduled time of the most recent call (projected past any pacing
    /// wait the caller was told to serve).
    last_request: Option<Instant>,
    burst_count: u32,
}

/// Windowed burst rate limiter shared by all callers of one operation
/// category.
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<PacerState>,
    total_calls: AtomicU64,
    delayed_calls: AtomicU64,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PacerState {
                last_request: None,
                burst_count: 0,
            }),
            total_calls: AtomicU64::new(0),
            delayed_calls: AtomicU64::new(0),
        }
    }

    /// Wait (blocking) until the next call is allowed.
    pub fn acquire(&self) {
        if let Some(wait) = self.reserve() {
            std::thread::sleep(wait);
        }
    }

    /// Wait (cooperatively) until the next call is allowed.
    pub async fn acquire_async(&self) {
        if let Some(wait) = self.reserve() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Invoke an operation once the rate limit allows it, blocking the
    /// calling thread for any pacing wait.
    pub fn throttle<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.acquire();
        operation()
    }

    /// Async dual of [`throttle`](RateLimiter::throttle).
    pub async fn throttle_async<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.acquire_async().await;
        operation().await
    }

    /// Reserve the caller's send slot, returning the pacing wait it must
    /// serve before proceeding, if any.
    fn reserve(&self) -> Option<Duration> {
        let rps = self.config.requests_per_second.filter(|rps| *rps > 0.0)?;
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let interval = Duration::from_secs_f64(1.0 / rps);
        let burst_size = self.config.burst_size.max(1);

        let mut state = self.state.lock();
        let now = Instant::now();
        let since_last = state
            .last_request
            .map(|t| now.saturating_duration_since(t));

        // A full quiet interval replenishes the burst allowance.
        if let Some(elapsed) = since_last {
            if elapsed >= interval {
                state.burst_count = 0;
            }
        }

        let mut wait = Duration::ZERO;
        if state.burst_count >= burst_size {
            if let Some(elapsed) = since_last {
                wait = interval.saturating_sub(elapsed);
            }
            state.burst_count = 0;
        }

        state.burst_count += 1;
        state.last_request = Some(now + wait);
        drop(state);

        if wait.is_zero() {
            None
        } else {
            self.delayed_calls.fetch_add(1, Ordering::Relaxed);
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit pacing before call");
            Some(wait)
        }
    }

    /// Total calls seen by the limiter (enabled configurations only).
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// Calls that had to wait for pacing.
    pub fn delayed_calls(&self) -> u64 {
        self.delayed_calls.load(Ordering::Relaxed)
    }

    /// Reset pacing state and counters.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last_request = None;
        state.burst_count = 0;
        drop(state);
        self.total_calls.store(0, Ordering::Relaxed);
        self.delayed_calls.store(0, Ordering::Relaxed);
    }

    /// The limiter configuration.
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("total_calls", &self.total_calls())
            .field("delayed_calls", &self.delayed_calls())
            .finish()
    }
}
