//! Circuit breaker for protecting against cascading failures.
//!
//! The breaker has three states:
//! - CLOSED: normal operation, calls flow through
//! - OPEN: calls are rejected immediately without invoking the operation
//! - HALF_OPEN: the recovery window has elapsed and probe calls are allowed
//!
//! One instance protects one logical resource and is shared by all of its
//! concurrent callers, in both the threaded and the async execution model.
//! The breaker itself never suspends: the admission decision and the outcome
//! recording are synchronous critical sections under a single mutex, and the
//! operation runs outside the lock.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::classify::OutcomeClassifier;
use crate::error::ResilienceError;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, calls flow normally.
    Closed,
    /// Circuit is open, calls are rejected.
    Open,
    /// Circuit is half-open, testing if the resource recovered.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Whether the breaker is active. When disabled, calls pass through
    /// untouched and no state is recorded.
    pub enabled: bool,
    /// Number of accumulated failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time the circuit stays open before the next call may probe.
    pub recovery_timeout: Duration,
    /// Number of consecutive successes in half-open state to close the
    /// circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration with the given failure threshold.
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold,
            ..Default::default()
        }
    }

    /// Set the recovery timeout.
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Set the success threshold for the half-open state.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Enable or disable the breaker.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Read-only snapshot of breaker state and statistics.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerStats {
    /// Current state.
    pub state: CircuitState,
    /// Failures accumulated toward the threshold.
    pub failure_count: u32,
    /// Successes accumulated in half-open state.
    pub success_count: u32,
    /// When the last failure was recorded.
    pub last_failure: Option<Instant>,
    /// When the last success was recorded.
    pub last_success: Option<Instant>,
    /// Total calls seen, including rejected ones.
    pub total_calls: u64,
    /// Total failures recorded.
    pub total_failures: u64,
    /// Total successes recorded.
    pub total_successes: u64,
    /// Total calls rejected while open.
    pub total_rejected: u64,
    /// `total_failures / total_calls` (0 when no calls were made).
    pub failure_rate: f64,
    /// `total_successes / total_calls` (0 when no calls were made).
    pub success_rate: f64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    total_calls: u64,
    total_failures: u64,
    total_successes: u64,
    total_rejected: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            last_success: None,
            total_calls: 0,
            total_failures: 0,
            total_successes: 0,
            total_rejected: 0,
        }
    }

    fn transition_to(&mut self, new_state: CircuitState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }

        info!(from = %old_state, to = %new_state, "Circuit breaker state transition");

        match new_state {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.success_count = 0;
            }
            CircuitState::HalfOpen => {
                self.success_count = 0;
            }
            CircuitState::Open => {}
        }

        self.state = new_state;
    }
}

/// Circuit breaker tracking failures and short-circuiting calls while open.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    /// Execute an operation with breaker protection.
    ///
    /// Any `Err` outcome counts as a failure. Use [`call_classified`] to
    /// supply a classifier.
    ///
    /// [`call_classified`]: CircuitBreaker::call_classified
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call_classified(&OutcomeClassifier::default(), operation)
    }

    /// Execute an operation with breaker protection, classifying the outcome
    /// with the given classifier.
    ///
    /// An `Ok` result flagged as a failure is recorded as one but still
    /// returned to the caller unchanged.
    pub fn call_classified<T, E, F>(
        &self,
        classifier: &OutcomeClassifier<T, E>,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.config.enabled {
            return operation().map_err(ResilienceError::Operation);
        }

        self.admit()
            .map_err(|retry_after| ResilienceError::CircuitOpen { retry_after })?;

        let outcome = operation();
        self.settle(classifier.classify(&outcome));
        outcome.map_err(ResilienceError::Operation)
    }

    /// Async dual of [`call`](CircuitBreaker::call).
    pub async fn call_async<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified_async(&OutcomeClassifier::default(), operation)
            .await
    }

    /// Async dual of [`call_classified`](CircuitBreaker::call_classified).
    pub async fn call_classified_async<T, E, F, Fut>(
        &self,
        classifier: &OutcomeClassifier<T, E>,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            return operation().await.map_err(ResilienceError::Operation);
        }

        self.admit()
            .map_err(|retry_after| ResilienceError::CircuitOpen { retry_after })?;

        let outcome = operation().await;
        self.settle(classifier.classify(&outcome));
        outcome.map_err(ResilienceError::Operation)
    }

    /// Admit or reject a call.
    ///
    /// While open, returns the remaining recovery window; once the window
    /// has elapsed, the admitting call transitions the breaker to half-open.
    /// A no-op returning `Ok` when the breaker is disabled.
    pub fn admit(&self) -> Result<(), Duration> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        inner.total_calls += 1;

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .last_failure
                .map(|t| t.elapsed())
                .unwrap_or(self.config.recovery_timeout);

            if elapsed < self.config.recovery_timeout {
                inner.total_rejected += 1;
                let retry_after = self.config.recovery_timeout - elapsed;
                warn!(retry_after_ms = retry_after.as_millis() as u64, "Circuit breaker is open, rejecting call");
                return Err(retry_after);
            }

            inner.transition_to(CircuitState::HalfOpen);
        }

        Ok(())
    }

    /// Record the classified outcome of an admitted call.
    pub fn settle(&self, is_failure: bool) {
        if !self.config.enabled {
            return;
        }
        if is_failure {
            self.record_failure();
        } else {
            self.record_success();
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.last_success = Some(Instant::now());
        inner.total_successes += 1;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                debug!(
                    success_count = inner.success_count,
                    threshold = self.config.success_threshold,
                    "Circuit breaker recorded success in half-open state"
                );
                if inner.success_count >= self.config.success_threshold {
                    inner.transition_to(CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure = Some(Instant::now());
        inner.total_failures += 1;
        inner.failure_count += 1;

        match inner.state {
            CircuitState::Closed => {
                debug!(
                    failure_count = inner.failure_count,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker recorded failure"
                );
                if inner.failure_count >= self.config.failure_threshold {
                    warn!(
                        failures = inner.failure_count,
                        "Circuit breaker opened after reaching failure threshold"
                    );
                    inner.transition_to(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                // A single failure during probing reopens the circuit.
                warn!("Circuit breaker failure in half-open state, reopening circuit");
                inner.transition_to(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Returns true if the circuit is open.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Returns true if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Returns true if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Manually reset the breaker to closed with all threshold counters
    /// zeroed. Cumulative totals are preserved.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.transition_to(CircuitState::Closed);
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure = None;
        info!("Circuit breaker manually reset to closed");
    }

    /// Manually force the breaker open. The recovery window starts now.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.transition_to(CircuitState::Open);
        inner.last_failure = Some(Instant::now());
        info!("Circuit breaker manually forced open");
    }

    /// Consistent snapshot of state and statistics.
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        let calls = inner.total_calls.max(1) as f64;
        CircuitBreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure: inner.last_failure,
            last_success: inner.last_success,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
            total_rejected: inner.total_rejected,
            failure_rate: inner.total_failures as f64 / calls,
            success_rate: inner.total_successes as f64 / calls,
        }
    }

    /// The breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("CircuitBreaker")
            .field("state", &stats.state)
            .field("failure_count", &stats.failure_count)
            .field("success_count", &stats.success_count)
            .field("config", &self.config)
            .finish()
    }
}
