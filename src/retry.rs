//! Retry policy with exponential backoff.
//!
//! The policy holds no state between calls; it is pure with respect to its
//! configuration. Sync and async entry points drive the same retry decision
//! and backoff calculation, differing only in how they sleep.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::classify::OutcomeClassifier;

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of extra attempts beyond the first (`max_retries + 1` total).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied to the delay on each subsequent retry. Must be
    /// at least 1.0.
    pub backoff_factor: f64,
    /// Upper bound on any single delay, jitter included.
    pub max_delay: Duration,
    /// Widen each delay by up to 25% of uniform random jitter.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a new configuration with the given retry count.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff factor.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// A configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Retry policy that re-invokes an operation on retryable outcomes.
///
/// Classification defaults are explicit: with no classifier configured,
/// every error is retried and no `Ok` result is. A retryable `Ok` result is
/// returned as-is once attempts are exhausted; a retryable error propagates
/// once attempts are exhausted.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute an operation, retrying every error.
    pub fn execute<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        let classifier = OutcomeClassifier::default();
        self.execute_with(|outcome| classifier.classify(outcome), operation)
    }

    /// Execute an operation, retrying outcomes the classifier flags.
    pub fn execute_classified<T, E, F>(
        &self,
        classifier: &OutcomeClassifier<T, E>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.execute_with(|outcome| classifier.classify(outcome), operation)
    }

    /// Execute an operation with a custom retry decision.
    ///
    /// `should_retry` is consulted after every attempt except the last; the
    /// final attempt's outcome is returned regardless.
    pub fn execute_with<T, E, D, F>(&self, should_retry: D, mut operation: F) -> Result<T, E>
    where
        D: Fn(&Result<T, E>) -> bool,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            let outcome = operation();
            match self.next_delay(&should_retry, &outcome, attempt) {
                None => return outcome,
                Some(delay) => {
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Async dual of [`execute`](RetryPolicy::execute).
    pub async fn execute_async<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let classifier = OutcomeClassifier::default();
        self.execute_with_async(|outcome| classifier.classify(outcome), operation)
            .await
    }

    /// Async dual of [`execute_classified`](RetryPolicy::execute_classified).
    pub async fn execute_classified_async<T, E, F, Fut>(
        &self,
        classifier: &OutcomeClassifier<T, E>,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_async(|outcome| classifier.classify(outcome), operation)
            .await
    }

    /// Async dual of [`execute_with`](RetryPolicy::execute_with).
    pub async fn execute_with_async<T, E, D, F, Fut>(
        &self,
        should_retry: D,
        mut operation: F,
    ) -> Result<T, E>
    where
        D: Fn(&Result<T, E>) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = operation().await;
            match self.next_delay(&should_retry, &outcome, attempt) {
                None => return outcome,
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Decide whether to retry after `attempt` and with what delay.
    fn next_delay<T, E, D>(
        &self,
        should_retry: &D,
        outcome: &Result<T, E>,
        attempt: u32,
    ) -> Option<Duration>
    where
        D: Fn(&Result<T, E>) -> bool,
    {
        if attempt >= self.config.max_retries {
            if attempt > 0 && outcome.is_err() {
                warn!(
                    attempts = attempt + 1,
                    max_retries = self.config.max_retries,
                    "Operation failed after all retries"
                );
            }
            return None;
        }

        if !should_retry(outcome) {
            return None;
        }

        let delay = self.backoff_delay(attempt);
        debug!(
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Retrying operation after backoff"
        );
        Some(delay)
    }

    /// Backoff delay for a given zero-based attempt index.
    ///
    /// `min(base_delay * backoff_factor^attempt, max_delay)`, widened by up
    /// to 25% uniform jitter when enabled, never exceeding `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_secs_f64();
        let max = self.config.max_delay.as_secs_f64();
        let capped = (base * self.config.backoff_factor.powi(attempt as i32)).min(max);

        let final_secs = if self.config.jitter {
            (capped * (1.0 + rand::random::<f64>() * 0.25)).min(max)
        } else {
            capped
        };

        Duration::from_secs_f64(final_secs)
    }

    /// The retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
