//! Composed resilience layer.
//!
//! Wraps one logical operation category with all four protections in the
//! canonical order, outermost to innermost:
//!
//! CircuitBreaker -> RetryPolicy -> RateLimiter -> Bulkhead -> operation
//!
//! The ordering is load-bearing: the breaker records one outcome per outer
//! call, after retries are exhausted, so transient retried failures do not
//! trip it prematurely. Rate limiting and bulkheading apply to every
//! physical attempt, so each retry still respects rate and concurrency
//! bounds. Rejections surfacing from inner components are neither retried
//! nor recorded by the breaker.

use std::future::Future;

use crate::bulkhead::{AsyncBulkhead, Bulkhead, BulkheadConfig};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::classify::OutcomeClassifier;
use crate::error::ResilienceError;
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::retry::{RetryConfig, RetryPolicy};

/// Combined configuration for all four protection mechanisms.
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    /// Circuit breaker configuration.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Rate limiter configuration.
    pub rate_limiter: RateLimiterConfig,
    /// Bulkhead configuration (applied to each execution model).
    pub bulkhead: BulkheadConfig,
}

/// Resilience layer owning one instance of each protection component,
/// shared by all callers of one logical resource.
pub struct ResilienceLayer {
    circuit_breaker: CircuitBreaker,
    retry: RetryPolicy,
    rate_limiter: RateLimiter,
    bulkhead: Bulkhead,
    async_bulkhead: AsyncBulkhead,
}

impl ResilienceLayer {
    /// Create a new resilience layer with the given configuration.
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            circuit_breaker: CircuitBreaker::new(config.circuit_breaker),
            retry: RetryPolicy::new(config.retry),
            rate_limiter: RateLimiter::new(config.rate_limiter),
            bulkhead: Bulkhead::new(config.bulkhead.clone()),
            async_bulkhead: AsyncBulkhead::new(config.bulkhead),
        }
    }

    /// Execute an operation under full protection, treating every `Err` as
    /// a failure.
    pub fn execute<T, E, F>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.execute_classified(&OutcomeClassifier::default(), operation)
    }

    /// Execute an operation under full protection with the given outcome
    /// classifier.
    pub fn execute_classified<T, E, F>(
        &self,
        classifier: &OutcomeClassifier<T, E>,
        mut operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.circuit_breaker
            .admit()
            .map_err(|retry_after| ResilienceError::CircuitOpen { retry_after })?;

        let result = self.retry.execute_with(
            |outcome| Self::attempt_failed(classifier, outcome),
            || {
                self.rate_limiter.acquire();
                self.bulkhead.run(&mut operation)
            },
        );

        self.record_final_outcome(classifier, &result);
        result
    }

    /// Async dual of [`execute`](ResilienceLayer::execute).
    pub async fn execute_async<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_classified_async(&OutcomeClassifier::default(), operation)
            .await
    }

    /// Async dual of
    /// [`execute_classified`](ResilienceLayer::execute_classified).
    pub async fn execute_classified_async<T, E, F, Fut>(
        &self,
        classifier: &OutcomeClassifier<T, E>,
        mut operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.circuit_breaker
            .admit()
            .map_err(|retry_after| ResilienceError::CircuitOpen { retry_after })?;

        let result = self
            .retry
            .execute_with_async(
                |outcome| Self::attempt_failed(classifier, outcome),
                || {
                    let attempt = operation();
                    async move {
                        self.rate_limiter.acquire_async().await;
                        self.async_bulkhead.run(move || attempt).await
                    }
                },
            )
            .await;

        self.record_final_outcome(classifier, &result);
        result
    }

    /// Classify one attempt's outcome; rejections are never retry
    /// candidates.
    fn attempt_failed<T, E>(
        classifier: &OutcomeClassifier<T, E>,
        outcome: &Result<T, ResilienceError<E>>,
    ) -> bool {
        match outcome {
            Ok(value) => classifier.classify_result(value),
            Err(ResilienceError::Operation(error)) => classifier.classify_error(error),
            Err(_) => false,
        }
    }

    /// Feed the final post-retry outcome to the breaker. Rejections record
    /// neither success nor failure.
    fn record_final_outcome<T, E>(
        &self,
        classifier: &OutcomeClassifier<T, E>,
        result: &Result<T, ResilienceError<E>>,
    ) {
        match result {
            Ok(value) => self.circuit_breaker.settle(classifier.classify_result(value)),
            Err(ResilienceError::Operation(error)) => {
                self.circuit_breaker.settle(classifier.classify_error(error))
            }
            Err(_) => {}
        }
    }

    /// The circuit breaker, for administration and introspection.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// The retry policy.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// The bulkhead serving threaded callers.
    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    /// The bulkhead serving async callers.
    pub fn async_bulkhead(&self) -> &AsyncBulkhead {
        &self.async_bulkhead
    }

    /// Reset breaker and rate limiter state.
    pub fn reset(&self) {
        self.circuit_breaker.reset();
        self.rate_limiter.reset();
    }
}

impl std::fmt::Debug for ResilienceLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceLayer")
            .field("circuit_state", &self.circuit_breaker.state())
            .finish_non_exhaustive()
    }
}
