//! Outcome classification for protected operations.
//!
//! The transport layer knows what a failure looks like (a 5xx status, a
//! timeout error kind); this layer does not. An [`OutcomeClassifier`] carries
//! that knowledge across the seam as a pair of predicates over the
//! operation's result and error types.

use std::sync::Arc;

type ResultPredicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type ErrorPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Classifies operation outcomes as success or failure.
///
/// A classification of "failure" drives both the circuit breaker (the
/// outcome counts against the failure threshold) and the retry policy (the
/// outcome is a retry candidate).
///
/// Defaults when no predicate is configured:
/// - every `Err` is a failure (and therefore retryable);
/// - no `Ok` result is ever a failure.
///
/// # Example
///
/// ```rust
/// use http_resilience::OutcomeClassifier;
///
/// // Treat 5xx status codes as failures, and only timeouts as retryable.
/// let classifier: OutcomeClassifier<u16, std::io::Error> = OutcomeClassifier::new()
///     .with_result_predicate(|status| (500..600).contains(status))
///     .with_error_predicate(|e: &std::io::Error| e.kind() == std::io::ErrorKind::TimedOut);
/// ```
pub struct OutcomeClassifier<T, E> {
    result_predicate: Option<ResultPredicate<T>>,
    error_predicate: Option<ErrorPredicate<E>>,
}

impl<T, E> OutcomeClassifier<T, E> {
    /// Creates a classifier with the default behavior.
    pub fn new() -> Self {
        Self {
            result_predicate: None,
            error_predicate: None,
        }
    }

    /// Sets the predicate applied to `Ok` results; `true` means the result
    /// counts as a failure.
    pub fn with_result_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.result_predicate = Some(Arc::new(predicate));
        self
    }

    /// Sets the predicate applied to `Err` values; `true` means the error
    /// counts as a failure.
    pub fn with_error_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.error_predicate = Some(Arc::new(predicate));
        self
    }

    /// Returns true if an `Ok` result counts as a failure.
    pub fn classify_result(&self, value: &T) -> bool {
        self.result_predicate.as_ref().is_some_and(|p| p(value))
    }

    /// Returns true if an error counts as a failure.
    ///
    /// With no error predicate configured every error is a failure.
    pub fn classify_error(&self, error: &E) -> bool {
        self.error_predicate.as_ref().map_or(true, |p| p(error))
    }

    /// Returns true if the outcome counts as a failure.
    pub fn classify(&self, outcome: &Result<T, E>) -> bool {
        match outcome {
            Ok(value) => self.classify_result(value),
            Err(error) => self.classify_error(error),
        }
    }
}

impl<T, E> Default for OutcomeClassifier<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for OutcomeClassifier<T, E> {
    fn clone(&self) -> Self {
        Self {
            result_predicate: self.result_predicate.clone(),
            error_predicate: self.error_predicate.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for OutcomeClassifier<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeClassifier")
            .field("result_predicate", &self.result_predicate.is_some())
            .field("error_predicate", &self.error_predicate.is_some())
            .finish()
    }
}
