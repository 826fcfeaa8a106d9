//! Error types for the resilience layer.
//!
//! The error taxonomy distinguishes two kinds of outcomes: the wrapped
//! operation itself failed, or the protection layer declined to attempt the
//! call at all. Rejections never carry an operation error and are always
//! identifiable by variant, so callers can tell "the breaker refused" apart
//! from "the request failed."

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for protected invocations.
///
/// `E` is the error type of the wrapped operation. Operation errors are
/// propagated unchanged inside [`ResilienceError::Operation`].
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// The circuit breaker is open and the recovery window has not elapsed.
    ///
    /// The operation was never invoked.
    #[error("circuit breaker is open, retry in {retry_after:?}")]
    CircuitOpen {
        /// Time remaining until the breaker will allow a probe call.
        retry_after: Duration,
    },

    /// The bulkhead had no free permit within the acquire timeout.
    ///
    /// The operation was never invoked.
    #[error("bulkhead capacity reached, no permit within {timeout:?}")]
    BulkheadRejected {
        /// The configured acquire timeout that elapsed.
        timeout: Duration,
    },

    /// The wrapped operation failed.
    #[error("operation failed: {0}")]
    Operation(E),
}

impl<E> ResilienceError<E> {
    /// Returns true if this is a fast-fail rejection rather than an
    /// operation failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ResilienceError::CircuitOpen { .. } | ResilienceError::BulkheadRejected { .. }
        )
    }

    /// Returns true if the circuit breaker rejected the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// Returns true if the bulkhead rejected the call.
    pub fn is_bulkhead_rejected(&self) -> bool {
        matches!(self, ResilienceError::BulkheadRejected { .. })
    }

    /// Returns the operation error, if this is one.
    pub fn into_operation(self) -> Option<E> {
        match self {
            ResilienceError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Returns a reference to the operation error, if this is one.
    pub fn as_operation(&self) -> Option<&E> {
        match self {
            ResilienceError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct OpError(&'static str);

    impl std::fmt::Display for OpError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    #[test]
    fn test_rejections_are_distinguishable() {
        let open: ResilienceError<OpError> = ResilienceError::CircuitOpen {
            retry_after: Duration::from_secs(30),
        };
        assert!(open.is_rejection());
        assert!(open.is_circuit_open());
        assert!(!open.is_bulkhead_rejected());

        let rejected: ResilienceError<OpError> = ResilienceError::BulkheadRejected {
            timeout: Duration::ZERO,
        };
        assert!(rejected.is_rejection());
        assert!(rejected.is_bulkhead_rejected());

        let failed = ResilienceError::Operation(OpError("boom"));
        assert!(!failed.is_rejection());
    }

    #[test]
    fn test_into_operation() {
        let failed = ResilienceError::Operation(OpError("boom"));
        assert_eq!(failed.into_operation(), Some(OpError("boom")));

        let open: ResilienceError<OpError> = ResilienceError::CircuitOpen {
            retry_after: Duration::ZERO,
        };
        assert!(open.into_operation().is_none());
    }

    #[test]
    fn test_display() {
        let failed: ResilienceError<OpError> = ResilienceError::Operation(OpError("boom"));
        assert_eq!(failed.to_string(), "operation failed: boom");
    }
}
