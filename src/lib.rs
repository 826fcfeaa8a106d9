//! Resilience Control Layer
//!
//! Composable protection mechanisms for calls to remote HTTP services.
//!
//! # Features
//!
//! - **Circuit Breaker**: Three-state breaker that fails fast while a
//!   downstream dependency is unhealthy
//! - **Retry**: Exponential backoff with a cap and optional jitter
//! - **Rate Limiter**: Windowed burst pacing that delays rather than rejects
//! - **Bulkhead**: Concurrency cap with a bounded wait for a slot
//! - **Dual Execution Models**: Every component has threaded and
//!   cooperative entry points with identical semantics
//!
//! Components compose outermost to innermost:
//! CircuitBreaker -> RetryPolicy -> RateLimiter -> Bulkhead -> operation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use http_resilience::{ResilienceConfig, ResilienceError, ResilienceLayer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let layer = ResilienceLayer::new(ResilienceConfig::default());
//!
//!     let result: Result<u16, ResilienceError<std::io::Error>> = layer
//!         .execute_async(|| async {
//!             // call the remote service here
//!             Ok(200)
//!         })
//!         .await;
//!
//!     match result {
//!         Ok(status) => println!("status {status}"),
//!         Err(err) if err.is_rejection() => println!("shed: {err}"),
//!         Err(err) => println!("failed: {err}"),
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod bulkhead;
pub mod circuit_breaker;
pub mod classify;
pub mod error;
pub mod layer;
pub mod rate_limiter;
pub mod retry;

pub use bulkhead::{AsyncBulkhead, Bulkhead, BulkheadConfig};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use classify::OutcomeClassifier;
pub use error::ResilienceError;
pub use layer::{ResilienceConfig, ResilienceLayer};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{RetryConfig, RetryPolicy};

/// Result type alias for protected operations.
pub type Result<T, E> = std::result::Result<T, ResilienceError<E>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _ = std::any::type_name::<ResilienceLayer>();
        let _ = std::any::type_name::<CircuitBreaker>();
        let _ = std::any::type_name::<RetryPolicy>();
        let _ = std::any::type_name::<RateLimiter>();
        let _ = std::any::type_name::<Bulkhead>();
        let _ = std::any::type_name::<ResilienceError<std::io::Error>>();
    }
}
