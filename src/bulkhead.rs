//! Bulkhead concurrency limiter.
//!
//! A bulkhead isolates resource usage by bounding the number of in-flight
//! invocations of one operation category. Capacity is a counting permit
//! pool; a caller that cannot obtain a permit within the acquire timeout is
//! rejected without the operation ever being invoked.
//!
//! [`Bulkhead`] serves OS threads with a blocking semaphore;
//! [`AsyncBulkhead`] serves tokio tasks with a cooperative one. Permits are
//! held by RAII guards, so they are released on every exit path: success,
//! failure, panic, or task cancellation.

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::ResilienceError;

/// Bulkhead configuration.
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Whether the bulkhead is active.
    pub enabled: bool,
    /// Maximum concurrent in-flight invocations. `None` or `0` means
    /// unbounded; a zero capacity never silently blocks every caller.
    pub max_concurrent: Option<u32>,
    /// How long a caller may wait for a permit. Zero means a non-blocking
    /// try-acquire in both execution models.
    pub acquire_timeout: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_concurrent: None,
            acquire_timeout: Duration::ZERO,
        }
    }
}

impl BulkheadConfig {
    /// Create an enabled configuration with the given capacity.
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            enabled: true,
            max_concurrent: Some(max_concurrent),
            acquire_timeout: Duration::ZERO,
        }
    }

    /// Set the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// The permit pool size, or `None` when the bulkhead places no bound
    /// (disabled, unset, or zero capacity).
    pub fn effective_limit(&self) -> Option<u32> {
        if !self.enabled {
            return None;
        }
        match self.max_concurrent {
            Some(n) if n > 0 => Some(n),
            _ => None,
        }
    }
}

/// Counting semaphore for the threaded execution model.
#[derive(Debug)]
struct SyncSemaphore {
    permits: Mutex<u32>,
    available: Condvar,
}

impl SyncSemaphore {
    fn new(permits: u32) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits > 0 {
            *permits -= 1;
            true
        } else {
            false
        }
    }

    fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut permits = self.permits.lock();
        loop {
            if *permits > 0 {
                *permits -= 1;
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            if self.available.wait_for(&mut permits, remaining).timed_out() {
                if *permits > 0 {
                    *permits -= 1;
                    return true;
                }
                return false;
            }
        }
    }

    fn release(&self) {
        *self.permits.lock() += 1;
        self.available.notify_one();
    }

    fn available(&self) -> u32 {
        *self.permits.lock()
    }
}

/// RAII guard returning a sync permit on drop.
struct SyncPermit<'a>(&'a SyncSemaphore);

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Bulkhead for the threaded execution model.
#[derive(Debug)]
pub struct Bulkhead {
    config: BulkheadConfig,
    permits: Option<SyncSemaphore>,
}

impl Bulkhead {
    /// Create a new bulkhead with the given configuration.
    pub fn new(config: BulkheadConfig) -> Self {
        let permits = config.effective_limit().map(SyncSemaphore::new);
        Self { config, permits }
    }

    /// Invoke an operation within capacity, blocking up to the acquire
    /// timeout for a permit.
    pub fn run<T, E, F>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let Some(sem) = &self.permits else {
            return operation().map_err(ResilienceError::Operation);
        };

        let acquired = if self.config.acquire_timeout.is_zero() {
            sem.try_acquire()
        } else {
            sem.acquire_timeout(self.config.acquire_timeout)
        };
        if !acquired {
            warn!(
                timeout_ms = self.config.acquire_timeout.as_millis() as u64,
                "Bulkhead capacity reached, rejecting call"
            );
            return Err(ResilienceError::BulkheadRejected {
                timeout: self.config.acquire_timeout,
            });
        }

        let _permit = SyncPermit(sem);
        operation().map_err(ResilienceError::Operation)
    }

    /// Free permits, or `None` when unbounded.
    pub fn available_permits(&self) -> Option<u32> {
        self.permits.as_ref().map(SyncSemaphore::available)
    }

    /// The bulkhead configuration.
    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }
}

/// Bulkhead for the cooperative execution model.
#[derive(Debug)]
pub struct AsyncBulkhead {
    config: BulkheadConfig,
    permits: Option<Semaphore>,
}

impl AsyncBulkhead {
    /// Create a new bulkhead with the given configuration.
    pub fn new(config: BulkheadConfig) -> Self {
        let permits = config
            .effective_limit()
            .map(|n| Semaphore::new(n as usize));
        Self { config, permits }
    }

    /// Invoke an operation within capacity, waiting cooperatively up to the
    /// acquire timeout for a permit.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(sem) = &self.permits else {
            return operation().await.map_err(ResilienceError::Operation);
        };

        let permit = if self.config.acquire_timeout.is_zero() {
            sem.try_acquire().ok()
        } else {
            match tokio::time::timeout(self.config.acquire_timeout, sem.acquire()).await {
                Ok(acquired) => acquired.ok(),
                Err(_) => None,
            }
        };
        let Some(_permit) = permit else {
            warn!(
                timeout_ms = self.config.acquire_timeout.as_millis() as u64,
                "Bulkhead capacity reached, rejecting call"
            );
            return Err(ResilienceError::BulkheadRejected {
                timeout: self.config.acquire_timeout,
            });
        };

        operation().await.map_err(ResilienceError::Operation)
    }

    /// Free permits, or `None` when unbounded.
    pub fn available_permits(&self) -> Option<usize> {
        self.permits.as_ref().map(Semaphore::available_permits)
    }

    /// The bulkhead configuration.
    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_disabled_is_pass_through() {
        let bulkhead = Bulkhead::new(BulkheadConfig::default());
        let result: Result<u16, ResilienceError<&str>> = bulkhead.run(|| Ok(200));
        assert_eq!(result.unwrap(), 200);
        assert!(bulkhead.available_permits().is_none());
    }

    #[test]
    fn test_zero_capacity_means_unbounded() {
        let config = BulkheadConfig::new(0);
        assert!(config.effective_limit().is_none());

        let bulkhead = Bulkhead::new(config);
        let result: Result<u16, ResilienceError<&str>> = bulkhead.run(|| Ok(200));
        assert!(result.is_ok());
    }

    #[test]
    fn test_permit_released_after_success_and_failure() {
        let bulkhead = Bulkhead::new(BulkheadConfig::new(1));

        let _: Result<(), ResilienceError<&str>> = bulkhead.run(|| Ok(()));
        assert_eq!(bulkhead.available_permits(), Some(1));

        let _: Result<(), ResilienceError<&str>> = bulkhead.run(|| Err("boom"));
        assert_eq!(bulkhead.available_permits(), Some(1));
    }

    #[test]
    fn test_concurrent_threads_bounded_with_one_rejection() {
        let bulkhead = Arc::new(Bulkhead::new(BulkheadConfig::new(2)));
        let running = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));
        let rejected = Arc::new(AtomicU32::new(0));
        let gate = Arc::new(Barrier::new(2));

        // Two holders occupy both permits, then a third call is rejected
        // non-blockingly.
        let mut handles = Vec::new();
        for _ in 0..2 {
            let bulkhead = bulkhead.clone();
            let running = running.clone();
            let peak = peak.clone();
            let gate = gate.clone();
            handles.push(std::thread::spawn(move || {
                let _: Result<(), ResilienceError<&str>> = bulkhead.run(|| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    gate.wait();
                    std::thread::sleep(Duration::from_millis(50));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                });
            }));
        }

        // Wait until both holders are inside.
        while running.load(Ordering::SeqCst) < 2 {
            std::thread::yield_now();
        }

        let result: Result<(), ResilienceError<&str>> = bulkhead.run(|| Ok(()));
        if matches!(result, Err(ResilienceError::BulkheadRejected { .. })) {
            rejected.fetch_add(1, Ordering::SeqCst);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(rejected.load(Ordering::SeqCst), 1);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(bulkhead.available_permits(), Some(2));
    }

    #[test]
    fn test_acquire_timeout_waits_for_freed_permit() {
        let bulkhead = Arc::new(Bulkhead::new(
            BulkheadConfig::new(1).with_acquire_timeout(Duration::from_millis(500)),
        ));

        let holder = {
            let bulkhead = bulkhead.clone();
            std::thread::spawn(move || {
                let _: Result<(), ResilienceError<&str>> = bulkhead.run(|| {
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(())
                });
            })
        };

        std::thread::sleep(Duration::from_millis(10));
        let result: Result<u16, ResilienceError<&str>> = bulkhead.run(|| Ok(200));
        assert_eq!(result.unwrap(), 200);
        holder.join().unwrap();
    }

    #[test]
    fn test_timeout_elapses_without_permit() {
        let bulkhead = Arc::new(Bulkhead::new(
            BulkheadConfig::new(1).with_acquire_timeout(Duration::from_millis(30)),
        ));

        let holder = {
            let bulkhead = bulkhead.clone();
            std::thread::spawn(move || {
                let _: Result<(), ResilienceError<&str>> = bulkhead.run(|| {
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(())
                });
            })
        };

        std::thread::sleep(Duration::from_millis(10));
        let start = Instant::now();
        let result: Result<(), ResilienceError<&str>> = bulkhead.run(|| Ok(()));
        assert!(matches!(result, Err(ResilienceError::BulkheadRejected { .. })));
        assert!(start.elapsed() >= Duration::from_millis(25));
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn test_async_bounded_with_one_rejection() {
        let bulkhead = Arc::new(AsyncBulkhead::new(BulkheadConfig::new(2)));
        let running = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut holders = Vec::new();
        for _ in 0..2 {
            let bulkhead = bulkhead.clone();
            let running = running.clone();
            let peak = peak.clone();
            holders.push(tokio::spawn(async move {
                let _: Result<(), ResilienceError<&str>> = bulkhead
                    .run(|| async {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await;
            }));
        }

        // Let both holders occupy their permits.
        while running.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let invoked = AtomicU32::new(0);
        let result: Result<(), ResilienceError<&str>> = bulkhead
            .run(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::BulkheadRejected { .. })));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert!(peak.load(Ordering::SeqCst) <= 2);

        for holder in holders {
            holder.await.unwrap();
        }
        assert_eq!(bulkhead.available_permits(), Some(2));
    }

    #[tokio::test]
    async fn test_async_cancellation_releases_permit() {
        let bulkhead = Arc::new(AsyncBulkhead::new(BulkheadConfig::new(1)));

        let task = {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move {
                let _: Result<(), ResilienceError<&str>> = bulkhead
                    .run(|| async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    })
                    .await;
            })
        };

        // Let the task take the permit, then cancel it mid-operation.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bulkhead.available_permits(), Some(0));
        task.abort();
        let _ = task.await;

        assert_eq!(bulkhead.available_permits(), Some(1));
        let result: Result<u16, ResilienceError<&str>> =
            bulkhead.run(|| async { Ok(200) }).await;
        assert_eq!(result.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_async_acquire_timeout_waits() {
        let bulkhead = Arc::new(AsyncBulkhead::new(
            BulkheadConfig::new(1).with_acquire_timeout(Duration::from_millis(500)),
        ));

        let holder = {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move {
                let _: Result<(), ResilienceError<&str>> = bulkhead
                    .run(|| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    })
                    .await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let result: Result<u16, ResilienceError<&str>> =
            bulkhead.run(|| async { Ok(200) }).await;
        assert_eq!(result.unwrap(), 200);
        holder.await.unwrap();
    }
}
