// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Fixed-delay bounded retry.
//!
//! Every failed attempt except the last is logged at debug level, reported
//! to the optional observer, and followed by the fixed delay. The error of the
//! final attempt is returned unchanged.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with `(attempt, error)` before each retry. Attempts are 1-based.
pub type RetryObserver = Arc<dyn Fn(u32, &dyn StdError) + Send + Sync>;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bounded retry with a fixed delay.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    observer: Option<RetryObserver>,
}

impl RetryPolicy {
    /// Creates a policy. `0` attempts is treated as `1`.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            observer: None,
        }
    }

    /// Creates a policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Attaches an observer called before each retry.
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns the attempt limit.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `operation` until it succeeds or the attempt limit is reached.
    ///
    /// `operation` is called once per attempt and must produce a fresh future.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt >= self.max_attempts => return Err(error),
                Err(error) => {
                    tracing::debug!(
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %error,
                        "Retrying operation"
                    );
                    if let Some(observer) = &self.observer {
                        observer(attempt, &error);
                    }
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModbusError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_fail_fail_succeed() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let start = Instant::now();

        let result = policy
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ModbusError::not_connected())
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(10));

        let result: Result<(), ModbusError> = policy
            .execute(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(ModbusError::exception(0x03, n as u8))
            })
            .await;

        assert_eq!(result.unwrap_err().exception_code(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_does_not_sleep() {
        let start = Instant::now();
        let calls = AtomicU32::new(0);

        for attempts in [0, 1] {
            let result: Result<(), ModbusError> = RetryPolicy::new(attempts, Duration::from_secs(1))
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ModbusError::not_connected())
                })
                .await;
            assert!(result.is_err());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_each_retry() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let policy = RetryPolicy::new(3, Duration::from_millis(5)).with_observer(Arc::new(
            move |attempt: u32, error: &dyn StdError| sink.lock().push((attempt, error.to_string())),
        ));

        let _: Result<(), ModbusError> = policy
            .execute(|| async { Err(ModbusError::not_connected()) })
            .await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, 1);
        assert_eq!(seen[1].0, 2);
        assert!(seen[0].1.contains("Not connected"));
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_millis(100));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }
}
