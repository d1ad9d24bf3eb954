//! Bounded retry for network operations
//!
//! An operation is attempted up to `attempts` times with a fixed pause
//! between attempts. Only faults accepted by the caller's predicate are
//! retried; anything else is returned immediately. When every attempt
//! fails, the error from the final attempt is returned, not the first.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::ScriptError;

/// Default number of attempts (including the first)
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default pause between attempts
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Attempt count and backoff for a retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Fixed pause between consecutive attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// A policy that never retries
    pub fn single() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent.
    pub async fn run<T, E, F, Fut, P>(&self, is_retryable: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && attempt < attempts => {
                    debug!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, e, self.delay
                    );
                    sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `op`, retrying transient network faults
    pub async fn run_transient<T, F, Fut>(&self, op: F) -> Result<T, ScriptError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScriptError>>,
    {
        self.run(ScriptError::is_transient, op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    fn transient(n: u32) -> ScriptError {
        ScriptError::Io(std::io::Error::other(format!("reset #{}", n)))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);

        let result = instant(3)
            .run_transient(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { if n < 3 { Err(transient(n)) } else { Ok(n) } }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = instant(3)
            .run_transient(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Err(transient(n)) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("reset #3"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = instant(3)
            .run_transient(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ScriptError::InvalidData("not a script".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(ScriptError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_single_and_zero_attempts_run_once() {
        for policy in [RetryPolicy::single(), instant(0)] {
            let calls = AtomicU32::new(0);
            let result: Result<(), _> = policy
                .run_transient(|| {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { Err(transient(n)) }
                })
                .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_custom_predicate() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = tokio_test::block_on(instant(5).run(
            |e: &String| e.starts_with("busy"),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    match n {
                        1 => Err("busy".to_string()),
                        _ => Err("fatal".to_string()),
                    }
                }
            },
        ));
        assert_eq!(result.unwrap_err(), "fatal");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
