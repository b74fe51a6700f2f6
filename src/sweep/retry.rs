//! Bounded retry policy.
//!
//! Wraps one fallible async operation: invoke it, log the failure with its
//! attempt number, wait the configured delay, and re-invoke, up to a fixed
//! total number of invocations. Exhaustion is an outcome the caller
//! handles, never a panic.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Outcome of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// The operation eventually succeeded.
    Success {
        /// Value the operation produced.
        value: T,
        /// Invocations used, counting the successful one.
        attempts: u32,
    },
    /// Every allowed invocation failed.
    Exhausted {
        /// Invocations made.
        attempts: u32,
        /// Error from the final invocation.
        last_error: anyhow::Error,
    },
}

impl<T> RetryOutcome<T> {
    /// True when the operation eventually succeeded.
    pub fn succeeded(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }
}

/// Bounded-retry configuration.
///
/// `max_attempts` counts total invocations, so a policy of 3 makes at most
/// 3 calls. No delay is taken after the final failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Policy allowing `max_attempts` total invocations with `delay` before
    /// each re-invocation. A limit of zero is clamped to one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Total invocations this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay taken between invocations.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match operation().await {
                Ok(value) => return RetryOutcome::Success { value, attempts },
                Err(e) => {
                    warn!(
                        "Operation '{}' failed (attempt {}/{}): {}",
                        operation_name, attempts, self.max_attempts, e
                    );
                    if attempts >= self.max_attempts {
                        return RetryOutcome::Exhausted {
                            attempts,
                            last_error: e,
                        };
                    }
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let outcome = policy
            .run("flaky op", || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err(anyhow!("transient"))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;

        match outcome {
            RetryOutcome::Success { value, attempts } => {
                assert_eq!(value, 2);
                assert_eq!(attempts, 3);
            }
            RetryOutcome::Exhausted { .. } => panic!("expected recovery within the budget"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_try_success_makes_one_call() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let outcome = policy
            .run("steady op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(outcome.succeeded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_exactly_max_invocations() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = policy
            .run("doomed op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow!("permanent")) }
            })
            .await;

        match outcome {
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.to_string(), "permanent");
            }
            RetryOutcome::Success { .. } => panic!("operation can never succeed"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_budget_still_invokes_once() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        assert_eq!(policy.max_attempts(), 1);

        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = policy
            .run("clamped op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow!("nope")) }
            })
            .await;

        assert!(!outcome.succeeded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
