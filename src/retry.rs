//! Bounded retry for single-backend delivery.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries), default 3.
//! - Attempts are separated by a fixed delay. There is no backoff curve.
//! - Every failed attempt is logged with its attempt number. Only the last failure is surfaced,
//!   as [`DeliveryError::TransportFailure`].
//! - The sleeper controls how the delay is applied (production uses `TokioSleeper`; tests inject
//!   `InstantSleeper`/`TrackingSleeper`).
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use tollgate::{InstantSleeper, RetryPolicy};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .delay(Duration::from_millis(50))
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let outcome = policy.deliver("queue", |_attempt| async { Err::<(), _>("broker unavailable") }).await;
//! assert!(outcome.is_err());
//! # });
//! ```

use crate::error::{DeliveryError, DeliveryOutcome};
use crate::{Sleeper, TokioSleeper};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Fixed-delay retry policy shared by every transport.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

impl RetryPolicy {
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `attempt` until it succeeds or the budget is spent.
    ///
    /// The closure receives the 1-indexed attempt number. `transport` names the backend in logs.
    pub async fn deliver<E, Fut, Op>(&self, transport: &str, mut attempt: Op) -> DeliveryOutcome
    where
        E: Display + Send,
        Fut: Future<Output = Result<(), E>> + Send,
        Op: FnMut(usize) -> Fut + Send,
    {
        let mut last_error = String::new();
        for n in 1..=self.max_attempts {
            match attempt(n).await {
                Ok(()) => {
                    if n > 1 {
                        tracing::debug!(transport, attempt = n, "delivery succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        transport,
                        attempt = n,
                        max_attempts = self.max_attempts,
                        error = %last_error,
                        "delivery attempt failed"
                    );
                    if n < self.max_attempts {
                        self.sleeper.sleep(self.delay).await;
                    }
                }
            }
        }
        tracing::error!(
            transport,
            attempts = self.max_attempts,
            error = %last_error,
            "delivery failed after exhausting retries"
        );
        Err(DeliveryError::TransportFailure(last_error))
    }
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
}

/// Builder for `RetryPolicy`.
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Create a builder with sane defaults.
    pub fn new() -> Self {
        Self { policy: RetryPolicy::default() }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Set the fixed pause between attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.policy.delay = delay;
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.policy.sleeper = Arc::new(sleeper);
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.policy.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(self.policy)
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstantSleeper, TrackingSleeper};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(attempts: usize) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(attempts)
            .delay(Duration::from_millis(25))
            .with_sleeper(InstantSleeper)
            .build()
            .expect("builder")
    }

    #[tokio::test]
    async fn success_first_attempt() {
        let counter = AtomicUsize::new(0);
        let outcome = policy(3)
            .deliver("test", |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(()) }
            })
            .await;
        assert!(outcome.is_ok());
        assert_eq!(counter.load(Ordering::SeqCst), 1, "Should only execute once");
    }

    #[tokio::test]
    async fn success_after_retries() {
        let outcome = policy(3)
            .deliver("test", |n| async move {
                if n < 3 {
                    Err(format!("attempt {n}"))
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_failure() {
        let counter = AtomicUsize::new(0);
        let outcome = policy(3)
            .deliver("test", |n| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(format!("attempt {n}")) }
            })
            .await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(outcome, Err(DeliveryError::TransportFailure("attempt 3".into())));
    }

    #[tokio::test]
    async fn fixed_delay_between_attempts_only() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .delay(Duration::from_millis(40))
            .with_sleeper(sleeper.clone())
            .build()
            .unwrap();
        let _ = policy.deliver("test", |_| async { Err::<(), _>("nope") }).await;
        assert_eq!(sleeper.calls(), vec![Duration::from_millis(40); 2]);
    }

    #[test]
    fn zero_attempts_rejected() {
        assert_eq!(
            RetryPolicy::builder().max_attempts(0).build().unwrap_err(),
            BuildError::InvalidMaxAttempts(0)
        );
    }

    #[test]
    fn defaults_are_three_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), DEFAULT_RETRY_DELAY);
    }
}
