//! Admission control.
//!
//! This module provides the building blocks for per-key rate limiting:
//! - [`BucketState`]: pure token-bucket transitions (refill, consume, policy change).
//! - [`BucketStore`]: where bucket state lives, with compare-and-swap writes.
//! - [`RateLimiter`]: policy resolution, linearized per-key updates, and response shaping.
//! - [`AdmissionLayer`]: Tower middleware that gates an outbound service on the limiter.
//!
//! # Architecture
//!
//! - **Middleware**: `AdmissionLayer` wraps the provider client. It doesn't know *how* limiting
//!   works, only which key and cost a request carries.
//! - **Logic**: `BucketState` handles the math and never touches I/O.
//! - **Storage**: `BucketStore` handles the state, enabling in-memory or shared backends.

pub mod bucket;
pub mod limiter;
pub mod middleware;
pub mod policy;
pub mod store;

pub use bucket::{BucketState, RateLimitPolicy};
pub use limiter::{LimiterConfig, RateLimiter};
pub use middleware::{AdmissionLayer, AdmissionService, AdmissionTicket};
pub use policy::{CostUnit, PolicyHeader};
pub use store::{BucketStore, InMemoryBucketStore, VersionedBucket};

/// What the limiter does when its store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Admit the request. Preserves availability.
    #[default]
    Open,
    /// Deny the request. Preserves cost control.
    Closed,
}

/// The result of an admission check.
///
/// A denial is a normal outcome, not an error: the caller answers with a 429 and
/// `retry_after_seconds`.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// Tokens left after this check.
    pub remaining: f64,
    /// Bucket capacity.
    pub limit: f64,
    /// Seconds until the bucket is full again.
    pub reset_seconds: i64,
    /// Seconds the caller should wait before retrying; `0` when allowed.
    pub retry_after_seconds: i64,
    pub policy: RateLimitPolicy,
    /// Set when the decision came from the failure mode rather than the bucket.
    pub error: Option<String>,
}

impl Decision {
    pub(crate) fn from_state(state: &BucketState, allowed: bool) -> Self {
        let reset_seconds = state.time_to_reset();
        Self {
            allowed,
            remaining: state.tokens(),
            limit: state.capacity(),
            reset_seconds,
            retry_after_seconds: if allowed { 0 } else { reset_seconds },
            policy: state.policy(),
            error: None,
        }
    }

    pub(crate) fn degraded(policy: RateLimitPolicy, mode: FailureMode, error: String) -> Self {
        let allowed = mode == FailureMode::Open;
        Self {
            allowed,
            remaining: if allowed { policy.capacity() } else { 0.0 },
            limit: policy.capacity(),
            reset_seconds: 0,
            retry_after_seconds: if allowed { 0 } else { 1 },
            policy,
            error: Some(error),
        }
    }

    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// HTTP status the gateway should answer with.
    pub fn status_code(&self) -> u16 {
        if self.allowed {
            200
        } else {
            429
        }
    }

    /// Response headers describing the limit.
    ///
    /// Degraded decisions only carry the policy, since the bucket was never read.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::with_capacity(4);
        if self.error.is_none() {
            headers.push(("RateLimit-Limit", self.limit.to_string()));
            headers.push(("RateLimit-Remaining", self.remaining.floor().to_string()));
        }
        headers.push(("RateLimit-Policy", self.policy.to_string()));
        if self.reset_seconds > 0 {
            headers.push(("RateLimit-Reset", self.reset_seconds.to_string()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_render_limit_remaining_policy_and_reset() {
        let policy = RateLimitPolicy::new(100.0, 3600).unwrap();
        let state = BucketState::new(policy, 0);
        let (state, _) = state.consume(2.5, 0);
        let decision = Decision::from_state(&state, true);

        assert_eq!(
            decision.headers(),
            vec![
                ("RateLimit-Limit", "100".to_string()),
                ("RateLimit-Remaining", "97".to_string()),
                ("RateLimit-Policy", "100;w=3600".to_string()),
                ("RateLimit-Reset", "90".to_string()),
            ]
        );
        assert_eq!(decision.status_code(), 200);
    }

    #[test]
    fn full_bucket_omits_reset_header() {
        let policy = RateLimitPolicy::new(10.0, 60).unwrap();
        let decision = Decision::from_state(&BucketState::new(policy, 0), true);
        assert!(decision.headers().iter().all(|(name, _)| *name != "RateLimit-Reset"));
    }

    #[test]
    fn degraded_decision_only_reports_policy() {
        let policy = RateLimitPolicy::new(10.0, 60).unwrap();
        let decision = Decision::degraded(policy, FailureMode::Closed, "down".into());
        assert!(!decision.is_allowed());
        assert_eq!(decision.headers(), vec![("RateLimit-Policy", "10;w=60".to_string())]);
    }
}
