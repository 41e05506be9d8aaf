//! Token-bucket state and its pure transitions.
//!
//! Refill is lazy: tokens are recomputed from elapsed wall time whenever the bucket is read or
//! written, so idle buckets cost nothing. Every function here is total over validated inputs
//! and performs no I/O; concurrency is the caller's concern (see [`super::RateLimiter`]).
//!
//! Invariants:
//! - `0 <= tokens <= capacity` after every transition.
//! - A clock that moves backwards never grants tokens.
//! - A denied consume leaves `tokens` exactly as refill left it.

use crate::error::PolicyError;

/// Capacity and refill window for one rate-limit key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    capacity: f64,
    window_seconds: i64,
}

impl RateLimitPolicy {
    /// Validate and build a policy. `capacity` must be finite and `>= 0`; `window_seconds` must
    /// be `>= 1`.
    pub fn new(capacity: f64, window_seconds: i64) -> Result<Self, PolicyError> {
        if !capacity.is_finite() || capacity < 0.0 {
            return Err(PolicyError::InvalidCapacity(capacity));
        }
        if window_seconds < 1 {
            return Err(PolicyError::InvalidWindow(window_seconds));
        }
        Ok(Self { capacity, window_seconds })
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn window_seconds(&self) -> i64 {
        self.window_seconds
    }

    /// Tokens replenished per second.
    pub fn refill_rate(&self) -> f64 {
        self.capacity / self.window_seconds as f64
    }
}

impl std::fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{};w={}", self.capacity, self.window_seconds)
    }
}

/// Per-key bucket state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub(crate) tokens: f64,
    pub(crate) last_refill_at_ms: i64,
    pub(crate) capacity: f64,
    pub(crate) window_seconds: i64,
}

impl BucketState {
    /// A cold bucket starts full.
    pub fn new(policy: RateLimitPolicy, now_ms: i64) -> Self {
        Self {
            tokens: policy.capacity,
            last_refill_at_ms: now_ms,
            capacity: policy.capacity,
            window_seconds: policy.window_seconds,
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill_at_ms(&self) -> i64 {
        self.last_refill_at_ms
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn window_seconds(&self) -> i64 {
        self.window_seconds
    }

    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy { capacity: self.capacity, window_seconds: self.window_seconds }
    }

    /// Seconds needed to regenerate `tokens` at this bucket's rate.
    fn seconds_to_regenerate(&self, tokens: f64) -> f64 {
        tokens * self.window_seconds as f64 / self.capacity
    }

    /// Add tokens for the time elapsed since the last refill.
    ///
    /// `now_ms <= last_refill_at_ms` (same instant or clock regression) returns the state
    /// unchanged.
    pub fn refill(&self, now_ms: i64) -> Self {
        if now_ms <= self.last_refill_at_ms {
            return *self;
        }
        let elapsed_secs = (now_ms - self.last_refill_at_ms) as f64 / 1000.0;
        let added = elapsed_secs * self.capacity / self.window_seconds as f64;
        Self {
            tokens: (self.tokens + added).min(self.capacity),
            last_refill_at_ms: now_ms,
            ..*self
        }
    }

    /// Refill, then take `cost` tokens if they are all available.
    ///
    /// Returns the new state and whether the request was admitted. `cost` must be finite and
    /// non-negative; zero cost is always admitted and leaves the state untouched.
    pub fn consume(&self, cost: f64, now_ms: i64) -> (Self, bool) {
        debug_assert!(cost.is_finite() && cost >= 0.0, "cost validated by caller");
        if cost == 0.0 {
            return (*self, true);
        }
        let refilled = self.refill(now_ms);
        if refilled.tokens >= cost {
            (Self { tokens: (refilled.tokens - cost).max(0.0), ..refilled }, true)
        } else {
            (refilled, false)
        }
    }

    /// Refill, then report whether `cost` would be admitted, without taking tokens.
    pub fn peek(&self, cost: f64, now_ms: i64) -> (Self, bool) {
        let refilled = self.refill(now_ms);
        let allowed = cost == 0.0 || refilled.tokens >= cost;
        (refilled, allowed)
    }

    /// Refill, then drain `cost` unconditionally, clamping at zero.
    ///
    /// Used to record usage whose cost was only known after the call completed.
    pub fn drain(&self, cost: f64, now_ms: i64) -> Self {
        let refilled = self.refill(now_ms);
        Self { tokens: (refilled.tokens - cost).max(0.0), ..refilled }
    }

    /// Switch to a new policy.
    ///
    /// Tokens are clamped to the new capacity (never topped up) and the refill clock restarts at
    /// `now_ms`, so no refill is computed across the policy boundary. A `now_ms` behind the stored
    /// refill time keeps the stored time.
    pub fn apply_policy(&self, policy: RateLimitPolicy, now_ms: i64) -> Self {
        Self {
            tokens: self.tokens.min(policy.capacity),
            last_refill_at_ms: now_ms.max(self.last_refill_at_ms),
            capacity: policy.capacity,
            window_seconds: policy.window_seconds,
        }
    }

    /// Whole seconds until the bucket is full again; `0` if it already is.
    pub fn time_to_reset(&self) -> i64 {
        let missing = self.capacity - self.tokens;
        if missing <= 0.0 || self.capacity <= 0.0 {
            return 0;
        }
        self.seconds_to_regenerate(missing).ceil() as i64
    }
}
