use crate::clock::{Clock, SystemClock};
use crate::error::LimiterError;
use crate::rate_limit::bucket::{BucketState, RateLimitPolicy};
use crate::rate_limit::store::{BucketStore, InMemoryBucketStore};
use crate::rate_limit::{Decision, FailureMode};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Upper bound on compare-and-swap retries for one key before giving up.
pub const MAX_CAS_ATTEMPTS: usize = 64;

/// Limiter settings.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub(crate) default_policy: RateLimitPolicy,
    pub(crate) failure_mode: FailureMode,
    pub(crate) idle_ttl: Duration,
}

impl LimiterConfig {
    pub fn new(default_policy: RateLimitPolicy) -> Self {
        Self { default_policy, failure_mode: FailureMode::Open, idle_ttl: Duration::from_secs(3600) }
    }

    /// Builder-style: behaviour when the store cannot be reached
    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Builder-style: how long a key may stay idle before its bucket is discarded
    pub fn idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Consume(f64),
    Drain(f64),
}

/// Per-key token-bucket limiter over a [`BucketStore`].
///
/// Updates for one key are serialized within the process by a per-key async lock, and against
/// other writers of a shared store by a compare-and-swap loop: each attempt reads the bucket,
/// applies the pure transition, and writes back only if nobody else wrote in between. Two
/// concurrent consumes can therefore never both spend the same tokens.
///
/// A consume that still loses [`MAX_CAS_ATTEMPTS`] races in a row is denied regardless of
/// [`FailureMode`]; it never admits without spending.
#[derive(Debug)]
pub struct RateLimiter<S = InMemoryBucketStore, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: LimiterConfig,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RateLimiter<InMemoryBucketStore, SystemClock> {
    /// Process-local limiter on the wall clock.
    pub fn in_memory(config: LimiterConfig) -> Self {
        Self::new(InMemoryBucketStore::new(), SystemClock, config)
    }
}

impl<S, C> RateLimiter<S, C>
where
    S: BucketStore,
    C: Clock,
{
    pub fn new(store: S, clock: C, config: LimiterConfig) -> Self {
        Self { store: Arc::new(store), clock, config, key_locks: DashMap::new() }
    }

    pub fn default_policy(&self) -> RateLimitPolicy {
        self.config.default_policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Admit `cost` against `key` under the default policy.
    pub async fn check_and_consume(&self, key: &str, cost: f64) -> Result<Decision, LimiterError> {
        self.consume_with(key, self.config.default_policy, cost).await
    }

    /// Admit `cost` against `key` under `policy`.
    ///
    /// If the stored bucket was created under a different policy it is switched first (tokens
    /// clamped to the new capacity, refill clock restarted). A denied request leaves the bucket
    /// untouched. Store failures resolve through the configured [`FailureMode`]; contention is
    /// always a denial.
    pub async fn consume_with(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        cost: f64,
    ) -> Result<Decision, LimiterError> {
        validate_cost(cost)?;
        match self.update(key, policy, Op::Consume(cost)).await {
            Ok((state, allowed)) => {
                if !allowed {
                    tracing::debug!(
                        key,
                        cost,
                        remaining = state.tokens(),
                        retry_after = state.time_to_reset(),
                        "rate limit denied"
                    );
                }
                Ok(Decision::from_state(&state, allowed))
            }
            Err(err @ LimiterError::Contention { .. }) => {
                tracing::warn!(key, error = %err, "rate limit bucket contended; denying");
                Ok(Decision::degraded(policy, FailureMode::Closed, err.to_string()))
            }
            Err(err) => Ok(self.degraded(key, policy, err)),
        }
    }

    /// Report whether `cost` would be admitted without taking any tokens.
    pub async fn peek(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        cost: f64,
    ) -> Result<Decision, LimiterError> {
        validate_cost(cost)?;
        let now = self.clock.now_millis();
        match self.store.load(key).await {
            Ok(loaded) => {
                let current = self.resolve(loaded.map(|v| v.state), policy, now);
                let (state, allowed) = current.peek(cost, now);
                Ok(Decision::from_state(&state, allowed))
            }
            Err(err) => Ok(self.degraded(key, policy, err.into())),
        }
    }

    /// Charge `cost` after the fact, e.g. once a provider reported what a call actually cost.
    ///
    /// The charge is unconditional and clamps at zero; the returned decision is always allowed.
    pub async fn record_usage(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        cost: f64,
    ) -> Result<Decision, LimiterError> {
        validate_cost(cost)?;
        let (state, _) = self.update(key, policy, Op::Drain(cost)).await?;
        Ok(Decision::from_state(&state, true))
    }

    /// Discard buckets idle for longer than the configured TTL.
    pub async fn evict_idle(&self) -> Result<usize, LimiterError> {
        let ttl_ms = i64::try_from(self.config.idle_ttl.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.clock.now_millis().saturating_sub(ttl_ms);
        let evicted = self.store.evict_idle(cutoff).await?;
        self.key_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle rate limit buckets");
        }
        Ok(evicted)
    }

    fn resolve(&self, stored: Option<BucketState>, policy: RateLimitPolicy, now: i64) -> BucketState {
        match stored {
            Some(state) if state.policy() != policy => state.apply_policy(policy, now),
            Some(state) => state,
            None => BucketState::new(policy, now),
        }
    }

    async fn update(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        op: Op,
    ) -> Result<(BucketState, bool), LimiterError> {
        let lock = self.key_locks.entry(key.to_owned()).or_default().clone();
        let _held = lock.lock().await;
        for _ in 0..MAX_CAS_ATTEMPTS {
            let now = self.clock.now_millis();
            let loaded = self.store.load(key).await?;
            let current = self.resolve(loaded.map(|v| v.state), policy, now);
            let (next, allowed) = match op {
                Op::Consume(cost) => current.consume(cost, now),
                Op::Drain(cost) => (current.drain(cost, now), true),
            };
            if loaded.map(|v| v.state) == Some(next) {
                return Ok((next, allowed));
            }
            let expected = loaded.map(|v| v.version);
            if self.store.compare_and_swap(key, expected, next).await? {
                return Ok((next, allowed));
            }
            tokio::task::yield_now().await;
        }
        Err(LimiterError::Contention { attempts: MAX_CAS_ATTEMPTS })
    }

    fn degraded(&self, key: &str, policy: RateLimitPolicy, err: LimiterError) -> Decision {
        let mode = self.config.failure_mode;
        tracing::error!(key, error = %err, failure_mode = ?mode, "rate limiter unavailable");
        Decision::degraded(policy, mode, err.to_string())
    }
}

impl<S, C> RateLimiter<S, C>
where
    S: BucketStore + 'static,
    C: Clock + 'static,
{
    /// Run [`RateLimiter::evict_idle`] every `interval` on a background task.
    pub fn spawn_eviction(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.evict_idle().await {
                    tracing::warn!(error = %err, "idle bucket eviction failed");
                }
            }
        })
    }
}

fn validate_cost(cost: f64) -> Result<(), LimiterError> {
    if cost.is_finite() && cost >= 0.0 {
        Ok(())
    } else {
        Err(LimiterError::InvalidCost(cost))
    }
}
