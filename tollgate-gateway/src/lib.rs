//! Environment-configured admission control and log delivery.
//!
//! [`Gateway`] is what a request handler talks to: it checks and consumes rate-limit tokens
//! before a provider call and records the resulting [`LogEvent`] afterwards, without waiting on
//! delivery. Everything is resolved once at startup from `TOLLGATE_*` environment variables.
//!
//! ```no_run
//! use tollgate_gateway::{init_tracing, Gateway};
//!
//! # async fn run() -> Result<(), tollgate::ConfigError> {
//! init_tracing();
//! let gateway = Gateway::from_env().await?;
//!
//! let decision = gateway.check_and_consume("org-1", 1.0).await.expect("valid cost");
//! if !decision.is_allowed() {
//!     // answer 429 with decision.headers()
//! }
//! gateway.shutdown().await;
//! # Ok(()) }
//! ```

pub mod config;
pub mod factory;

pub use config::GatewayConfig;
pub use factory::BackendFactory;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tollgate::{
    BucketStore, Clock, ConfigError, Decision, DeliveryRouter, InMemoryBucketStore, LimiterError,
    LogEvent, RateLimitPolicy, RateLimiter, SystemClock, TransportFactory,
};
use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

/// The limiter and the delivery router behind one handle.
#[derive(Debug)]
pub struct Gateway<S = InMemoryBucketStore, C = SystemClock> {
    limiter: Arc<RateLimiter<S, C>>,
    router: DeliveryRouter,
    drain_timeout: Duration,
    eviction: Option<JoinHandle<()>>,
}

impl Gateway {
    /// Resolve configuration from the environment and connect every backend.
    pub async fn from_env() -> Result<Self, ConfigError> {
        Self::connect(GatewayConfig::from_env()?, &BackendFactory).await
    }

    /// Build from explicit configuration with an in-memory bucket store.
    pub async fn connect(
        config: GatewayConfig,
        factory: &dyn TransportFactory,
    ) -> Result<Self, ConfigError> {
        let router = DeliveryRouter::from_config(&config.delivery, factory).await?;
        let limiter = Arc::new(RateLimiter::in_memory(config.limiter));
        let eviction = limiter.clone().spawn_eviction(config.eviction_interval);
        let mut gateway = Self::new(limiter, router, config.delivery.drain_timeout);
        gateway.eviction = Some(eviction);
        Ok(gateway)
    }
}

impl<S, C> Gateway<S, C>
where
    S: BucketStore + 'static,
    C: Clock + 'static,
{
    pub fn new(
        limiter: Arc<RateLimiter<S, C>>,
        router: DeliveryRouter,
        drain_timeout: Duration,
    ) -> Self {
        Self { limiter, router, drain_timeout, eviction: None }
    }

    pub fn limiter(&self) -> &RateLimiter<S, C> {
        &self.limiter
    }

    pub fn router(&self) -> &DeliveryRouter {
        &self.router
    }

    /// Admit `cost` for `key` under the default policy.
    pub async fn check_and_consume(&self, key: &str, cost: f64) -> Result<Decision, LimiterError> {
        self.limiter.check_and_consume(key, cost).await
    }

    /// Admit `cost` for `key` under a per-request policy.
    pub async fn check_and_consume_with(
        &self,
        key: &str,
        policy: RateLimitPolicy,
        cost: f64,
    ) -> Result<Decision, LimiterError> {
        self.limiter.consume_with(key, policy, cost).await
    }

    /// Hand `event` off for background delivery.
    pub fn record_event(&self, event: LogEvent) {
        self.router.record_event(event);
    }

    pub fn set_lower_priority(&self) {
        self.router.set_lower_priority();
    }

    /// Stop the eviction sweep and drain in-flight deliveries.
    ///
    /// Returns how many deliveries were still running when the drain timeout elapsed.
    pub async fn shutdown(mut self) -> usize {
        if let Some(eviction) = self.eviction.take() {
            eviction.abort();
        }
        self.router.shutdown(self.drain_timeout).await
    }
}

impl<S, C> Drop for Gateway<S, C> {
    fn drop(&mut self) {
        if let Some(eviction) = self.eviction.take() {
            eviction.abort();
        }
    }
}
