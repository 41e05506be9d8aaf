#![forbid(unsafe_code)]

//! # Tollgate
//!
//! Admission control and durable log delivery for an LLM gateway.
//!
//! ## Features
//!
//! - **Per-key token buckets** with lazy refill, fractional costs, and linearized updates
//! - **Policy headers** (`quota;w=window;u=unit;s=segment`) and `RateLimit-*` response headers
//! - **Tower middleware** that gates a provider client on the limiter
//! - **Pluggable transports** with a shared fixed-delay retry budget
//! - **Dual write** with a best-effort primary and an authoritative secondary
//! - **Fire-and-forget delivery** with a bounded shutdown drain
//!
//! ## Quick Start
//!
//! ```rust
//! use tollgate::{LimiterConfig, RateLimitPolicy, RateLimiter};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RateLimitPolicy::new(100.0, 3600).unwrap();
//! let limiter = RateLimiter::in_memory(LimiterConfig::new(policy));
//!
//! let decision = limiter.check_and_consume("org-1", 1.0).await.unwrap();
//! assert!(decision.is_allowed());
//! assert_eq!(decision.remaining, 99.0);
//! # });
//! ```
//!
//! Delivery is driven by a [`DeliveryRouter`]:
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tollgate::{DeliveryRouter, LogEvent, MemoryTransport, Producer};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let queue = MemoryTransport::new("queue");
//! let router = DeliveryRouter::new(
//!     Producer::Single(Arc::new(queue.clone())),
//!     Arc::new(MemoryTransport::new("http")),
//! );
//!
//! router.record_event(LogEvent::builder("req-1").organization("org-1").build());
//! assert_eq!(router.shutdown(Duration::from_secs(1)).await, 0);
//! assert_eq!(queue.events().len(), 1);
//! # });
//! ```

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod prelude;
pub mod rate_limit;
pub mod retry;
pub mod router;
pub mod sleeper;
pub mod transport;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BackendKind, DeliveryConfig, HttpFallbackConfig, ProducerConfig, QueueEndpoint, QueueMode,
};
pub use dispatcher::DualWriteDispatcher;
pub use error::{
    AdmissionError, ConfigError, DeliveryError, DeliveryOutcome, LimiterError, PolicyError,
    StoreError,
};
pub use event::{CredentialKind, LogEvent, LogEventBuilder};
pub use rate_limit::{
    AdmissionLayer, BucketState, BucketStore, Decision, FailureMode, InMemoryBucketStore,
    LimiterConfig, PolicyHeader, RateLimitPolicy, RateLimiter,
};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use router::{DeliveryRouter, Producer, TransportFactory};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::{MemoryTransport, MessageTransport, Priority, PriorityFlag};
