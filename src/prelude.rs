//! Convenient re-exports for common Tollgate types.
pub use crate::{
    dispatcher::DualWriteDispatcher,
    error::{AdmissionError, ConfigError, DeliveryError, DeliveryOutcome, LimiterError},
    event::{CredentialKind, LogEvent},
    rate_limit::{
        AdmissionLayer, AdmissionTicket, Decision, FailureMode, LimiterConfig, RateLimitPolicy,
        RateLimiter,
    },
    retry::{BuildError, RetryPolicy},
    router::{DeliveryRouter, Producer, TransportFactory},
    transport::{MessageTransport, Priority},
};
