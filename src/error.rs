//! Error types for admission control and log delivery
//!
//! A rate-limit denial is not an error: it is a [`Decision`](crate::rate_limit::Decision)
//! with `allowed == false`. Everything here is either an operational failure (delivery,
//! store) or a caller/configuration mistake.
use std::time::Duration;

/// Failure of a single delivery backend, surfaced once its retry budget is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The backend rejected or could not accept the event after every attempt.
    #[error("transport failure: {0}")]
    TransportFailure(String),
    /// The event could not be encoded for the wire.
    #[error("failed to serialize log event: {0}")]
    Serialization(String),
}

impl DeliveryError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportFailure(msg.into())
    }

    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result of every transport `send`. Failures are values, never panics.
pub type DeliveryOutcome = Result<(), DeliveryError>;

/// Errors raised by a [`BucketStore`](crate::rate_limit::BucketStore) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bucket store error: {0}")]
pub struct StoreError(pub String);

/// Errors returned by the rate limiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LimiterError {
    /// Negative, NaN or infinite cost. A caller precondition violation.
    #[error("invalid cost {0}: must be finite and non-negative")]
    InvalidCost(f64),
    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Compare-and-swap kept losing races for the same key.
    #[error("bucket update contended after {attempts} attempts")]
    Contention { attempts: usize },
}

/// Invalid policy values or a malformed policy header.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("capacity must be finite and non-negative (got {0})")]
    InvalidCapacity(f64),
    #[error("window must be at least one second (got {0})")]
    InvalidWindow(i64),
    #[error("malformed rate limit policy `{header}`: {reason}")]
    Malformed { header: String, reason: String },
}

/// Missing or invalid startup configuration. Fatal; raised once during initialization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration `{0}`")]
    Missing(String),
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
    #[error("failed to build {backend} transport: {reason}")]
    Backend { backend: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid { key: key.into(), reason: reason.into() }
    }

    pub fn backend(backend: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Backend { backend: backend.into(), reason: reason.to_string() }
    }
}

/// Error produced by [`AdmissionService`](crate::rate_limit::AdmissionService).
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError<E> {
    /// The request was denied; the caller should answer 429 with `Retry-After`.
    #[error("rate limited; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    /// The limiter could not evaluate the request and the failure mode is closed,
    /// or the caller supplied an invalid cost.
    #[error(transparent)]
    Limiter(LimiterError),
    /// The wrapped service failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> AdmissionError<E> {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
