//! NATS stream transport for `tollgate` (optional companion crate).
//!
//! [`StreamTransport`] publishes each event's JSON body to a subject. Default builds carry no
//! client; enable the `client` feature for the `nats`-backed [`NatsPublisher`].
//!
//! ```toml
//! tollgate-nats = { version = "0.1", features = ["client"] }
//! ```

use async_trait::async_trait;
use std::fmt::{Debug, Display};
use tollgate::transport::PriorityFlag;
use tollgate::{DeliveryOutcome, LogEvent, MessageTransport, Priority, RetryPolicy};

/// Subject-based publisher.
#[async_trait]
pub trait Publisher: Send + Sync + Debug {
    type Error: Display + Send;

    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Debug)]
pub struct StreamTransport<P> {
    publisher: P,
    subject: String,
    low_priority_subject: Option<String>,
    priority: PriorityFlag,
    retry: RetryPolicy,
}

impl<P: Publisher> StreamTransport<P> {
    pub fn new(publisher: P, subject: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            publisher,
            subject: subject.into(),
            low_priority_subject: None,
            priority: PriorityFlag::default(),
            retry,
        }
    }

    pub fn with_low_priority_subject(mut self, subject: impl Into<String>) -> Self {
        self.low_priority_subject = Some(subject.into());
        self
    }

    pub fn subject(&self) -> &str {
        match (self.priority.get(), &self.low_priority_subject) {
            (Priority::Lower, Some(low)) => low,
            _ => &self.subject,
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

#[async_trait]
impl<P: Publisher> MessageTransport for StreamTransport<P> {
    fn name(&self) -> &str {
        "nats"
    }

    async fn send(&self, event: &LogEvent) -> DeliveryOutcome {
        let payload = event.to_json()?;
        let subject = self.subject();
        self.retry.deliver(self.name(), |_| self.publisher.publish(subject, &payload)).await
    }

    fn set_lower_priority(&self) {
        self.priority.lower();
    }
}

#[cfg(feature = "client")]
pub use client::NatsPublisher;

#[cfg(feature = "client")]
mod client {
    use super::Publisher;
    use async_trait::async_trait;
    use tollgate::{ConfigError, QueueEndpoint};

    #[derive(Clone, Debug)]
    pub struct NatsPublisher {
        connection: nats::asynk::Connection,
    }

    impl NatsPublisher {
        pub fn new(connection: nats::asynk::Connection) -> Self {
            Self { connection }
        }

        /// Connect to `endpoint.url`, with user/password auth when both are set.
        pub async fn connect(endpoint: &QueueEndpoint) -> Result<Self, ConfigError> {
            let options = match (&endpoint.username, &endpoint.password) {
                (Some(user), Some(password)) => {
                    nats::asynk::Options::with_user_pass(user, password)
                }
                _ => nats::asynk::Options::new(),
            };
            let connection = options
                .connect(endpoint.url.as_str())
                .await
                .map_err(|e| ConfigError::backend("nats", e))?;
            Ok(Self::new(connection))
        }
    }

    #[async_trait]
    impl Publisher for NatsPublisher {
        type Error = std::io::Error;

        async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), std::io::Error> {
            self.connection.publish(subject, payload).await
        }
    }
}
