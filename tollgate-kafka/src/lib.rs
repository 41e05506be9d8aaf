//! Kafka queue transport for `tollgate` (companion crate).
//!
//! [`QueueTransport`] appends each event to a topic, keyed by the event's request id so every
//! record for one request lands in the same partition. Retries follow the shared
//! [`RetryPolicy`]. The producer is abstracted behind [`KeyedLog`]; enable the `client` feature
//! for the `rdkafka`-backed [`KafkaProducer`].
//!
//! ```toml
//! tollgate-kafka = { version = "0.1", features = ["client"] }
//! ```

use async_trait::async_trait;
use std::fmt::{Debug, Display};
use tollgate::transport::PriorityFlag;
use tollgate::{DeliveryOutcome, LogEvent, MessageTransport, Priority, RetryPolicy};

/// Append-only, key-partitioned log.
#[async_trait]
pub trait KeyedLog: Send + Sync + Debug {
    type Error: Display + Send;

    async fn append(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), Self::Error>;
}

/// Durable queue delivery over a [`KeyedLog`].
#[derive(Debug)]
pub struct QueueTransport<L> {
    log: L,
    topic: String,
    low_priority_topic: Option<String>,
    priority: PriorityFlag,
    retry: RetryPolicy,
}

impl<L: KeyedLog> QueueTransport<L> {
    pub fn new(log: L, topic: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            log,
            topic: topic.into(),
            low_priority_topic: None,
            priority: PriorityFlag::default(),
            retry,
        }
    }

    /// Topic used after [`MessageTransport::set_lower_priority`].
    pub fn with_low_priority_topic(mut self, topic: impl Into<String>) -> Self {
        self.low_priority_topic = Some(topic.into());
        self
    }

    /// Topic the next send goes to.
    pub fn destination(&self) -> &str {
        match (self.priority.get(), &self.low_priority_topic) {
            (Priority::Lower, Some(low)) => low,
            _ => &self.topic,
        }
    }

    pub fn log(&self) -> &L {
        &self.log
    }
}

#[async_trait]
impl<L: KeyedLog> MessageTransport for QueueTransport<L> {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn send(&self, event: &LogEvent) -> DeliveryOutcome {
        let payload = event.to_json()?;
        let topic = self.destination();
        let key = event.request_id();
        self.retry.deliver(self.name(), |_| self.log.append(topic, key, &payload)).await
    }

    fn set_lower_priority(&self) {
        if self.low_priority_topic.is_none() {
            tracing::debug!(topic = %self.topic, "no low-priority topic configured; keeping topic");
        }
        self.priority.lower();
    }
}

#[cfg(feature = "client")]
pub use client::KafkaProducer;

#[cfg(feature = "client")]
mod client {
    use super::KeyedLog;
    use async_trait::async_trait;
    use rdkafka::error::KafkaError;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::ClientConfig;
    use std::time::Duration;
    use tollgate::{ConfigError, QueueEndpoint};

    /// `rdkafka` producer shared across concurrent sends.
    #[derive(Clone)]
    pub struct KafkaProducer {
        producer: FutureProducer,
        queue_timeout: Duration,
    }

    impl std::fmt::Debug for KafkaProducer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("KafkaProducer").field("queue_timeout", &self.queue_timeout).finish()
        }
    }

    impl KafkaProducer {
        /// Wrap an existing producer.
        pub fn new(producer: FutureProducer) -> Self {
            Self { producer, queue_timeout: Duration::from_secs(5) }
        }

        /// Build a producer for `endpoint`. Credentials switch the client to SASL/SCRAM over TLS.
        pub fn connect(endpoint: &QueueEndpoint) -> Result<Self, ConfigError> {
            let mut config = ClientConfig::new();
            config.set("bootstrap.servers", &endpoint.url).set("message.timeout.ms", "10000");
            if let (Some(username), Some(password)) = (&endpoint.username, &endpoint.password) {
                config
                    .set("security.protocol", "SASL_SSL")
                    .set("sasl.mechanisms", "SCRAM-SHA-512")
                    .set("sasl.username", username)
                    .set("sasl.password", password);
            }
            let producer = config.create().map_err(|e| ConfigError::backend("kafka", e))?;
            Ok(Self::new(producer))
        }

        pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
            self.queue_timeout = timeout;
            self
        }
    }

    #[async_trait]
    impl KeyedLog for KafkaProducer {
        type Error = KafkaError;

        async fn append(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), KafkaError> {
            let record = FutureRecord::to(topic).key(key).payload(payload);
            self.producer.send(record, self.queue_timeout).await.map(|_| ()).map_err(|(e, _)| e)
        }
    }
}
