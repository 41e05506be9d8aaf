//! Concrete transports for each configured backend.

use async_trait::async_trait;
use std::sync::Arc;
use tollgate::{
    BackendKind, ConfigError, HttpFallbackConfig, MessageTransport, QueueEndpoint, RetryPolicy,
    TransportFactory,
};
use tollgate_http::HttpTransport;

/// Builds Kafka, NATS and HTTP transports from configuration.
///
/// Queue backends need the matching crate feature (`kafka`, `nats`); selecting one that was
/// compiled out is a [`ConfigError`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BackendFactory;

#[async_trait]
impl TransportFactory for BackendFactory {
    async fn queue(
        &self,
        endpoint: &QueueEndpoint,
        retry: &RetryPolicy,
    ) -> Result<Arc<dyn MessageTransport>, ConfigError> {
        match endpoint.backend {
            BackendKind::Kafka => kafka(endpoint, retry),
            BackendKind::Nats => nats(endpoint, retry).await,
        }
    }

    async fn fallback(
        &self,
        config: &HttpFallbackConfig,
        retry: &RetryPolicy,
    ) -> Result<Arc<dyn MessageTransport>, ConfigError> {
        Ok(Arc::new(HttpTransport::new(config, retry.clone())?))
    }
}

#[cfg(feature = "kafka")]
fn kafka(
    endpoint: &QueueEndpoint,
    retry: &RetryPolicy,
) -> Result<Arc<dyn MessageTransport>, ConfigError> {
    use tollgate_kafka::{KafkaProducer, QueueTransport};

    let producer = KafkaProducer::connect(endpoint)?;
    let mut transport = QueueTransport::new(producer, endpoint.topic.clone(), retry.clone());
    if let Some(low) = &endpoint.low_priority_topic {
        transport = transport.with_low_priority_topic(low.clone());
    }
    tracing::info!(url = %endpoint.url, topic = %endpoint.topic, "kafka transport ready");
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "kafka"))]
fn kafka(
    _endpoint: &QueueEndpoint,
    _retry: &RetryPolicy,
) -> Result<Arc<dyn MessageTransport>, ConfigError> {
    Err(ConfigError::backend("kafka", "built without the `kafka` feature"))
}

#[cfg(feature = "nats")]
async fn nats(
    endpoint: &QueueEndpoint,
    retry: &RetryPolicy,
) -> Result<Arc<dyn MessageTransport>, ConfigError> {
    use tollgate_nats::{NatsPublisher, StreamTransport};

    let publisher = NatsPublisher::connect(endpoint).await?;
    let mut transport = StreamTransport::new(publisher, endpoint.topic.clone(), retry.clone());
    if let Some(low) = &endpoint.low_priority_topic {
        transport = transport.with_low_priority_subject(low.clone());
    }
    tracing::info!(url = %endpoint.url, subject = %endpoint.topic, "nats transport ready");
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "nats"))]
async fn nats(
    _endpoint: &QueueEndpoint,
    _retry: &RetryPolicy,
) -> Result<Arc<dyn MessageTransport>, ConfigError> {
    Err(ConfigError::backend("nats", "built without the `nats` feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fallback_is_http() {
        let config = HttpFallbackConfig {
            url: "http://127.0.0.1:9/log".into(),
            auth_header: "authorization".into(),
        };
        let transport = BackendFactory.fallback(&config, &RetryPolicy::default()).await.unwrap();
        assert_eq!(transport.name(), "http");
    }

    #[cfg(not(feature = "kafka"))]
    #[tokio::test]
    async fn compiled_out_backend_is_config_error() {
        let endpoint = QueueEndpoint {
            backend: BackendKind::Kafka,
            url: "localhost:9092".into(),
            topic: "logs".into(),
            username: None,
            password: None,
            low_priority_topic: None,
        };
        let err = BackendFactory.queue(&endpoint, &RetryPolicy::default()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Backend { .. }));
    }
}
