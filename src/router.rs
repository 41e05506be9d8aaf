//! Configuration-driven delivery.
//!
//! [`DeliveryRouter`] is the only delivery component that knows about configuration. At
//! construction it resolves a [`Producer`] (single queue, dual write, or none) and an HTTP
//! fallback; per event it picks between them without inspecting any backend type.
//!
//! Events handed to [`DeliveryRouter::record_event`] are delivered on their own task. Each task
//! is counted until it finishes, and [`DeliveryRouter::shutdown`] waits for that count to reach
//! zero, bounded by a drain timeout.

use crate::config::{DeliveryConfig, HttpFallbackConfig, ProducerConfig, QueueEndpoint};
use crate::dispatcher::DualWriteDispatcher;
use crate::error::{ConfigError, DeliveryOutcome};
use crate::event::LogEvent;
use crate::retry::RetryPolicy;
use crate::transport::MessageTransport;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Builds concrete transports for the router.
///
/// The backend crates (`tollgate-kafka`, `tollgate-nats`, `tollgate-http`) are wired together by
/// an implementation of this trait, so the router itself stays backend-agnostic.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn queue(
        &self,
        endpoint: &QueueEndpoint,
        retry: &RetryPolicy,
    ) -> Result<Arc<dyn MessageTransport>, ConfigError>;

    async fn fallback(
        &self,
        config: &HttpFallbackConfig,
        retry: &RetryPolicy,
    ) -> Result<Arc<dyn MessageTransport>, ConfigError>;
}

/// The queue-side producer, resolved once at startup.
#[derive(Debug, Clone)]
pub enum Producer {
    Single(Arc<dyn MessageTransport>),
    Dual(DualWriteDispatcher),
    None,
}

impl Producer {
    pub async fn build(
        config: &ProducerConfig,
        retry: &RetryPolicy,
        factory: &dyn TransportFactory,
    ) -> Result<Self, ConfigError> {
        Ok(match config {
            ProducerConfig::None => Self::None,
            ProducerConfig::Single(endpoint) => Self::Single(factory.queue(endpoint, retry).await?),
            ProducerConfig::Dual { primary, secondary } => Self::Dual(DualWriteDispatcher::new(
                factory.queue(primary, retry).await?,
                factory.queue(secondary, retry).await?,
            )),
        })
    }

    pub fn as_transport(&self) -> Option<&dyn MessageTransport> {
        match self {
            Self::Single(transport) => Some(transport.as_ref()),
            Self::Dual(dispatcher) => Some(dispatcher as &dyn MessageTransport),
            Self::None => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Single(_) => "single",
            Self::Dual(_) => "dual",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when a delivery task ends, however it ends.
struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(in_flight.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Top-level log producer. Clones share the producer, the fallback and the in-flight tracking.
#[derive(Debug, Clone)]
pub struct DeliveryRouter {
    producer: Producer,
    fallback: Arc<dyn MessageTransport>,
    in_flight: Arc<InFlight>,
    closed: Arc<AtomicBool>,
}

impl DeliveryRouter {
    pub fn new(producer: Producer, fallback: Arc<dyn MessageTransport>) -> Self {
        Self {
            producer,
            fallback,
            in_flight: Arc::new(InFlight::default()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resolve the producer and fallback described by `config`.
    pub async fn from_config(
        config: &DeliveryConfig,
        factory: &dyn TransportFactory,
    ) -> Result<Self, ConfigError> {
        let producer = Producer::build(&config.producer, &config.retry, factory).await?;
        let fallback = factory.fallback(&config.fallback, &config.retry).await?;
        tracing::info!(
            producer = producer.kind(),
            fallback = fallback.name(),
            "delivery router configured"
        );
        Ok(Self::new(producer, fallback))
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    /// Deliver one event and wait for the outcome.
    ///
    /// Without a producer, or for manual-credential traffic, the event goes to the HTTP
    /// fallback. Fallback failures are logged and reported as success.
    pub async fn send_message(&self, event: &LogEvent) -> DeliveryOutcome {
        let producer = match self.producer.as_transport() {
            Some(producer) if !event.is_manual_credential() => producer,
            _ => {
                if let Err(err) = self.fallback.send(event).await {
                    tracing::warn!(
                        transport = self.fallback.name(),
                        request_id = event.request_id(),
                        error = %err,
                        "fallback delivery failed; event dropped"
                    );
                }
                return Ok(());
            }
        };
        producer.send(event).await
    }

    /// Deliver `event` on a background task and return immediately.
    ///
    /// Failures are logged, never returned. Events recorded after [`shutdown`](Self::shutdown)
    /// are dropped with a warning.
    pub fn record_event(&self, event: LogEvent) {
        // Counted before the closed check, so a concurrent shutdown either waits for this event
        // or this event sees the router closed.
        let guard = InFlightGuard::enter(&self.in_flight);
        if self.closed.load(Ordering::SeqCst) {
            drop(guard);
            tracing::warn!(request_id = event.request_id(), "router shut down; event dropped");
            return;
        }
        let router = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(err) = router.send_message(&event).await {
                tracing::error!(
                    producer = router.producer.kind(),
                    request_id = event.request_id(),
                    error = %err,
                    "log delivery failed"
                );
            }
        });
    }

    /// Deliveries spawned by [`record_event`](Self::record_event) that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Shed load onto the lower-priority destination of every leaf that has one.
    pub fn set_lower_priority(&self) {
        if let Some(producer) = self.producer.as_transport() {
            tracing::info!(producer = self.producer.kind(), "lowering delivery priority");
            producer.set_lower_priority();
        }
    }

    /// Stop accepting events and wait up to `drain_timeout` for in-flight deliveries.
    ///
    /// Returns how many deliveries were still running when the timeout elapsed. Those tasks are
    /// not cancelled.
    pub async fn shutdown(&self, drain_timeout: Duration) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let drained = async {
            loop {
                let idle = self.in_flight.idle.notified();
                if self.in_flight() == 0 {
                    return;
                }
                idle.await;
            }
        };
        match tokio::time::timeout(drain_timeout, drained).await {
            Ok(()) => {
                tracing::info!("delivery drained");
                0
            }
            Err(_) => {
                let remaining = self.in_flight();
                tracing::warn!(
                    remaining,
                    timeout_ms = drain_timeout.as_millis() as u64,
                    "drain timeout elapsed with deliveries in flight"
                );
                remaining
            }
        }
    }
}
