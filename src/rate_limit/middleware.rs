use crate::clock::Clock;
use crate::error::AdmissionError;
use crate::rate_limit::limiter::RateLimiter;
use crate::rate_limit::store::BucketStore;
use crate::rate_limit::RateLimitPolicy;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower_layer::Layer;
use tower_service::Service;

/// What a request is charged: the quota scope, its cost, and an optional per-request policy.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionTicket {
    pub key: String,
    pub cost: f64,
    /// Overrides the limiter's default policy when set.
    pub policy: Option<RateLimitPolicy>,
}

impl AdmissionTicket {
    pub fn new(key: impl Into<String>, cost: f64) -> Self {
        Self { key: key.into(), cost, policy: None }
    }

    pub fn with_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// A layer that gates a service on a [`RateLimiter`].
pub struct AdmissionLayer<S, C, F> {
    limiter: Arc<RateLimiter<S, C>>,
    ticket: Arc<F>,
}

impl<S, C, F> Clone for AdmissionLayer<S, C, F> {
    fn clone(&self) -> Self {
        Self { limiter: self.limiter.clone(), ticket: self.ticket.clone() }
    }
}

impl<S, C, F> AdmissionLayer<S, C, F> {
    /// `ticket` maps each request to the key and cost it is charged.
    pub fn new(limiter: Arc<RateLimiter<S, C>>, ticket: F) -> Self {
        Self { limiter, ticket: Arc::new(ticket) }
    }
}

impl<Svc, S, C, F> Layer<Svc> for AdmissionLayer<S, C, F> {
    type Service = AdmissionService<Svc, S, C, F>;

    fn layer(&self, service: Svc) -> Self::Service {
        AdmissionService {
            inner: service,
            limiter: self.limiter.clone(),
            ticket: self.ticket.clone(),
        }
    }
}

/// Middleware service that admits or rejects each request before calling the inner service.
pub struct AdmissionService<Svc, S, C, F> {
    inner: Svc,
    limiter: Arc<RateLimiter<S, C>>,
    ticket: Arc<F>,
}

impl<Svc: Clone, S, C, F> Clone for AdmissionService<Svc, S, C, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
            ticket: self.ticket.clone(),
        }
    }
}

impl<Svc, S, C, F, Req> Service<Req> for AdmissionService<Svc, S, C, F>
where
    Svc: Service<Req> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    Svc::Response: Send + 'static,
    Svc::Error: Send + 'static,
    S: BucketStore + 'static,
    C: Clock + 'static,
    F: Fn(&Req) -> AdmissionTicket + Send + Sync + 'static,
    Req: Send + 'static,
{
    type Response = Svc::Response;
    type Error = AdmissionError<Svc::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let ticket = (self.ticket)(&req);
        let limiter = self.limiter.clone();
        // keep the instance that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let policy = ticket.policy.unwrap_or_else(|| limiter.default_policy());
            let decision = limiter
                .consume_with(&ticket.key, policy, ticket.cost)
                .await
                .map_err(AdmissionError::Limiter)?;
            if !decision.allowed {
                let secs = u64::try_from(decision.retry_after_seconds).unwrap_or(0);
                return Err(AdmissionError::RateLimited { retry_after: Duration::from_secs(secs) });
            }
            inner.call(req).await.map_err(AdmissionError::Inner)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::{InMemoryBucketStore, LimiterConfig};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Clone)]
    struct Provider(Arc<AtomicUsize>);

    impl Service<(String, f64)> for Provider {
        type Response = &'static str;
        type Error = Infallible;
        type Future = BoxFuture<'static, Result<&'static str, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: (String, f64)) -> Self::Future {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok("completion") })
        }
    }

    fn limiter(capacity: f64) -> Arc<RateLimiter<InMemoryBucketStore, ManualClock>> {
        Arc::new(RateLimiter::new(
            InMemoryBucketStore::new(),
            ManualClock::new(0),
            LimiterConfig::new(RateLimitPolicy::new(capacity, 60).unwrap()),
        ))
    }

    fn ticket(req: &(String, f64)) -> AdmissionTicket {
        AdmissionTicket::new(req.0.clone(), req.1)
    }

    #[tokio::test]
    async fn denied_requests_never_reach_the_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = AdmissionLayer::new(limiter(2.0), ticket).layer(Provider(calls.clone()));

        for _ in 0..2 {
            let out = svc.clone().oneshot(("org".to_string(), 1.0)).await;
            assert_eq!(out.unwrap(), "completion");
        }
        let err = svc.clone().oneshot(("org".to_string(), 1.0)).await.unwrap_err();
        match err {
            AdmissionError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_cost_is_surfaced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let svc = AdmissionLayer::new(limiter(2.0), ticket).layer(Provider(calls.clone()));
        let err = svc.oneshot(("org".to_string(), -3.0)).await.unwrap_err();
        assert!(matches!(err, AdmissionError::Limiter(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ticket_policy_overrides_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let strict = RateLimitPolicy::new(1.0, 60).unwrap();
        let layer = AdmissionLayer::new(limiter(100.0), move |req: &(String, f64)| {
            AdmissionTicket::new(req.0.clone(), req.1).with_policy(strict)
        });
        let svc = layer.layer(Provider(calls));
        assert!(svc.clone().oneshot(("k".to_string(), 1.0)).await.is_ok());
        assert!(svc.oneshot(("k".to_string(), 1.0)).await.unwrap_err().is_rate_limited());
    }
}
