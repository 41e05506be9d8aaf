use httpmock::prelude::*;
use std::collections::HashMap;
use tollgate::{CredentialKind, LogEvent, RateLimitPolicy};
use tollgate_gateway::{BackendFactory, Gateway, GatewayConfig};

fn config(server: &MockServer, extra: &[(&str, &str)]) -> GatewayConfig {
    let mut vars: HashMap<String, String> = [
        ("TOLLGATE_HTTP_FALLBACK_URL", server.url("/v1/log")),
        ("TOLLGATE_RATE_CAPACITY", "3".to_string()),
        ("TOLLGATE_RATE_WINDOW_SECONDS", "3600".to_string()),
        ("TOLLGATE_RETRY_DELAY_MS", "1".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    GatewayConfig::from_lookup(|k| vars.get(k).cloned()).expect("gateway config")
}

#[tokio::test]
async fn admits_until_quota_then_denies() {
    let server = MockServer::start_async().await;
    let gateway = Gateway::connect(config(&server, &[]), &BackendFactory).await.expect("gateway");

    for _ in 0..3 {
        assert!(gateway.check_and_consume("org-1", 1.0).await.unwrap().is_allowed());
    }
    let denied = gateway.check_and_consume("org-1", 1.0).await.unwrap();
    assert!(!denied.is_allowed());
    assert_eq!(denied.status_code(), 429);
    assert!((3599..=3600).contains(&denied.retry_after_seconds));

    let other = gateway.check_and_consume("org-2", 1.0).await.unwrap();
    assert!(other.is_allowed(), "keys are isolated");

    let policy = RateLimitPolicy::new(10.0, 60).unwrap();
    let switched = gateway.check_and_consume_with("org-3", policy, 4.0).await.unwrap();
    assert_eq!(switched.remaining, 6.0);

    assert_eq!(gateway.shutdown().await, 0);
}

#[tokio::test]
async fn without_queue_events_go_to_http_fallback() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/log").header("authorization", "Bearer sk-live");
            then.status(200);
        })
        .await;

    let gateway = Gateway::connect(config(&server, &[]), &BackendFactory).await.expect("gateway");
    for i in 0..4 {
        let event = LogEvent::builder(format!("req-{i}"))
            .organization("org-1")
            .credential(CredentialKind::Manual)
            .authorization("Bearer sk-live")
            .build();
        gateway.record_event(event);
    }

    assert_eq!(gateway.shutdown().await, 0);
    mock.assert_calls_async(4).await;
}

#[tokio::test]
async fn fallback_failures_never_reach_the_caller() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/log");
            then.status(500);
        })
        .await;

    let gateway = Gateway::connect(config(&server, &[]), &BackendFactory).await.expect("gateway");
    gateway.record_event(LogEvent::builder("req-1").build());
    assert_eq!(gateway.shutdown().await, 0);
    mock.assert_calls_async(3).await;
}

#[cfg(not(feature = "kafka"))]
#[tokio::test]
async fn selecting_a_compiled_out_queue_fails_at_startup() {
    let server = MockServer::start_async().await;
    let config = config(
        &server,
        &[
            ("TOLLGATE_QUEUE_MODE", "single"),
            ("TOLLGATE_QUEUE_PRIMARY_URL", "localhost:9092"),
            ("TOLLGATE_QUEUE_PRIMARY_TOPIC", "request-response-logs"),
        ],
    );
    let err = Gateway::connect(config, &BackendFactory).await.expect_err("kafka is compiled out");
    assert!(err.to_string().contains("kafka"));
}
