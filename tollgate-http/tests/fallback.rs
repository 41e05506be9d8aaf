use httpmock::prelude::*;
use std::time::Duration;
use tollgate::{
    ConfigError, CredentialKind, HttpFallbackConfig, InstantSleeper, LogEvent, MessageTransport,
    RetryPolicy, TrackingSleeper,
};
use tollgate_http::HttpTransport;

fn config(server: &MockServer) -> HttpFallbackConfig {
    HttpFallbackConfig { url: server.url("/v1/log"), auth_header: "authorization".into() }
}

fn retry() -> RetryPolicy {
    RetryPolicy::builder().with_sleeper(InstantSleeper).build().expect("retry policy")
}

fn event() -> LogEvent {
    LogEvent::builder("req-http-1")
        .organization("org-1")
        .credential(CredentialKind::Manual)
        .authorization("Bearer sk-caller")
        .build()
}

#[tokio::test]
async fn posts_json_with_forwarded_authorization() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/log")
                .header("authorization", "Bearer sk-caller")
                .header("content-type", "application/json")
                .body_includes("\"id\":\"req-http-1\"");
            then.status(200);
        })
        .await;

    let transport = HttpTransport::new(&config(&server), retry()).expect("transport");
    transport.send(&event()).await.expect("delivery should succeed");
    mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn custom_auth_header_name() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/log").header("helicone-authorization", "Bearer sk-caller");
            then.status(200);
        })
        .await;

    let config = HttpFallbackConfig {
        url: server.url("/v1/log"),
        auth_header: "helicone-authorization".into(),
    };
    let transport = HttpTransport::new(&config, retry()).expect("transport");
    transport.send(&event()).await.expect("delivery should succeed");
    mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn non_200_is_retried_then_surfaced() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/log");
            then.status(201);
        })
        .await;

    let sleeper = TrackingSleeper::new();
    let retry = RetryPolicy::builder()
        .delay(Duration::from_millis(10))
        .with_sleeper(sleeper.clone())
        .build()
        .expect("retry policy");
    let transport = HttpTransport::new(&config(&server), retry).expect("transport");

    let err = transport.send(&event()).await.expect_err("201 is not accepted");
    assert!(err.is_transport_failure());
    assert!(err.to_string().contains("201"));
    mock.assert_calls_async(3).await;
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(10); 2]);
}

#[tokio::test]
async fn recovers_after_transient_error() {
    let server = MockServer::start_async().await;
    let mut failing = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/log");
            then.status(503);
        })
        .await;

    let transport = HttpTransport::new(&config(&server), retry()).expect("transport");
    let first = transport.send(&event()).await;
    assert!(first.is_err());
    failing.assert_calls_async(3).await;
    failing.delete_async().await;

    let ok = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/log");
            then.status(200);
        })
        .await;
    transport.send(&event()).await.expect("delivery should succeed");
    ok.assert_calls_async(1).await;
}

#[test]
fn invalid_header_name_is_config_error() {
    let config =
        HttpFallbackConfig { url: "http://localhost/log".into(), auth_header: "bad header".into() };
    let err = HttpTransport::new(&config, RetryPolicy::default()).expect_err("invalid header");
    assert!(matches!(err, ConfigError::Invalid { .. }));
}
