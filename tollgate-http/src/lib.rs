//! HTTP fallback transport for `tollgate`.
//!
//! [`HttpTransport`] POSTs the event's JSON body to a logging endpoint, forwarding the caller's
//! original authorization in a configurable header. Anything other than `200 OK` counts as a
//! failed attempt. The router treats this path as last resort and swallows its final failure.

use async_trait::async_trait;
use reqwest::header::{HeaderName, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tollgate::{
    ConfigError, DeliveryOutcome, HttpFallbackConfig, LogEvent, MessageTransport, RetryPolicy,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a single POST failed.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("logging endpoint answered {0}")]
    Status(StatusCode),
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
    auth_header: HeaderName,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: &HttpFallbackConfig, retry: RetryPolicy) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::backend("http", e))?;
        Self::with_client(client, config, retry)
    }

    /// Use a preconfigured client.
    pub fn with_client(
        client: Client,
        config: &HttpFallbackConfig,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let auth_header = config
            .auth_header
            .parse::<HeaderName>()
            .map_err(|e| ConfigError::invalid("TOLLGATE_HTTP_AUTH_HEADER", e.to_string()))?;
        Ok(Self { client, url: config.url.clone(), auth_header, retry })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, body: &[u8], authorization: Option<&str>) -> Result<(), HttpError> {
        let mut request =
            self.client.post(&self.url).header(CONTENT_TYPE, "application/json").body(body.to_vec());
        if let Some(token) = authorization {
            request = request.header(self.auth_header.clone(), token);
        }
        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(HttpError::Status(status)),
        }
    }
}

#[async_trait]
impl MessageTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, event: &LogEvent) -> DeliveryOutcome {
        let body = event.to_json()?;
        let authorization = event.authorization();
        self.retry.deliver(self.name(), |_| self.post(&body, authorization)).await
    }
}
