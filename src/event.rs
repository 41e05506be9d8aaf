//! The log record produced once per completed (or failed) provider call.
//!
//! A [`LogEvent`] is built once by the gateway, handed to the
//! [`DeliveryRouter`](crate::DeliveryRouter), and never mutated afterwards. Every backend
//! serializes it to the same JSON body; the forwarded authorization token travels alongside the
//! event but is never written into that body.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which kind of credential authorized the original request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    #[default]
    ApiKey,
    ProxyKey,
    /// Operator/debug credentials. Their traffic bypasses the queue and is delivered inline.
    Manual,
}

/// Request half of a log event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: String,
    pub organization_id: String,
    pub user_id: Option<String>,
    pub provider: Option<String>,
    pub target_url: Option<String>,
    pub path: Option<String>,
    pub model: Option<String>,
    pub is_stream: bool,
    pub body_size: u64,
    pub created_at_ms: i64,
    pub country_code: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// Response half of a log event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub id: Option<String>,
    pub status: u16,
    pub body_size: u64,
    pub created_at_ms: i64,
    pub latency_ms: i64,
    /// Only set for streamed responses.
    pub time_to_first_token_ms: Option<i64>,
    pub cost: Option<f64>,
}

/// An immutable request/response log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    request: RequestRecord,
    response: ResponseRecord,
    credential: CredentialKind,
    #[serde(skip)]
    authorization: Option<String>,
}

impl LogEvent {
    pub fn builder(request_id: impl Into<String>) -> LogEventBuilder {
        LogEventBuilder::new(request_id)
    }

    pub fn request_id(&self) -> &str {
        &self.request.id
    }

    pub fn request(&self) -> &RequestRecord {
        &self.request
    }

    pub fn response(&self) -> &ResponseRecord {
        &self.response
    }

    pub fn credential(&self) -> CredentialKind {
        self.credential
    }

    /// True when the request came in on an operator credential.
    pub fn is_manual_credential(&self) -> bool {
        self.credential == CredentialKind::Manual
    }

    /// The caller's original authorization, forwarded by the HTTP fallback.
    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    /// JSON body shared by every backend.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Builder for [`LogEvent`].
#[derive(Debug, Clone)]
pub struct LogEventBuilder {
    request: RequestRecord,
    response: ResponseRecord,
    credential: CredentialKind,
    authorization: Option<String>,
}

impl LogEventBuilder {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request: RequestRecord { id: request_id.into(), ..Default::default() },
            response: ResponseRecord::default(),
            credential: CredentialKind::default(),
            authorization: None,
        }
    }

    pub fn organization(mut self, organization_id: impl Into<String>) -> Self {
        self.request.organization_id = organization_id.into();
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.request.user_id = Some(user_id.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.request.provider = Some(provider.into());
        self
    }

    pub fn target(mut self, target_url: impl Into<String>, path: impl Into<String>) -> Self {
        self.request.target_url = Some(target_url.into());
        self.request.path = Some(path.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.request.model = Some(model.into());
        self
    }

    pub fn country(mut self, country_code: impl Into<String>) -> Self {
        self.request.country_code = Some(country_code.into());
        self
    }

    /// Request body size and start time.
    pub fn request_body(mut self, body_size: u64, created_at_ms: i64, is_stream: bool) -> Self {
        self.request.body_size = body_size;
        self.request.created_at_ms = created_at_ms;
        self.request.is_stream = is_stream;
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.properties.insert(name.into(), value.into());
        self
    }

    pub fn response_id(mut self, id: impl Into<String>) -> Self {
        self.response.id = Some(id.into());
        self
    }

    /// Status, size and completion time of the provider response. Latency is derived from the
    /// request start time.
    pub fn response(mut self, status: u16, body_size: u64, created_at_ms: i64) -> Self {
        self.response.status = status;
        self.response.body_size = body_size;
        self.response.created_at_ms = created_at_ms;
        self
    }

    pub fn time_to_first_token(mut self, millis: i64) -> Self {
        self.response.time_to_first_token_ms = Some(millis);
        self
    }

    pub fn cost(mut self, cost: f64) -> Self {
        self.response.cost = Some(cost);
        self
    }

    pub fn credential(mut self, kind: CredentialKind) -> Self {
        self.credential = kind;
        self
    }

    pub fn authorization(mut self, token: impl Into<String>) -> Self {
        self.authorization = Some(token.into());
        self
    }

    pub fn build(mut self) -> LogEvent {
        self.response.latency_ms =
            self.response.created_at_ms.saturating_sub(self.request.created_at_ms).max(0);
        LogEvent {
            request: self.request,
            response: self.response,
            credential: self.credential,
            authorization: self.authorization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogEvent {
        LogEvent::builder("req-1")
            .organization("org-9")
            .provider("openai")
            .target("https://api.openai.com", "/v1/chat/completions")
            .model("gpt-4o")
            .request_body(512, 1_000, true)
            .property("feature", "beta")
            .response(200, 2048, 1_750)
            .time_to_first_token(120)
            .cost(0.42)
            .credential(CredentialKind::ProxyKey)
            .authorization("Bearer sk-secret")
            .build()
    }

    #[test]
    fn builder_derives_latency() {
        let event = sample();
        assert_eq!(event.response().latency_ms, 750);
        assert_eq!(event.request_id(), "req-1");
        assert!(!event.is_manual_credential());
    }

    #[test]
    fn latency_never_negative() {
        let event = LogEvent::builder("r").request_body(0, 5_000, false).response(500, 0, 10).build();
        assert_eq!(event.response().latency_ms, 0);
    }

    #[test]
    fn json_body_omits_authorization() {
        let event = sample();
        let body = String::from_utf8(event.to_json().unwrap()).unwrap();
        assert!(!body.contains("sk-secret"));

        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["request"]["organizationId"], "org-9");
        assert_eq!(value["request"]["properties"]["feature"], "beta");
        assert_eq!(value["response"]["timeToFirstTokenMs"], 120);
        assert_eq!(value["credential"], "proxy_key");
    }
}
