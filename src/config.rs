//! Startup configuration, resolved once from the environment.
//!
//! Every resolver takes a lookup closure so tests can feed a map instead of the process
//! environment. Missing or malformed values are [`ConfigError`]s and are only ever raised here.

use crate::error::ConfigError;
use crate::rate_limit::{FailureMode, LimiterConfig, RateLimitPolicy};
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_AUTH_HEADER: &str = "authorization";
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Which queue layout the router delivers through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueMode {
    Single,
    Dual,
    #[default]
    None,
}

impl FromStr for QueueMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "dual" => Ok(Self::Dual),
            "none" | "" => Ok(Self::None),
            other => Err(ConfigError::invalid(
                "TOLLGATE_QUEUE_MODE",
                format!("expected single|dual|none, got `{other}`"),
            )),
        }
    }
}

/// The technology behind one queue endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Partitioned, keyed log (Kafka).
    #[default]
    Kafka,
    /// Subject-based stream (NATS).
    Nats,
}

/// Connection details for one queue backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEndpoint {
    pub backend: BackendKind,
    pub url: String,
    /// Topic or subject events are written to.
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Destination used after a priority downgrade.
    pub low_priority_topic: Option<String>,
}

/// The producer layout, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerConfig {
    Single(QueueEndpoint),
    /// `secondary` is authoritative; `primary` is best effort.
    Dual { primary: QueueEndpoint, secondary: QueueEndpoint },
    None,
}

/// Synchronous HTTP fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFallbackConfig {
    pub url: String,
    /// Header the caller's original authorization is forwarded in.
    pub auth_header: String,
}

/// Everything the delivery side needs.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub producer: ProducerConfig,
    pub fallback: HttpFallbackConfig,
    pub retry: RetryPolicy,
    pub drain_timeout: Duration,
}

impl DeliveryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let mode: QueueMode = env.get("TOLLGATE_QUEUE_MODE").unwrap_or_default().parse()?;
        let low_priority_topic = env.get("TOLLGATE_QUEUE_LOW_PRIORITY_TOPIC");
        let producer = match mode {
            QueueMode::None => ProducerConfig::None,
            QueueMode::Single => {
                ProducerConfig::Single(env.endpoint("PRIMARY", low_priority_topic.clone())?)
            }
            QueueMode::Dual => ProducerConfig::Dual {
                primary: env.endpoint("PRIMARY", low_priority_topic.clone())?,
                secondary: env.endpoint("SECONDARY", low_priority_topic)?,
            },
        };

        let fallback = HttpFallbackConfig {
            url: env.require("TOLLGATE_HTTP_FALLBACK_URL")?,
            auth_header: env
                .get("TOLLGATE_HTTP_AUTH_HEADER")
                .unwrap_or_else(|| DEFAULT_AUTH_HEADER.to_string()),
        };

        let attempts = env.parse_or("TOLLGATE_RETRY_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        let delay_ms =
            env.parse_or("TOLLGATE_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY.as_millis() as u64)?;
        let retry = RetryPolicy::builder()
            .max_attempts(attempts)
            .delay(Duration::from_millis(delay_ms))
            .build()
            .map_err(|e| ConfigError::invalid("TOLLGATE_RETRY_ATTEMPTS", e.to_string()))?;

        let drain_ms =
            env.parse_or("TOLLGATE_DRAIN_TIMEOUT_MS", DEFAULT_DRAIN_TIMEOUT.as_millis() as u64)?;

        Ok(Self { producer, fallback, retry, drain_timeout: Duration::from_millis(drain_ms) })
    }
}

impl LimiterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let capacity: f64 = env.parse("TOLLGATE_RATE_CAPACITY")?;
        let window: i64 = env.parse("TOLLGATE_RATE_WINDOW_SECONDS")?;
        let policy = RateLimitPolicy::new(capacity, window)
            .map_err(|e| ConfigError::invalid("TOLLGATE_RATE_CAPACITY", e.to_string()))?;
        let ttl: u64 = env.parse_or("TOLLGATE_RATE_IDLE_TTL_SECONDS", 3600)?;
        let mode = match env.get("TOLLGATE_RATE_FAILURE_MODE").as_deref().map(str::trim) {
            None | Some("") | Some("open") => FailureMode::Open,
            Some("closed") => FailureMode::Closed,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "TOLLGATE_RATE_FAILURE_MODE",
                    format!("expected open|closed, got `{other}`"),
                ))
            }
        };
        Ok(LimiterConfig::new(policy).idle_ttl(Duration::from_secs(ttl)).failure_mode(mode))
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn parse<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.require(key)?.trim().parse().map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(_) => self.parse(key),
            None => Ok(default),
        }
    }

    fn endpoint(
        &self,
        role: &str,
        low_priority_topic: Option<String>,
    ) -> Result<QueueEndpoint, ConfigError> {
        let key = |suffix: &str| format!("TOLLGATE_QUEUE_{role}_{suffix}");
        let backend = match self.get(&key("BACKEND")).as_deref().map(str::trim) {
            None | Some("kafka") => BackendKind::Kafka,
            Some("nats") => BackendKind::Nats,
            Some(other) => {
                return Err(ConfigError::invalid(
                    key("BACKEND"),
                    format!("expected kafka|nats, got `{other}`"),
                ))
            }
        };
        Ok(QueueEndpoint {
            backend,
            url: self.require(&key("URL"))?,
            topic: self.require(&key("TOPIC"))?,
            username: self.get(&key("USERNAME")),
            password: self.get(&key("PASSWORD")),
            low_priority_topic,
        })
    }
}
