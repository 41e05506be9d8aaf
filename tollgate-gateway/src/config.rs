use std::time::Duration;
use tollgate::{ConfigError, DeliveryConfig, LimiterConfig};

pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Everything the gateway reads from the environment at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub delivery: DeliveryConfig,
    pub limiter: LimiterConfig,
    /// How often idle buckets are swept.
    pub eviction_interval: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = "TOLLGATE_RATE_EVICTION_INTERVAL_SECONDS";
        let eviction_interval = match lookup(key).filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    ConfigError::invalid(key, format!("expected seconds > 0, got `{raw}`"))
                })?,
            None => DEFAULT_EVICTION_INTERVAL,
        };
        Ok(Self {
            delivery: DeliveryConfig::from_lookup(&lookup)?,
            limiter: LimiterConfig::from_lookup(&lookup)?,
            eviction_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn reads_delivery_and_limiter() {
        let vars = env(&[
            ("TOLLGATE_HTTP_FALLBACK_URL", "http://log"),
            ("TOLLGATE_RATE_CAPACITY", "100"),
            ("TOLLGATE_RATE_WINDOW_SECONDS", "60"),
        ]);
        let config = GatewayConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.eviction_interval, DEFAULT_EVICTION_INTERVAL);
        assert_eq!(config.delivery.fallback.url, "http://log");
    }

    #[test]
    fn missing_rate_capacity_is_fatal() {
        let vars = env(&[("TOLLGATE_HTTP_FALLBACK_URL", "http://log")]);
        let err = GatewayConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert_eq!(err, ConfigError::Missing("TOLLGATE_RATE_CAPACITY".into()));
    }

    #[test]
    fn zero_eviction_interval_rejected() {
        let vars = env(&[
            ("TOLLGATE_HTTP_FALLBACK_URL", "http://log"),
            ("TOLLGATE_RATE_CAPACITY", "100"),
            ("TOLLGATE_RATE_WINDOW_SECONDS", "60"),
            ("TOLLGATE_RATE_EVICTION_INTERVAL_SECONDS", "0"),
        ]);
        assert!(GatewayConfig::from_lookup(|k| vars.get(k).cloned()).is_err());
    }
}
