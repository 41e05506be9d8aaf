//! Per-request policy headers.
//!
//! Format: `<quota>;w=<window_seconds>[;u=request|cents][;s=<segment>]`, e.g. `1000;w=3600;u=cents`.

use crate::error::PolicyError;
use crate::rate_limit::bucket::RateLimitPolicy;
use std::fmt;
use std::str::FromStr;

/// What one token stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CostUnit {
    /// One token per request.
    #[default]
    Request,
    /// One token per cent of provider spend; cost may be fractional.
    Cents,
}

/// A parsed policy header.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyHeader {
    pub policy: RateLimitPolicy,
    pub unit: CostUnit,
    pub segment: Option<String>,
}

impl PolicyHeader {
    /// Cost of a request under this policy.
    ///
    /// Request-unit policies always cost one token. Cents policies need the caller's cost;
    /// `None` means it is not known yet, in which case callers should `peek` before the call
    /// and `record_usage` after it.
    pub fn cost(&self, cents: Option<f64>) -> Option<f64> {
        match self.unit {
            CostUnit::Request => Some(1.0),
            CostUnit::Cents => cents,
        }
    }
}

impl FromStr for PolicyHeader {
    type Err = PolicyError;

    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| PolicyError::Malformed {
            header: header.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = header.trim().split(';').map(str::trim);
        let quota: f64 = parts
            .next()
            .filter(|q| !q.is_empty())
            .ok_or_else(|| malformed("missing quota"))?
            .parse()
            .map_err(|_| malformed("quota is not a number"))?;

        let mut window = None;
        let mut unit = CostUnit::Request;
        let mut segment = None;
        for part in parts.filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| malformed("expected key=value"))?;
            match name.trim() {
                "w" => {
                    window = Some(
                        value
                            .trim()
                            .parse::<i64>()
                            .map_err(|_| malformed("window is not an integer"))?,
                    )
                }
                "u" => {
                    unit = match value.trim() {
                        "request" => CostUnit::Request,
                        "cents" => CostUnit::Cents,
                        _ => return Err(malformed("unit must be `request` or `cents`")),
                    }
                }
                "s" => {
                    let value = value.trim();
                    if value.is_empty() {
                        return Err(malformed("empty segment"));
                    }
                    segment = Some(value.to_string());
                }
                other => return Err(malformed(&format!("unknown parameter `{other}`"))),
            }
        }

        let window = window.ok_or_else(|| malformed("missing window (w=)"))?;
        let policy = RateLimitPolicy::new(quota, window)?;
        Ok(Self { policy, unit, segment })
    }
}

impl fmt::Display for PolicyHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.policy)?;
        if self.unit == CostUnit::Cents {
            write!(f, ";u=cents")?;
        }
        if let Some(segment) = &self.segment {
            write!(f, ";s={segment}")?;
        }
        Ok(())
    }
}
