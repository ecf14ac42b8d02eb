//! Pass configuration.
//!
//! All values are read-only for the duration of a pass. Defaults suit a
//! periodic background pass; every field can be overridden from `TWINSYNC_*`
//! environment variables via [`SyncConfig::from_env`].

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::throttle::ThrottleConfig;

const DEFAULT_TOLERANCE_WINDOW_MS: u64 = 300_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_MAX_IN_FLIGHT_VERIFICATIONS: usize = 4;

fn default_tolerance_window_ms() -> u64 {
    DEFAULT_TOLERANCE_WINDOW_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_max_in_flight_verifications() -> usize {
    DEFAULT_MAX_IN_FLIGHT_VERIFICATIONS
}

/// Configuration for background synchronization passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Age (milliseconds) below which an indexed-side write explains a discrepancy.
    #[serde(default = "default_tolerance_window_ms")]
    pub tolerance_window_ms: u64,

    /// Deadline (milliseconds) for one policy revision round trip.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Bound on concurrently outstanding verifications.
    #[serde(default = "default_max_in_flight_verifications")]
    pub max_in_flight_verifications: usize,

    /// Fixed "now" for the tolerance window; read from the clock at pass start if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_time: Option<DateTime<Utc>>,

    /// Optional pacing of the persisted feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<ThrottleConfig>,

    /// Fail the pass on out-of-order feed input instead of logging it.
    #[serde(default)]
    pub strict_ordering: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance_window_ms: default_tolerance_window_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_in_flight_verifications: default_max_in_flight_verifications(),
            reference_time: None,
            throttle: None,
            strict_ordering: false,
        }
    }
}

impl SyncConfig {
    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `TWINSYNC_TOLERANCE_WINDOW_MS` | `tolerance_window_ms` |
    /// | `TWINSYNC_REQUEST_TIMEOUT_MS` | `request_timeout_ms` |
    /// | `TWINSYNC_MAX_IN_FLIGHT_VERIFICATIONS` | `max_in_flight_verifications` |
    /// | `TWINSYNC_REFERENCE_TIME` | `reference_time` (RFC3339) |
    /// | `TWINSYNC_THROTTLE_THROUGHPUT` + `TWINSYNC_THROTTLE_PERIOD_MS` | `throttle` |
    /// | `TWINSYNC_STRICT_ORDERING` | `strict_ordering` |
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a variable cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(ms) = env_u64("TWINSYNC_TOLERANCE_WINDOW_MS")? {
            config.tolerance_window_ms = ms;
        }
        if let Some(ms) = env_u64("TWINSYNC_REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = ms;
        }
        if let Some(limit) = env_usize("TWINSYNC_MAX_IN_FLIGHT_VERIFICATIONS")? {
            config.max_in_flight_verifications = limit;
        }
        config.reference_time = env_datetime("TWINSYNC_REFERENCE_TIME")?;

        let throughput = env_u32("TWINSYNC_THROTTLE_THROUGHPUT")?;
        let period_ms = env_u64("TWINSYNC_THROTTLE_PERIOD_MS")?;
        config.throttle = match (throughput, period_ms) {
            (None, None) => None,
            (Some(throughput), Some(period_ms)) => Some(ThrottleConfig {
                throughput,
                period_ms,
            }),
            _ => {
                return Err(Error::configuration(
                    "TWINSYNC_THROTTLE_THROUGHPUT and TWINSYNC_THROTTLE_PERIOD_MS must be set together",
                ));
            }
        };

        if let Some(strict) = env_bool("TWINSYNC_STRICT_ORDERING")? {
            config.strict_ordering = strict;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a zero in-flight limit, a zero request
    /// timeout, or a throttle that cannot be turned into a rate.
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight_verifications == 0 {
            return Err(Error::configuration(
                "max_in_flight_verifications must be at least 1",
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::configuration("request_timeout_ms must be positive"));
        }
        if let Some(throttle) = &self.throttle {
            throttle.quota()?;
        }
        Ok(())
    }

    /// Sets the tolerance window (millisecond precision, saturating).
    #[must_use]
    pub fn with_tolerance_window(mut self, window: Duration) -> Self {
        self.tolerance_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the per-request verification timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the in-flight verification bound.
    #[must_use]
    pub fn with_max_in_flight_verifications(mut self, limit: usize) -> Self {
        self.max_in_flight_verifications = limit;
        self
    }

    /// Pins the pass reference time.
    #[must_use]
    pub fn with_reference_time(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    /// Paces the persisted feed.
    #[must_use]
    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Enables or disables strict ordering checks.
    #[must_use]
    pub fn with_strict_ordering(mut self, strict: bool) -> Self {
        self.strict_ordering = strict;
        self
    }

    /// Returns the tolerance window as a signed duration, saturating on overflow.
    #[must_use]
    pub fn tolerance_window(&self) -> TimeDelta {
        i64::try_from(self.tolerance_window_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Returns the per-request verification timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u32(name: &str) -> Result<Option<u32>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u32>()
        .map(Some)
        .map_err(|e| Error::configuration(format!("{name} must be a u32: {e}")))
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| Error::configuration(format!("{name} must be a u64: {e}")))
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<usize>()
        .map(Some)
        .map_err(|e| Error::configuration(format!("{name} must be a usize: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::configuration(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_bool(name, &v).map(Some)
}

/// Parses an RFC3339 timestamp, naming the setting in the error.
///
/// # Errors
///
/// Returns a configuration error if `value` is not RFC3339.
pub fn parse_reference_time(name: &str, value: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value.trim()).map_err(|e| {
        Error::configuration(format!(
            "{name} must be RFC3339 (e.g. 2026-01-01T00:00:00Z): {e}"
        ))
    })?;
    Ok(parsed.with_timezone(&Utc))
}

fn env_datetime(name: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_reference_time(name, &v).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tolerance_window(), TimeDelta::minutes(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.max_in_flight_verifications, 4);
    }

    #[test]
    fn zero_in_flight_is_rejected() {
        let config = SyncConfig::default().with_max_in_flight_verifications(0);
        assert!(matches!(
            config.validate(),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = SyncConfig::default().with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_throughput_throttle_is_rejected() {
        let config = SyncConfig::default().with_throttle(ThrottleConfig {
            throughput: 0,
            period_ms: 1_000,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn sub_second_tolerance_window_is_kept() {
        let config = SyncConfig::default().with_tolerance_window(Duration::from_millis(500));
        assert_eq!(config.tolerance_window(), TimeDelta::milliseconds(500));
    }

    #[test]
    fn huge_tolerance_window_saturates() {
        let config = SyncConfig {
            tolerance_window_ms: u64::MAX,
            ..SyncConfig::default()
        };
        assert_eq!(config.tolerance_window(), TimeDelta::MAX);
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"tolerance_window_ms": 60000}"#).unwrap();
        assert_eq!(config.tolerance_window(), TimeDelta::minutes(1));
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert!(config.reference_time.is_none());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("X", "yes").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn parse_reference_time_requires_rfc3339() {
        assert!(parse_reference_time("X", "2026-01-01T00:00:00Z").is_ok());
        assert!(parse_reference_time("X", "yesterday").is_err());
    }
}
