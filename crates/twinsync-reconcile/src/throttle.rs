//! Pacing of the persisted feed.
//!
//! A full pass reads every record of the authoritative store. [`ThrottledFeed`]
//! caps that read rate at `throughput` records per `period` so a pass does not
//! compete with foreground traffic. Pacing never changes classification.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};

use twinsync_core::{Metadata, Result as CoreResult};

use crate::error::{Error, Result};
use crate::feed::MetadataFeed;

/// Rate limit for a feed: `throughput` records per `period_ms` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Records allowed per period (also the burst size).
    pub throughput: u32,
    /// Period length in milliseconds.
    pub period_ms: u64,
}

impl ThrottleConfig {
    /// Returns the period as a duration.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Builds the rate-limiter quota.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if throughput is zero or the period is too
    /// short to replenish one record per `period / throughput`.
    pub fn quota(&self) -> Result<Quota> {
        let burst = NonZeroU32::new(self.throughput)
            .ok_or_else(|| Error::configuration("throttle throughput must be positive"))?;
        let per_record = self.period() / self.throughput;
        Quota::with_period(per_record)
            .map(|quota| quota.allow_burst(burst))
            .ok_or_else(|| {
                Error::configuration(format!(
                    "throttle period {}ms is too short for {} records",
                    self.period_ms, self.throughput
                ))
            })
    }
}

/// Feed wrapper that waits for rate-limit capacity before each read.
pub struct ThrottledFeed<F> {
    inner: F,
    limiter: DefaultDirectRateLimiter,
}

impl<F> std::fmt::Debug for ThrottledFeed<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledFeed")
            .field("limiter", &"RateLimiter")
            .finish_non_exhaustive()
    }
}

impl<F: MetadataFeed> ThrottledFeed<F> {
    /// Wraps `inner` with the given quota.
    pub fn new(inner: F, quota: Quota) -> Self {
        Self {
            inner,
            limiter: RateLimiter::direct(quota),
        }
    }
}

#[async_trait]
impl<F: MetadataFeed> MetadataFeed for ThrottledFeed<F> {
    async fn next(&mut self) -> CoreResult<Option<Metadata>> {
        self.limiter.until_ready().await;
        self.inner.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::VecFeed;
    use twinsync_core::EntityId;

    #[test]
    fn quota_requires_positive_throughput() {
        let config = ThrottleConfig {
            throughput: 0,
            period_ms: 1_000,
        };
        assert!(config.quota().is_err());
    }

    #[test]
    fn quota_requires_nonzero_period() {
        let config = ThrottleConfig {
            throughput: 10,
            period_ms: 0,
        };
        assert!(config.quota().is_err());
    }

    #[test]
    fn quota_allows_burst_of_throughput() {
        let config = ThrottleConfig {
            throughput: 100,
            period_ms: 10_000,
        };
        let quota = config.quota().unwrap();
        assert_eq!(quota.burst_size().get(), 100);
        assert_eq!(quota.replenish_interval(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn throttled_feed_passes_records_through() {
        let records = (0..5)
            .map(|i| Metadata::new(EntityId::new(format!("x:{i}")).unwrap(), 1))
            .collect();
        let quota = ThrottleConfig {
            throughput: 1_000,
            period_ms: 1_000,
        }
        .quota()
        .unwrap();
        let mut feed = ThrottledFeed::new(VecFeed::new(records), quota);

        let mut count = 0;
        while feed.next().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
    }
}
