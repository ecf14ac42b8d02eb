//! In-process leader elector.
//!
//! ## Limitations
//!
//! - No cross-process coordination
//! - State is lost when the process exits

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use ulid::Ulid;

use super::{LeaderElector, LeadershipResult, RenewalResult};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Lease {
    instance_id: String,
    token: String,
    expires_at: DateTime<Utc>,
}

impl Lease {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Leader elector holding leases in process memory.
#[derive(Debug)]
pub struct InMemoryLeaderElector {
    leases: Mutex<HashMap<String, Lease>>,
    lease_duration: Duration,
}

impl Default for InMemoryLeaderElector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::leadership("lease table lock poisoned")
}

impl InMemoryLeaderElector {
    /// Creates an elector granting leases of `lease_duration`.
    #[must_use]
    pub fn new(lease_duration: Duration) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            lease_duration,
        }
    }

    fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ttl = TimeDelta::from_std(self.lease_duration).unwrap_or(TimeDelta::MAX);
        now.checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[async_trait]
impl LeaderElector for InMemoryLeaderElector {
    async fn try_acquire(&self, lock_key: &str, instance_id: &str) -> Result<LeadershipResult> {
        let now = Utc::now();
        let mut leases = self.leases.lock().map_err(poisoned)?;

        if let Some(lease) = leases.get(lock_key) {
            if lease.is_live(now) && lease.instance_id != instance_id {
                return Ok(LeadershipResult::NotLeader {
                    current_leader: Some(lease.instance_id.clone()),
                });
            }
        }

        let lease = Lease {
            instance_id: instance_id.to_string(),
            token: Ulid::new().to_string(),
            expires_at: self.expiry(now),
        };
        let lease_token = lease.token.clone();
        leases.insert(lock_key.to_string(), lease);
        drop(leases);

        tracing::debug!(lock_key, instance_id, "lease acquired");
        Ok(LeadershipResult::Acquired {
            lease_token,
            lease_duration: self.lease_duration,
        })
    }

    async fn renew(&self, lock_key: &str, lease_token: &str) -> Result<RenewalResult> {
        let now = Utc::now();
        let mut leases = self.leases.lock().map_err(poisoned)?;

        let Some(lease) = leases.get_mut(lock_key) else {
            return Ok(RenewalResult::Lost);
        };
        if lease.token != lease_token {
            return Ok(RenewalResult::InvalidToken);
        }
        if !lease.is_live(now) {
            return Ok(RenewalResult::Lost);
        }

        lease.expires_at = self.expiry(now);
        Ok(RenewalResult::Renewed {
            lease_duration: self.lease_duration,
        })
    }

    async fn release(&self, lock_key: &str, lease_token: &str) -> Result<bool> {
        let mut leases = self.leases.lock().map_err(poisoned)?;
        let held = leases
            .get(lock_key)
            .is_some_and(|lease| lease.token == lease_token);
        if held {
            leases.remove(lock_key);
        }
        Ok(held)
    }

    async fn current_leader(&self, lock_key: &str) -> Result<Option<String>> {
        let now = Utc::now();
        let leases = self.leases.lock().map_err(poisoned)?;
        Ok(leases
            .get(lock_key)
            .filter(|lease| lease.is_live(now))
            .map(|lease| lease.instance_id.clone()))
    }
}
