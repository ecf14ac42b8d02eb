//! Leader-gated pass execution.
//!
//! A scheduler calls [`SyncCoordinator::run_if_leader`] on every replica at
//! each tick. Only the replica that wins the [`SYNC_LOCK_KEY`] lease runs the
//! pass; the others skip.
//!
//! While the pass runs, the leader renews its lease every third of the lease
//! duration. If a renewal reports the lease lost, the pass is abandoned with
//! [`Error::Leadership`] so two replicas never run passes at the same time.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::feed::MetadataFeed;
use crate::leader::{LeaderElector, LeadershipResult, RenewalResult, SYNC_LOCK_KEY};
use crate::report::PassReport;
use crate::sync::BackgroundSync;

/// Outcome of one scheduled tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// This replica led and the pass completed.
    Completed(PassReport),
    /// Another replica holds the lease.
    Skipped {
        /// The replica currently leading, if known.
        current_leader: Option<String>,
    },
}

impl PassOutcome {
    /// Returns the report if the pass ran.
    #[must_use]
    pub fn report(&self) -> Option<&PassReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped { .. } => None,
        }
    }
}

/// Runs passes only while holding the synchronization lease.
pub struct SyncCoordinator {
    sync: BackgroundSync,
    elector: Arc<dyn LeaderElector>,
    instance_id: String,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("sync", &self.sync)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Creates a coordinator for the replica named `instance_id`.
    pub fn new(
        sync: BackgroundSync,
        elector: Arc<dyn LeaderElector>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            sync,
            elector,
            instance_id: instance_id.into(),
        }
    }

    /// Returns the pass runner.
    #[must_use]
    pub const fn sync(&self) -> &BackgroundSync {
        &self.sync
    }

    /// Runs one pass if this replica wins the lease.
    ///
    /// The lease is renewed while the pass runs and released after the pass
    /// whether or not it succeeded.
    ///
    /// # Errors
    ///
    /// Returns leadership backend errors, [`Error::Leadership`] if the lease is
    /// lost mid-pass (the pass is abandoned), and any pass error.
    pub async fn run_if_leader<P, I>(
        &self,
        persisted: P,
        indexed: I,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome>
    where
        P: MetadataFeed + 'static,
        I: MetadataFeed + 'static,
    {
        let (lease_token, lease_duration) = match self
            .elector
            .try_acquire(SYNC_LOCK_KEY, &self.instance_id)
            .await?
        {
            LeadershipResult::Acquired {
                lease_token,
                lease_duration,
            } => (lease_token, lease_duration),
            LeadershipResult::NotLeader { current_leader } => {
                tracing::debug!(
                    instance_id = %self.instance_id,
                    current_leader = current_leader.as_deref().unwrap_or("unknown"),
                    "not leader; skipping pass"
                );
                return Ok(PassOutcome::Skipped { current_leader });
            }
        };

        let result = tokio::select! {
            biased;
            result = self.sync.run_pass_cancellable(persisted, indexed, cancel) => result,
            lost = self.hold_lease(&lease_token, lease_duration) => Err(lost),
        };

        match self.elector.release(SYNC_LOCK_KEY, &lease_token).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                instance_id = %self.instance_id,
                "lease expired before the pass finished"
            ),
            Err(e) => tracing::warn!(error = %e, "failed to release lease"),
        }

        result.map(PassOutcome::Completed)
    }

    /// Renews the lease until it is lost; returns the reason.
    async fn hold_lease(&self, lease_token: &str, lease_duration: Duration) -> Error {
        let mut period = renewal_period(lease_duration);
        loop {
            tokio::time::sleep(period).await;
            match self.elector.renew(SYNC_LOCK_KEY, lease_token).await {
                Ok(RenewalResult::Renewed { lease_duration }) => {
                    period = renewal_period(lease_duration);
                }
                Ok(RenewalResult::Lost | RenewalResult::InvalidToken) => {
                    tracing::error!(
                        instance_id = %self.instance_id,
                        "lease lost mid-pass; abandoning pass"
                    );
                    return Error::leadership("lease lost before the pass finished");
                }
                Err(e) => {
                    tracing::error!(error = %e, "lease renewal failed; abandoning pass");
                    return e;
                }
            }
        }
    }
}

fn renewal_period(lease_duration: Duration) -> Duration {
    (lease_duration / 3).max(Duration::from_millis(1))
}
