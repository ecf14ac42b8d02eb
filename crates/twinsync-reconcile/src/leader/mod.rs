//! Single-pass-at-a-time leadership.
//!
//! Passes are idempotent, but two replicas running the same pass against the
//! same store double the read load and the repair traffic. A replica therefore
//! runs a pass only while it holds the [`SYNC_LOCK_KEY`] lease.
//!
//! - Leases are time-bounded; a crashed leader's lease simply expires
//! - [`InMemoryLeaderElector`] serves tests and single-process deployments;
//!   cluster backends implement [`LeaderElector`]

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::InMemoryLeaderElector;

/// Lock key guarding background synchronization passes.
pub const SYNC_LOCK_KEY: &str = "background-sync";

/// Result of a leadership acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadershipResult {
    /// This instance now holds the lease.
    Acquired {
        /// Token required to renew or release the lease.
        lease_token: String,
        /// Time until the lease expires.
        lease_duration: Duration,
    },
    /// Another instance holds the lease.
    NotLeader {
        /// Identifier of the current leader, if known.
        current_leader: Option<String>,
    },
}

impl LeadershipResult {
    /// Returns true if leadership was acquired.
    #[must_use]
    pub const fn is_leader(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }

    /// Returns the lease token if leadership was acquired.
    #[must_use]
    pub fn lease_token(&self) -> Option<&str> {
        match self {
            Self::Acquired { lease_token, .. } => Some(lease_token),
            Self::NotLeader { .. } => None,
        }
    }
}

/// Result of a lease renewal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalResult {
    /// The lease was extended.
    Renewed {
        /// New time until expiry.
        lease_duration: Duration,
    },
    /// The lease expired or was taken over.
    Lost,
    /// The token does not match the current lease.
    InvalidToken,
}

impl RenewalResult {
    /// Returns true if the lease was extended.
    #[must_use]
    pub const fn is_renewed(&self) -> bool {
        matches!(self, Self::Renewed { .. })
    }
}

/// Lease-based leader election.
///
/// ## Example Usage
///
/// ```rust
/// use twinsync_reconcile::leader::{InMemoryLeaderElector, LeaderElector, SYNC_LOCK_KEY};
///
/// # tokio_test::block_on(async {
/// let elector = InMemoryLeaderElector::default();
/// let result = elector.try_acquire(SYNC_LOCK_KEY, "replica-1").await?;
/// if let Some(token) = result.lease_token() {
///     // run the pass, then hand the lease back
///     elector.release(SYNC_LOCK_KEY, token).await?;
/// }
/// # Ok::<_, twinsync_reconcile::Error>(())
/// # }).unwrap();
/// ```
#[async_trait]
pub trait LeaderElector: Send + Sync {
    /// Attempts to acquire the lease for `lock_key` on behalf of `instance_id`.
    ///
    /// Re-acquiring a lease this instance already holds issues a fresh token.
    async fn try_acquire(&self, lock_key: &str, instance_id: &str) -> Result<LeadershipResult>;

    /// Extends a held lease without rotating its token.
    async fn renew(&self, lock_key: &str, lease_token: &str) -> Result<RenewalResult>;

    /// Gives a lease back. Returns false if the token no longer matches.
    async fn release(&self, lock_key: &str, lease_token: &str) -> Result<bool>;

    /// Returns the instance holding an unexpired lease, if any.
    async fn current_leader(&self, lock_key: &str) -> Result<Option<String>>;
}
