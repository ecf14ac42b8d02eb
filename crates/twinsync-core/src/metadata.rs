//! The metadata record compared by the reconciler.
//!
//! One [`Metadata`] is produced per (entity, feed side) observation. The
//! persisted side reports what the authoritative store holds; the indexed side
//! reports what the search index last wrote, and additionally stamps
//! `observed_at` with the time of that write.
//!
//! # Wire format
//!
//! ```json
//! {"entityId":"x:1","entityRevision":3,"policyRef":"x:p","policyRevision":0,"observedAt":"2026-01-01T00:00:00Z"}
//! ```
//!
//! `policyRef`, `policyRevision` and `observedAt` are optional; absent fields are
//! omitted on output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{EntityId, PolicyRef};

/// Metadata of one entity as seen by one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Join key; unique and ascending within a feed.
    pub entity_id: EntityId,

    /// Entity revision; monotonically increasing on the authoritative side.
    pub entity_revision: u64,

    /// Associated policy, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_ref: Option<PolicyRef>,

    /// Policy revision; only meaningful when `policy_ref` is present.
    #[serde(default)]
    pub policy_revision: u64,

    /// When the index last wrote this record (indexed side only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Creates a record without policy association or observation time.
    #[must_use]
    pub fn new(entity_id: EntityId, entity_revision: u64) -> Self {
        Self {
            entity_id,
            entity_revision,
            policy_ref: None,
            policy_revision: 0,
            observed_at: None,
        }
    }

    /// Associates a policy at the given revision.
    #[must_use]
    pub fn with_policy(mut self, policy_ref: PolicyRef, policy_revision: u64) -> Self {
        self.policy_ref = Some(policy_ref);
        self.policy_revision = policy_revision;
        self
    }

    /// Sets the index write timestamp.
    #[must_use]
    pub fn observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = Some(observed_at);
        self
    }

    /// Returns the policy revision, or `None` if no policy is associated.
    #[must_use]
    pub fn policy_revision(&self) -> Option<u64> {
        self.policy_ref.as_ref().map(|_| self.policy_revision)
    }

    /// Returns true if both records reference the same policy (or both none).
    #[must_use]
    pub fn same_policy_ref(&self, other: &Self) -> bool {
        self.policy_ref == other.policy_ref
    }
}
