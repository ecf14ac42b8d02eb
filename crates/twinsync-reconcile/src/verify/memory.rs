//! In-memory policy authority.
//!
//! [`StaticPolicyAuthority`] answers from a fixed table of policy revisions.
//! It backs offline replays (the CLI loads it from a JSON map) and tests.
//!
//! ## Limitations
//!
//! - Revisions never advance on their own
//! - Unknown policies answer with a not-found error

use std::collections::HashMap;

use async_trait::async_trait;

use twinsync_core::{Error, PolicyRef, Result};

use super::{PolicyAuthority, PolicyRevision};

/// Policy authority backed by a fixed revision table.
///
/// ## Example
///
/// ```rust
/// use twinsync_core::PolicyRef;
/// use twinsync_reconcile::verify::StaticPolicyAuthority;
///
/// let authority = StaticPolicyAuthority::new()
///     .with_revision(PolicyRef::new("org.acme:pumps").unwrap(), 6);
/// assert_eq!(authority.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticPolicyAuthority {
    revisions: HashMap<PolicyRef, u64>,
}

impl StaticPolicyAuthority {
    /// Creates an authority that knows no policies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the revision of one policy.
    #[must_use]
    pub fn with_revision(mut self, policy_ref: PolicyRef, revision: u64) -> Self {
        self.revisions.insert(policy_ref, revision);
        self
    }

    /// Returns the number of known policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Returns true if no policies are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

impl FromIterator<(PolicyRef, u64)> for StaticPolicyAuthority {
    fn from_iter<T: IntoIterator<Item = (PolicyRef, u64)>>(iter: T) -> Self {
        Self {
            revisions: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PolicyAuthority for StaticPolicyAuthority {
    async fn current_revision(&self, policy_ref: &PolicyRef) -> Result<PolicyRevision> {
        self.revisions
            .get(policy_ref)
            .map(|&current_revision| PolicyRevision {
                policy_ref: policy_ref.clone(),
                current_revision,
            })
            .ok_or_else(|| Error::not_found("policy", policy_ref.as_str()))
    }
}
