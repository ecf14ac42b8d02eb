//! Out-of-band verification of ambiguous policy revisions.
//!
//! When both feeds reference the same policy but at different revisions, the
//! index may have legitimately observed a newer policy state than the
//! persisted snapshot. The [`RevisionVerifier`] asks the [`PolicyAuthority`]
//! for the current revision under a per-request deadline:
//!
//! - answer equals the indexed revision: consistent
//! - answer differs, the request times out, or it fails: inconsistent
//!
//! Verification failures never abort a pass; they resolve conservatively to a
//! policy revision mismatch.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use twinsync_core::observability::verification_span;
use twinsync_core::{PolicyRef, Result as CoreResult};

use crate::classify::AmbiguousPolicy;
use crate::metrics::SyncMetrics;
use crate::verdict::{ConsistentReason, InconsistencyKind, Outcome, UnconfirmedRevision};

pub use memory::StaticPolicyAuthority;

/// Authority response: the current revision of one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRevision {
    /// The policy the answer is about.
    pub policy_ref: PolicyRef,
    /// Its current authoritative revision.
    pub current_revision: u64,
}

/// Source of authoritative policy revisions.
///
/// ## Thread Safety
///
/// Requests for different candidates are issued concurrently, up to the
/// configured in-flight bound.
#[async_trait]
pub trait PolicyAuthority: Send + Sync {
    /// Returns the current revision of `policy_ref`.
    async fn current_revision(&self, policy_ref: &PolicyRef) -> CoreResult<PolicyRevision>;
}

#[async_trait]
impl<A: PolicyAuthority + ?Sized> PolicyAuthority for Arc<A> {
    async fn current_revision(&self, policy_ref: &PolicyRef) -> CoreResult<PolicyRevision> {
        (**self).current_revision(policy_ref).await
    }
}

/// Resolves ambiguous candidates against a [`PolicyAuthority`].
#[derive(Clone)]
pub struct RevisionVerifier {
    authority: Arc<dyn PolicyAuthority>,
    request_timeout: Duration,
    metrics: SyncMetrics,
}

impl std::fmt::Debug for RevisionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionVerifier")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl RevisionVerifier {
    /// Creates a verifier with the given per-request deadline.
    #[must_use]
    pub fn new(authority: Arc<dyn PolicyAuthority>, request_timeout: Duration) -> Self {
        Self {
            authority,
            request_timeout,
            metrics: SyncMetrics::new(),
        }
    }

    /// Returns the per-request deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Performs one round trip and classifies the candidate.
    ///
    /// Never fails: timeouts and authority errors become inconsistencies.
    pub async fn verify(&self, ambiguous: &AmbiguousPolicy) -> Outcome {
        let span = verification_span(&ambiguous.policy_ref);
        self.verify_inner(ambiguous).instrument(span).await
    }

    async fn verify_inner(&self, ambiguous: &AmbiguousPolicy) -> Outcome {
        let _in_flight = self.metrics.verification_in_flight();
        let started = tokio::time::Instant::now();

        let response = tokio::time::timeout(
            self.request_timeout,
            self.authority.current_revision(&ambiguous.policy_ref),
        )
        .await;

        let unconfirmed = match response {
            Ok(Ok(answer)) if answer.policy_ref != ambiguous.policy_ref => {
                tracing::warn!(
                    requested = %ambiguous.policy_ref,
                    answered = %answer.policy_ref,
                    "policy authority answered for a different policy"
                );
                UnconfirmedRevision::Failed {
                    message: format!("response addressed policy '{}'", answer.policy_ref),
                }
            }
            Ok(Ok(answer)) if answer.current_revision == ambiguous.indexed_revision => {
                tracing::debug!(
                    revision = answer.current_revision,
                    "indexed policy revision confirmed"
                );
                self.metrics
                    .record_verification("confirmed", started.elapsed());
                return Outcome::Consistent(ConsistentReason::ConfirmedByAuthority);
            }
            Ok(Ok(answer)) => {
                tracing::debug!(
                    authoritative = answer.current_revision,
                    indexed = ambiguous.indexed_revision,
                    "indexed policy revision is stale"
                );
                UnconfirmedRevision::Mismatch {
                    authoritative: answer.current_revision,
                }
            }
            Ok(Err(e)) if e.is_timeout() => {
                tracing::warn!(error = %e, "policy authority gave up on its own deadline");
                UnconfirmedRevision::TimedOut
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "policy revision request failed");
                UnconfirmedRevision::Failed {
                    message: e.to_string(),
                }
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
                    "policy revision request timed out"
                );
                UnconfirmedRevision::TimedOut
            }
        };

        self.metrics
            .record_verification(unconfirmed.as_str(), started.elapsed());

        Outcome::Inconsistent(InconsistencyKind::PolicyRevisionMismatch {
            policy_ref: ambiguous.policy_ref.clone(),
            persisted: ambiguous.persisted_revision,
            indexed: ambiguous.indexed_revision,
            cause: unconfirmed,
        })
    }
}
