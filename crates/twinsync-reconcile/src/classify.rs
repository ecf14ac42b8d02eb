//! Candidate classification.
//!
//! Classification is synchronous and pure: given a candidate and the pass
//! tolerance window it either decides an [`Outcome`] or marks the candidate
//! ambiguous, in which case the [`RevisionVerifier`](crate::verify::RevisionVerifier)
//! settles it.
//!
//! Paired candidates are checked in this order:
//!
//! 1. Index behind on entity revision: consistent if the indexed write is
//!    recent, otherwise a revision mismatch. Checked first so a stale index is
//!    reported without a verification round trip.
//! 2. Policy references differ (including one side absent): policy reference
//!    mismatch, regardless of entity revisions.
//! 3. Same policy, different policy revisions: ambiguous.
//! 4. Otherwise up to date.
//!
//! One-sided candidates: an orphan whose indexed write is recent is suppressed.
//! A record missing from the index has no index write to be recent, so it is
//! always reported.

use twinsync_core::{EntityId, Metadata, PolicyRef};

use crate::merge::{Candidate, CandidateKind};
use crate::tolerance::ToleranceWindow;
use crate::verdict::{ConsistentReason, InconsistencyKind, Outcome, Verdict};

/// A paired candidate whose policy revisions differ under the same policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousPolicy {
    /// The shared policy reference.
    pub policy_ref: PolicyRef,
    /// Policy revision captured by the persisted side.
    pub persisted_revision: u64,
    /// Policy revision the index holds.
    pub indexed_revision: u64,
}

/// Result of classifying one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Decided without a round trip.
    Decided(Outcome),
    /// Needs the policy authority.
    Ambiguous(AmbiguousPolicy),
}

/// A classified candidate, still carrying its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    /// The entity the candidate is about.
    pub entity_id: EntityId,
    /// Shape of the candidate.
    pub candidate: CandidateKind,
    /// The classification.
    pub classification: Classification,
}

impl Classified {
    /// Turns a decided classification into a verdict.
    ///
    /// # Errors
    ///
    /// Returns the candidate as [`AmbiguousClassified`] when it still needs
    /// verification.
    pub fn into_verdict(self) -> Result<Verdict, AmbiguousClassified> {
        match self.classification {
            Classification::Decided(outcome) => Ok(Verdict {
                entity_id: self.entity_id,
                candidate: self.candidate,
                outcome,
            }),
            Classification::Ambiguous(policy) => Err(AmbiguousClassified {
                entity_id: self.entity_id,
                candidate: self.candidate,
                policy,
            }),
        }
    }
}

/// An ambiguous candidate awaiting verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousClassified {
    /// The entity the candidate is about.
    pub entity_id: EntityId,
    /// Shape of the candidate (always paired).
    pub candidate: CandidateKind,
    /// What to ask the authority.
    pub policy: AmbiguousPolicy,
}

impl AmbiguousClassified {
    /// Completes the verdict with the verifier's outcome.
    #[must_use]
    pub fn resolve(self, outcome: Outcome) -> Verdict {
        Verdict {
            entity_id: self.entity_id,
            candidate: self.candidate,
            outcome,
        }
    }
}

/// Stateless classifier for one pass.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    tolerance: ToleranceWindow,
}

impl Classifier {
    /// Creates a classifier using `tolerance` for recency decisions.
    #[must_use]
    pub const fn new(tolerance: ToleranceWindow) -> Self {
        Self { tolerance }
    }

    /// Returns the tolerance window in use.
    #[must_use]
    pub const fn tolerance(&self) -> &ToleranceWindow {
        &self.tolerance
    }

    /// Classifies one candidate.
    #[must_use]
    pub fn classify(&self, candidate: Candidate) -> Classified {
        let kind = candidate.kind();
        let (entity_id, classification) = match candidate {
            Candidate::MissingFromIndex(persisted) => (
                persisted.entity_id,
                Classification::Decided(Outcome::Inconsistent(InconsistencyKind::MissingFromIndex)),
            ),
            Candidate::OrphanedInIndex(indexed) => {
                let outcome = if self.tolerance.suppresses(&indexed) {
                    Outcome::Consistent(ConsistentReason::WithinTolerance)
                } else {
                    Outcome::Inconsistent(InconsistencyKind::OrphanedInIndex)
                };
                (indexed.entity_id, Classification::Decided(outcome))
            }
            Candidate::Paired { persisted, indexed } => {
                let classification = self.classify_paired(&persisted, &indexed);
                (persisted.entity_id, classification)
            }
        };

        Classified {
            entity_id,
            candidate: kind,
            classification,
        }
    }

    fn classify_paired(&self, persisted: &Metadata, indexed: &Metadata) -> Classification {
        if indexed.entity_revision < persisted.entity_revision {
            let outcome = if self.tolerance.suppresses(indexed) {
                Outcome::Consistent(ConsistentReason::WithinTolerance)
            } else {
                Outcome::Inconsistent(InconsistencyKind::RevisionMismatch {
                    persisted: persisted.entity_revision,
                    indexed: indexed.entity_revision,
                })
            };
            return Classification::Decided(outcome);
        }

        if !persisted.same_policy_ref(indexed) {
            return Classification::Decided(Outcome::Inconsistent(
                InconsistencyKind::PolicyRefMismatch {
                    persisted: persisted.policy_ref.clone(),
                    indexed: indexed.policy_ref.clone(),
                },
            ));
        }

        match (&persisted.policy_ref, persisted.policy_revision(), indexed.policy_revision()) {
            (Some(policy_ref), Some(p), Some(i)) if p != i => {
                Classification::Ambiguous(AmbiguousPolicy {
                    policy_ref: policy_ref.clone(),
                    persisted_revision: p,
                    indexed_revision: i,
                })
            }
            _ => Classification::Decided(Outcome::Consistent(ConsistentReason::UpToDate)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn classifier() -> Classifier {
        Classifier::new(ToleranceWindow::new(reference(), TimeDelta::seconds(60)))
    }

    fn record(id: &str, revision: u64) -> Metadata {
        Metadata::new(EntityId::new(id).unwrap(), revision)
    }

    fn policy(name: &str) -> PolicyRef {
        PolicyRef::new(name).unwrap()
    }

    fn decided(classified: Classified) -> Outcome {
        match classified.classification {
            Classification::Decided(outcome) => outcome,
            Classification::Ambiguous(a) => panic!("unexpected ambiguous: {a:?}"),
        }
    }

    fn paired(persisted: Metadata, indexed: Metadata) -> Candidate {
        Candidate::Paired { persisted, indexed }
    }

    #[test]
    fn missing_from_index_is_always_reported() {
        let outcome = decided(classifier().classify(Candidate::MissingFromIndex(record("a", 1))));
        assert_eq!(
            outcome,
            Outcome::Inconsistent(InconsistencyKind::MissingFromIndex)
        );
    }

    #[test]
    fn recent_orphan_is_suppressed() {
        let indexed = record("b", 1).observed_at(reference() - TimeDelta::seconds(10));
        let outcome = decided(classifier().classify(Candidate::OrphanedInIndex(indexed)));
        assert_eq!(
            outcome,
            Outcome::Consistent(ConsistentReason::WithinTolerance)
        );
    }

    #[test]
    fn stale_or_untimestamped_orphan_is_reported() {
        let stale = record("b", 1).observed_at(reference() - TimeDelta::hours(1));
        let outcome = decided(classifier().classify(Candidate::OrphanedInIndex(stale)));
        assert_eq!(outcome, Outcome::Inconsistent(InconsistencyKind::OrphanedInIndex));

        let outcome = decided(classifier().classify(Candidate::OrphanedInIndex(record("b", 1))));
        assert_eq!(outcome, Outcome::Inconsistent(InconsistencyKind::OrphanedInIndex));
    }

    #[test]
    fn index_behind_is_tolerated_when_recent() {
        let indexed = record("c", 2).observed_at(reference());
        let outcome = decided(classifier().classify(paired(record("c", 3), indexed)));
        assert_eq!(
            outcome,
            Outcome::Consistent(ConsistentReason::WithinTolerance)
        );
    }

    #[test]
    fn index_behind_is_reported_before_policy_checks() {
        let persisted = record("c", 3).with_policy(policy("x:p"), 0);
        let indexed = record("c", 2).with_policy(policy("x:p"), 1);
        let outcome = decided(classifier().classify(paired(persisted, indexed)));
        assert_eq!(
            outcome,
            Outcome::Inconsistent(InconsistencyKind::RevisionMismatch {
                persisted: 3,
                indexed: 2
            })
        );
    }

    #[test]
    fn policy_ref_mismatch_fires_even_when_index_is_ahead() {
        let persisted = record("d", 3).with_policy(policy("x:p"), 0);
        let indexed = record("d", 4).with_policy(policy("x:q"), 0);
        let outcome = decided(classifier().classify(paired(persisted, indexed)));
        assert!(matches!(
            outcome,
            Outcome::Inconsistent(InconsistencyKind::PolicyRefMismatch { .. })
        ));

        let persisted = record("d", 3);
        let indexed = record("d", 3).with_policy(policy("x:p"), 0);
        let outcome = decided(classifier().classify(paired(persisted, indexed)));
        assert_eq!(
            outcome,
            Outcome::Inconsistent(InconsistencyKind::PolicyRefMismatch {
                persisted: None,
                indexed: Some(policy("x:p")),
            })
        );
    }

    #[test]
    fn differing_policy_revision_is_ambiguous() {
        let persisted = record("e", 3).with_policy(policy("x:p"), 0);
        let indexed = record("e", 5).with_policy(policy("x:p"), 3);
        let classified = classifier().classify(paired(persisted, indexed));
        assert_eq!(
            classified.classification,
            Classification::Ambiguous(AmbiguousPolicy {
                policy_ref: policy("x:p"),
                persisted_revision: 0,
                indexed_revision: 3,
            })
        );
        assert!(classified.into_verdict().is_err());
    }

    #[test]
    fn identical_records_are_up_to_date() {
        let persisted = record("f", 3).with_policy(policy("x:p"), 2);
        let outcome = decided(classifier().classify(paired(persisted.clone(), persisted)));
        assert_eq!(outcome, Outcome::Consistent(ConsistentReason::UpToDate));
    }

    #[test]
    fn policy_revision_is_ignored_without_policy() {
        let mut persisted = record("g", 3);
        persisted.policy_revision = 1;
        let mut indexed = record("g", 3);
        indexed.policy_revision = 7;
        let outcome = decided(classifier().classify(paired(persisted, indexed)));
        assert_eq!(outcome, Outcome::Consistent(ConsistentReason::UpToDate));
    }
}
