//! Per-candidate verdicts.
//!
//! Every merge candidate ends in exactly one [`Verdict`]: either consistent
//! (with the reason it was not reported) or an inconsistency of a given kind.
//! Only inconsistent verdicts reach the report.

use serde::{Deserialize, Serialize};

use twinsync_core::{EntityId, PolicyRef};

use crate::merge::CandidateKind;

/// Final classification of one merge candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// The entity the candidate is about.
    pub entity_id: EntityId,
    /// Shape of the candidate.
    pub candidate: CandidateKind,
    /// What was decided.
    pub outcome: Outcome,
}

impl Verdict {
    /// Returns the inconsistency kind if this verdict is reported.
    #[must_use]
    pub fn inconsistency(&self) -> Option<&InconsistencyKind> {
        match &self.outcome {
            Outcome::Inconsistent(kind) => Some(kind),
            Outcome::Consistent(_) => None,
        }
    }

    /// Returns true if this verdict belongs in the report.
    #[must_use]
    pub fn is_inconsistent(&self) -> bool {
        self.inconsistency().is_some()
    }
}

/// Consistent or not, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing to report.
    Consistent(ConsistentReason),
    /// The entity must be reported.
    Inconsistent(InconsistencyKind),
}

/// Why a candidate was not reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistentReason {
    /// Both sides agree.
    UpToDate,
    /// The index wrote the record recently; the discrepancy may still resolve.
    WithinTolerance,
    /// The policy authority confirmed the indexed policy revision.
    ConfirmedByAuthority,
}

impl ConsistentReason {
    /// Returns the metrics label for this reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpToDate => "up_to_date",
            Self::WithinTolerance => "within_tolerance",
            Self::ConfirmedByAuthority => "confirmed_by_authority",
        }
    }
}

/// Kind of a reported inconsistency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Persisted but never indexed.
    MissingFromIndex,
    /// Indexed but no longer persisted, and not written recently.
    OrphanedInIndex,
    /// The index holds an older entity revision.
    RevisionMismatch {
        /// Persisted entity revision.
        persisted: u64,
        /// Indexed entity revision.
        indexed: u64,
    },
    /// The two sides reference different policies.
    PolicyRefMismatch {
        /// Persisted policy reference.
        #[serde(skip_serializing_if = "Option::is_none")]
        persisted: Option<PolicyRef>,
        /// Indexed policy reference.
        #[serde(skip_serializing_if = "Option::is_none")]
        indexed: Option<PolicyRef>,
    },
    /// Same policy, different revisions, and the authority did not confirm
    /// the indexed one.
    PolicyRevisionMismatch {
        /// The shared policy reference.
        policy_ref: PolicyRef,
        /// Persisted policy revision.
        persisted: u64,
        /// Indexed policy revision.
        indexed: u64,
        /// Why the indexed revision stands unconfirmed.
        cause: UnconfirmedRevision,
    },
}

impl InconsistencyKind {
    /// Returns the metrics label for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingFromIndex => "missing_from_index",
            Self::OrphanedInIndex => "orphaned_in_index",
            Self::RevisionMismatch { .. } => "revision_mismatch",
            Self::PolicyRefMismatch { .. } => "policy_ref_mismatch",
            Self::PolicyRevisionMismatch { .. } => "policy_revision_mismatch",
        }
    }
}

/// Outcome of a policy revision round trip that did not confirm the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum UnconfirmedRevision {
    /// The authority answered with a different revision.
    Mismatch {
        /// The authoritative revision.
        authoritative: u64,
    },
    /// No answer within the request timeout.
    TimedOut,
    /// The authority reported an error.
    Failed {
        /// The error message.
        message: String,
    },
}

impl UnconfirmedRevision {
    /// Returns the metrics label for this result.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mismatch { .. } => "mismatch",
            Self::TimedOut => "timed_out",
            Self::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_inconsistent_verdicts_are_reported() {
        let consistent = Verdict {
            entity_id: EntityId::new("x:1").unwrap(),
            candidate: CandidateKind::Paired,
            outcome: Outcome::Consistent(ConsistentReason::UpToDate),
        };
        assert!(!consistent.is_inconsistent());

        let missing = Verdict {
            entity_id: EntityId::new("x:2").unwrap(),
            candidate: CandidateKind::MissingFromIndex,
            outcome: Outcome::Inconsistent(InconsistencyKind::MissingFromIndex),
        };
        assert_eq!(
            missing.inconsistency().map(InconsistencyKind::as_str),
            Some("missing_from_index")
        );
    }

    #[test]
    fn policy_revision_mismatch_serializes_cause() {
        let kind = InconsistencyKind::PolicyRevisionMismatch {
            policy_ref: PolicyRef::new("x:p").unwrap(),
            persisted: 3,
            indexed: 5,
            cause: UnconfirmedRevision::TimedOut,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "policy_revision_mismatch");
        assert_eq!(json["policy_ref"], "x:p");
        assert_eq!(json["cause"]["result"], "timed_out");
    }

    #[test]
    fn outcome_is_tagged() {
        let outcome = Outcome::Consistent(ConsistentReason::WithinTolerance);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "consistent");
        assert_eq!(json["detail"], "within_tolerance");
    }
}
