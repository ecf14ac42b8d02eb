//! Observability metrics for background synchronization.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `twinsync_passes_total` | Counter | `status` | Finished passes by outcome |
//! | `twinsync_pass_duration_seconds` | Histogram | `status` | Wall time of one pass |
//! | `twinsync_candidates_total` | Counter | `candidate` | Merge candidates by shape |
//! | `twinsync_inconsistencies_total` | Counter | `kind` | Reported inconsistencies |
//! | `twinsync_suppressed_total` | Counter | `reason` | Discrepancies explained away |
//! | `twinsync_verifications_total` | Counter | `result` | Policy revision round trips |
//! | `twinsync_verification_duration_seconds` | Histogram | `result` | Round-trip latency |
//! | `twinsync_verifications_in_flight` | Gauge | - | Outstanding round trips |
//! | `twinsync_ordering_violations_total` | Counter | `side` | Non-ascending feed input |
//!
//! Metrics go through the `metrics` crate facade; without an installed recorder
//! every call is a no-op.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::feed::FeedSide;
use crate::merge::CandidateKind;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Finished passes by outcome.
    pub const PASSES_TOTAL: &str = "twinsync_passes_total";
    /// Histogram: Pass wall time in seconds.
    pub const PASS_DURATION_SECONDS: &str = "twinsync_pass_duration_seconds";
    /// Counter: Merge candidates by shape.
    pub const CANDIDATES_TOTAL: &str = "twinsync_candidates_total";
    /// Counter: Reported inconsistencies by kind.
    pub const INCONSISTENCIES_TOTAL: &str = "twinsync_inconsistencies_total";
    /// Counter: Discrepancies suppressed by tolerance or verification.
    pub const SUPPRESSED_TOTAL: &str = "twinsync_suppressed_total";
    /// Counter: Policy revision verifications by result.
    pub const VERIFICATIONS_TOTAL: &str = "twinsync_verifications_total";
    /// Histogram: Verification latency in seconds.
    pub const VERIFICATION_DURATION_SECONDS: &str = "twinsync_verification_duration_seconds";
    /// Gauge: Verifications currently outstanding.
    pub const VERIFICATIONS_IN_FLIGHT: &str = "twinsync_verifications_in_flight";
    /// Counter: Ordering violations detected in a feed.
    pub const ORDERING_VIOLATIONS_TOTAL: &str = "twinsync_ordering_violations_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Pass outcome (completed, failed, cancelled).
    pub const STATUS: &str = "status";
    /// Candidate shape (`missing_from_index`, `orphaned_in_index`, `paired`).
    pub const CANDIDATE: &str = "candidate";
    /// Inconsistency kind.
    pub const KIND: &str = "kind";
    /// Suppression reason (`within_tolerance`, `confirmed_by_authority`).
    pub const REASON: &str = "reason";
    /// Verification result (confirmed, mismatch, timed_out, failed).
    pub const RESULT: &str = "result";
    /// Feed side (persisted, indexed).
    pub const SIDE: &str = "side";
}

/// High-level interface for recording synchronization metrics.
///
/// Stateless and cheap to clone; every method forwards to the global recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncMetrics;

impl SyncMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records a finished pass.
    pub fn record_pass(&self, status: &'static str, duration: Duration) {
        counter!(names::PASSES_TOTAL, labels::STATUS => status).increment(1);
        histogram!(names::PASS_DURATION_SECONDS, labels::STATUS => status)
            .record(duration.as_secs_f64());
    }

    /// Records one merge candidate.
    pub fn record_candidate(&self, kind: CandidateKind) {
        counter!(names::CANDIDATES_TOTAL, labels::CANDIDATE => kind.as_str()).increment(1);
    }

    /// Records one reported inconsistency.
    pub fn record_inconsistency(&self, kind: &'static str) {
        counter!(names::INCONSISTENCIES_TOTAL, labels::KIND => kind).increment(1);
    }

    /// Records a discrepancy that was explained away.
    pub fn record_suppressed(&self, reason: &'static str) {
        counter!(names::SUPPRESSED_TOTAL, labels::REASON => reason).increment(1);
    }

    /// Records a finished verification round trip.
    pub fn record_verification(&self, result: &'static str, duration: Duration) {
        counter!(names::VERIFICATIONS_TOTAL, labels::RESULT => result).increment(1);
        histogram!(names::VERIFICATION_DURATION_SECONDS, labels::RESULT => result)
            .record(duration.as_secs_f64());
    }

    /// Records an ordering violation in one feed.
    pub fn record_ordering_violation(&self, side: FeedSide) {
        counter!(names::ORDERING_VIOLATIONS_TOTAL, labels::SIDE => side.as_str()).increment(1);
    }

    /// Marks one verification as outstanding until the guard drops.
    #[must_use]
    pub fn verification_in_flight(&self) -> InFlightGuard {
        gauge!(names::VERIFICATIONS_IN_FLIGHT).increment(1.0);
        InFlightGuard { _private: () }
    }
}

/// Decrements the in-flight verification gauge on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(names::VERIFICATIONS_IN_FLIGHT).decrement(1.0);
    }
}
