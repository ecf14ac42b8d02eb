//! The tolerance window.
//!
//! The index is eventually consistent: a record it wrote recently may not yet
//! reflect the latest persisted revision. A discrepancy is therefore ignored
//! when the indexed side's `observed_at` lies within `window` of the pass
//! reference time.
//!
//! The boundary is inclusive: a timestamp exactly `window` before the reference
//! time still counts as recent. Timestamps after the reference time are recent.
//! A missing timestamp is never recent.

use chrono::{DateTime, TimeDelta, Utc};

use twinsync_core::Metadata;

/// Recency test anchored at a fixed reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToleranceWindow {
    reference_time: DateTime<Utc>,
    window: TimeDelta,
}

impl ToleranceWindow {
    /// Creates a window of `window` length ending at `reference_time`.
    #[must_use]
    pub const fn new(reference_time: DateTime<Utc>, window: TimeDelta) -> Self {
        Self {
            reference_time,
            window,
        }
    }

    /// Returns the reference time.
    #[must_use]
    pub const fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    /// Returns the oldest timestamp that still counts as recent.
    #[must_use]
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.reference_time
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns true if `observed_at` is present and within the window.
    #[must_use]
    pub fn is_recent(&self, observed_at: Option<DateTime<Utc>>) -> bool {
        observed_at.is_some_and(|ts| ts >= self.cutoff())
    }

    /// Returns true if the indexed record was written recently enough to
    /// explain a discrepancy.
    #[must_use]
    pub fn suppresses(&self, indexed: &Metadata) -> bool {
        self.is_recent(indexed.observed_at)
    }
}
