//! Inconsistency reporting.
//!
//! The [`InconsistencyReporter`] consumes the ordered verdict stream of one
//! pass and exposes it three ways:
//!
//! - [`inconsistencies`](InconsistencyReporter::inconsistencies) /
//!   [`entity_ids`](InconsistencyReporter::entity_ids): lazy, ordered streams
//! - [`collect_report`](InconsistencyReporter::collect_report): a
//!   serializable [`PassReport`]
//! - [`drain_into`](InconsistencyReporter::drain_into): push into an
//!   [`InconsistencySink`]
//!
//! A pass that fails produces no report. Streams end with the error instead,
//! and sinks are never told the pass finished.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};

use twinsync_core::{EntityId, PassId};

use crate::error::Result;
use crate::merge::CandidateKind;
use crate::metrics::SyncMetrics;
use crate::verdict::{ConsistentReason, InconsistencyKind, Outcome, UnconfirmedRevision, Verdict};

/// One reported entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inconsistency {
    /// The entity to repair.
    pub entity_id: EntityId,
    /// What is wrong with it.
    #[serde(flatten)]
    pub kind: InconsistencyKind,
}

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    /// Records read from the persisted feed.
    pub persisted_records: u64,
    /// Records read from the indexed feed.
    pub indexed_records: u64,
    /// Entities present in both feeds.
    pub paired: u64,
    /// Entities present only in the persisted feed.
    pub missing_from_index: u64,
    /// Entities present only in the indexed feed.
    pub orphaned_in_index: u64,
    /// Discrepancies explained by a recent index write.
    pub suppressed: u64,
    /// Policy revision round trips issued.
    pub verifications_issued: u64,
    /// Round trips that confirmed the indexed revision.
    pub verifications_confirmed: u64,
    /// Round trips answered with a different revision.
    pub verifications_mismatched: u64,
    /// Round trips that hit the request timeout.
    pub verifications_timed_out: u64,
    /// Round trips that failed.
    pub verifications_failed: u64,
    /// Reported inconsistencies per kind label.
    pub inconsistencies: BTreeMap<String, u64>,
}

impl PassStats {
    /// Folds one verdict into the counters.
    pub fn record(&mut self, verdict: &Verdict) {
        match verdict.candidate {
            CandidateKind::Paired => {
                self.paired += 1;
                self.persisted_records += 1;
                self.indexed_records += 1;
            }
            CandidateKind::MissingFromIndex => {
                self.missing_from_index += 1;
                self.persisted_records += 1;
            }
            CandidateKind::OrphanedInIndex => {
                self.orphaned_in_index += 1;
                self.indexed_records += 1;
            }
        }

        match &verdict.outcome {
            Outcome::Consistent(ConsistentReason::UpToDate) => {}
            Outcome::Consistent(ConsistentReason::WithinTolerance) => self.suppressed += 1,
            Outcome::Consistent(ConsistentReason::ConfirmedByAuthority) => {
                self.verifications_issued += 1;
                self.verifications_confirmed += 1;
            }
            Outcome::Inconsistent(kind) => {
                if let InconsistencyKind::PolicyRevisionMismatch { cause, .. } = kind {
                    self.verifications_issued += 1;
                    match cause {
                        UnconfirmedRevision::Mismatch { .. } => self.verifications_mismatched += 1,
                        UnconfirmedRevision::TimedOut => self.verifications_timed_out += 1,
                        UnconfirmedRevision::Failed { .. } => self.verifications_failed += 1,
                    }
                }
                *self
                    .inconsistencies
                    .entry(kind.as_str().to_string())
                    .or_default() += 1;
            }
        }
    }

    /// Total number of reported inconsistencies.
    #[must_use]
    pub fn total_inconsistencies(&self) -> u64 {
        self.inconsistencies.values().sum()
    }
}

/// Identity and timing of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassContext {
    /// The pass identifier.
    pub pass_id: PassId,
    /// The "now" used for tolerance decisions.
    pub reference_time: DateTime<Utc>,
    /// Wall-clock start of the pass.
    pub started_at: DateTime<Utc>,
}

/// Result of a completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// The pass identifier.
    pub pass_id: PassId,
    /// The "now" used for tolerance decisions.
    pub reference_time: DateTime<Utc>,
    /// Wall-clock start of the pass.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of the pass.
    pub finished_at: DateTime<Utc>,
    /// Every reported entity, ascending by ID.
    pub inconsistencies: Vec<Inconsistency>,
    /// Pass counters.
    pub stats: PassStats,
}

impl PassReport {
    /// Returns the reported IDs in order.
    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.inconsistencies.iter().map(|i| &i.entity_id)
    }

    /// Returns true if nothing was reported.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

/// Downstream consumer of reported inconsistencies (e.g. a re-index queue).
#[async_trait]
pub trait InconsistencySink: Send + Sync {
    /// Receives one inconsistency; called in ascending ID order.
    async fn report(&self, inconsistency: Inconsistency) -> twinsync_core::Result<()>;

    /// Called once after the last inconsistency of a completed pass.
    async fn finish(&self, stats: &PassStats) -> twinsync_core::Result<()>;
}

/// Sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    received: Mutex<Vec<Inconsistency>>,
    finished: Mutex<Option<PassStats>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns what was reported so far.
    #[must_use]
    pub fn received(&self) -> Vec<Inconsistency> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Returns the stats passed to `finish`, if it was called.
    #[must_use]
    pub fn finished(&self) -> Option<PassStats> {
        self.finished.lock().ok().and_then(|f| f.clone())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> twinsync_core::Error {
    twinsync_core::Error::Internal {
        message: "memory sink lock poisoned".to_string(),
    }
}

#[async_trait]
impl InconsistencySink for MemorySink {
    async fn report(&self, inconsistency: Inconsistency) -> twinsync_core::Result<()> {
        self.received.lock().map_err(poisoned)?.push(inconsistency);
        Ok(())
    }

    async fn finish(&self, stats: &PassStats) -> twinsync_core::Result<()> {
        *self.finished.lock().map_err(poisoned)? = Some(stats.clone());
        Ok(())
    }
}

/// Turns the verdict stream of one pass into reported inconsistencies.
pub struct InconsistencyReporter<S> {
    context: PassContext,
    verdicts: S,
    metrics: SyncMetrics,
}

impl<S> std::fmt::Debug for InconsistencyReporter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InconsistencyReporter")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<S> InconsistencyReporter<S>
where
    S: Stream<Item = Result<Verdict>> + Send,
{
    /// Wraps the verdict stream of the pass described by `context`.
    pub fn new(context: PassContext, verdicts: S) -> Self {
        Self {
            context,
            verdicts,
            metrics: SyncMetrics::new(),
        }
    }

    /// Returns the pass context.
    #[must_use]
    pub const fn context(&self) -> &PassContext {
        &self.context
    }

    /// Lazy stream of inconsistencies in ascending ID order.
    pub fn inconsistencies(self) -> impl Stream<Item = Result<Inconsistency>> + Send {
        let metrics = self.metrics;
        self.verdicts.try_filter_map(move |verdict| {
            futures::future::ready(Ok(observe(&metrics, verdict)))
        })
    }

    /// Lazy stream of inconsistent entity IDs in ascending order.
    pub fn entity_ids(self) -> impl Stream<Item = Result<EntityId>> + Send {
        self.inconsistencies().map_ok(|i| i.entity_id)
    }

    /// Runs the pass to completion and collects the report.
    ///
    /// # Errors
    ///
    /// Returns the first pass-level error; nothing is reported in that case.
    pub async fn collect_report(self) -> Result<PassReport> {
        let Self {
            context,
            verdicts,
            metrics,
        } = self;
        let mut verdicts = std::pin::pin!(verdicts);

        let mut stats = PassStats::default();
        let mut inconsistencies = Vec::new();
        while let Some(verdict) = verdicts.try_next().await? {
            stats.record(&verdict);
            inconsistencies.extend(observe(&metrics, verdict));
        }

        Ok(PassReport {
            pass_id: context.pass_id,
            reference_time: context.reference_time,
            started_at: context.started_at,
            finished_at: Utc::now(),
            inconsistencies,
            stats,
        })
    }

    /// Pushes every inconsistency into `sink`, then calls
    /// [`InconsistencySink::finish`].
    ///
    /// # Errors
    ///
    /// Returns the first pass-level or sink error. `finish` is not called then.
    pub async fn drain_into(self, sink: &dyn InconsistencySink) -> Result<PassStats> {
        let Self {
            verdicts, metrics, ..
        } = self;
        let mut verdicts = std::pin::pin!(verdicts);

        let mut stats = PassStats::default();
        while let Some(verdict) = verdicts.try_next().await? {
            stats.record(&verdict);
            if let Some(inconsistency) = observe(&metrics, verdict) {
                sink.report(inconsistency).await?;
            }
        }
        sink.finish(&stats).await?;
        Ok(stats)
    }
}

/// Logs and counts one verdict; returns it as an inconsistency if reported.
fn observe(metrics: &SyncMetrics, verdict: Verdict) -> Option<Inconsistency> {
    match verdict.outcome {
        Outcome::Consistent(ConsistentReason::UpToDate) => None,
        Outcome::Consistent(reason) => {
            tracing::trace!(entity_id = %verdict.entity_id, reason = reason.as_str(), "discrepancy suppressed");
            metrics.record_suppressed(reason.as_str());
            None
        }
        Outcome::Inconsistent(kind) => {
            tracing::debug!(entity_id = %verdict.entity_id, kind = kind.as_str(), "inconsistency");
            metrics.record_inconsistency(kind.as_str());
            Some(Inconsistency {
                entity_id: verdict.entity_id,
                kind,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::feed::FeedSide;
    use twinsync_core::PolicyRef;

    fn verdict(id: &str, candidate: CandidateKind, outcome: Outcome) -> Verdict {
        Verdict {
            entity_id: EntityId::new(id).unwrap(),
            candidate,
            outcome,
        }
    }

    fn sample() -> Vec<Result<Verdict>> {
        vec![
            Ok(verdict(
                "a",
                CandidateKind::MissingFromIndex,
                Outcome::Inconsistent(InconsistencyKind::MissingFromIndex),
            )),
            Ok(verdict(
                "b",
                CandidateKind::Paired,
                Outcome::Consistent(ConsistentReason::WithinTolerance),
            )),
            Ok(verdict(
                "c",
                CandidateKind::Paired,
                Outcome::Consistent(ConsistentReason::ConfirmedByAuthority),
            )),
            Ok(verdict(
                "e",
                CandidateKind::Paired,
                Outcome::Inconsistent(InconsistencyKind::PolicyRevisionMismatch {
                    policy_ref: PolicyRef::new("x:p").unwrap(),
                    persisted: 0,
                    indexed: 3,
                    cause: UnconfirmedRevision::TimedOut,
                }),
            )),
            Ok(verdict(
                "f",
                CandidateKind::OrphanedInIndex,
                Outcome::Inconsistent(InconsistencyKind::OrphanedInIndex),
            )),
        ]
    }

    fn context() -> PassContext {
        PassContext {
            pass_id: PassId::generate(),
            reference_time: Utc::now(),
            started_at: Utc::now(),
        }
    }

    fn reporter(
        verdicts: Vec<Result<Verdict>>,
    ) -> InconsistencyReporter<impl Stream<Item = Result<Verdict>> + Send> {
        InconsistencyReporter::new(context(), futures::stream::iter(verdicts))
    }

    #[tokio::test]
    async fn entity_ids_are_ordered_and_filtered() {
        let ids: Vec<String> = reporter(sample())
            .entity_ids()
            .map_ok(String::from)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids, vec!["a", "e", "f"]);
    }

    #[tokio::test]
    async fn report_counts_every_verdict() {
        let report = reporter(sample()).collect_report().await.unwrap();
        let stats = &report.stats;

        assert_eq!(stats.persisted_records, 4);
        assert_eq!(stats.indexed_records, 4);
        assert_eq!(stats.paired, 3);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.verifications_issued, 2);
        assert_eq!(stats.verifications_confirmed, 1);
        assert_eq!(stats.verifications_timed_out, 1);
        assert_eq!(stats.total_inconsistencies(), 3);
        assert_eq!(stats.inconsistencies.get("orphaned_in_index"), Some(&1));
        assert_eq!(
            report.entity_ids().map(EntityId::as_str).collect::<Vec<_>>(),
            vec!["a", "e", "f"]
        );
    }

    #[tokio::test]
    async fn failed_pass_yields_no_report() {
        let mut verdicts = sample();
        verdicts.insert(
            2,
            Err(Error::feed(
                FeedSide::Indexed,
                twinsync_core::Error::storage("cursor expired"),
            )),
        );
        assert!(reporter(verdicts).collect_report().await.is_err());
    }

    #[tokio::test]
    async fn sink_receives_inconsistencies_then_finish() {
        let sink = MemorySink::new();
        let stats = reporter(sample()).drain_into(&sink).await.unwrap();

        let received: Vec<_> = sink
            .received()
            .into_iter()
            .map(|i| i.entity_id.to_string())
            .collect();
        assert_eq!(received, vec!["a", "e", "f"]);
        assert_eq!(sink.finished(), Some(stats));
    }

    #[tokio::test]
    async fn sink_is_not_finished_on_failure() {
        let mut verdicts = sample();
        verdicts.push(Err(Error::Cancelled));
        let sink = MemorySink::new();

        assert!(reporter(verdicts).drain_into(&sink).await.is_err());
        assert_eq!(sink.received().len(), 3);
        assert!(sink.finished().is_none());
    }

    #[test]
    fn inconsistency_serializes_flat() {
        let inconsistency = Inconsistency {
            entity_id: EntityId::new("c").unwrap(),
            kind: InconsistencyKind::RevisionMismatch {
                persisted: 3,
                indexed: 2,
            },
        };
        let json = serde_json::to_value(&inconsistency).unwrap();
        assert_eq!(json["entity_id"], "c");
        assert_eq!(json["kind"], "revision_mismatch");
        assert_eq!(json["persisted"], 3);
    }
}
