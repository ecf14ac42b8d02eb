//! The background synchronization pass.
//!
//! ```text
//!  persisted feed ──(throttle)──┐
//!                               ├─► StreamMerger ─► Classifier ─► RevisionVerifier ─► InconsistencyReporter
//!  indexed feed ────────────────┘                     (sync)      (async, bounded)
//! ```
//!
//! Every candidate becomes a future: decided candidates complete immediately,
//! ambiguous ones wait on one policy round trip. The futures go through
//! [`TryStreamExt::try_buffered`], which keeps at most
//! `max_in_flight_verifications` of them outstanding and yields results in
//! candidate order. A slow verification therefore holds back later verdicts
//! and, through backpressure, further feed reads.
//!
//! A pass keeps no state between runs. Re-running after a failure is safe.

use std::sync::Arc;

use chrono::Utc;
use futures::{Stream, TryStreamExt};
use governor::Quota;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use twinsync_core::observability::pass_span;
use twinsync_core::{EntityId, PassId};

use crate::classify::Classifier;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::feed::MetadataFeed;
use crate::merge::StreamMerger;
use crate::metrics::SyncMetrics;
use crate::report::{InconsistencyReporter, InconsistencySink, PassContext, PassReport, PassStats};
use crate::throttle::ThrottledFeed;
use crate::tolerance::ToleranceWindow;
use crate::verdict::Verdict;
use crate::verify::{PolicyAuthority, RevisionVerifier};

/// Runs reconciliation passes between a persisted and an indexed feed.
///
/// ## Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use twinsync_core::{EntityId, Metadata};
/// use twinsync_reconcile::prelude::*;
///
/// # tokio_test::block_on(async {
/// let sync = BackgroundSync::new(
///     Arc::new(StaticPolicyAuthority::new()),
///     SyncConfig::default(),
/// )?;
///
/// let persisted = VecFeed::new(vec![Metadata::new(EntityId::new("a")?, 1)]);
/// let report = sync.run_pass(persisted, VecFeed::empty()).await?;
///
/// assert_eq!(report.entity_ids().map(EntityId::as_str).collect::<Vec<_>>(), ["a"]);
/// # Ok::<_, twinsync_reconcile::Error>(())
/// # }).unwrap();
/// ```
pub struct BackgroundSync {
    authority: Arc<dyn PolicyAuthority>,
    config: SyncConfig,
    throttle: Option<Quota>,
    metrics: SyncMetrics,
}

impl std::fmt::Debug for BackgroundSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundSync")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BackgroundSync {
    /// Creates a pass runner.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(authority: Arc<dyn PolicyAuthority>, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let throttle = config.throttle.as_ref().map(|t| t.quota()).transpose()?;
        Ok(Self {
            authority,
            config,
            throttle,
            metrics: SyncMetrics::new(),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fixes the identity and reference time of a new pass.
    ///
    /// The clock is read once here; the algorithm itself never reads it.
    #[must_use]
    pub fn begin_pass(&self) -> PassContext {
        let started_at = Utc::now();
        PassContext {
            pass_id: PassId::generate(),
            reference_time: self.config.reference_time.unwrap_or(started_at),
            started_at,
        }
    }

    /// Lazy, ordered verdict stream of one pass, one verdict per candidate.
    ///
    /// Nothing is read until the stream is polled. Dropping it abandons
    /// outstanding verifications.
    pub fn verdicts<P, I>(
        &self,
        context: &PassContext,
        persisted: P,
        indexed: I,
    ) -> impl Stream<Item = Result<Verdict>> + Send + 'static + use<P, I>
    where
        P: MetadataFeed + 'static,
        I: MetadataFeed + 'static,
    {
        let persisted: Box<dyn MetadataFeed> = match self.throttle {
            Some(quota) => Box::new(ThrottledFeed::new(persisted, quota)),
            None => Box::new(persisted),
        };
        let classifier = Classifier::new(ToleranceWindow::new(
            context.reference_time,
            self.config.tolerance_window(),
        ));
        let verifier = RevisionVerifier::new(
            Arc::clone(&self.authority),
            self.config.request_timeout(),
        );

        StreamMerger::new(persisted, indexed)
            .with_strict_ordering(self.config.strict_ordering)
            .into_stream()
            .map_ok(move |candidate| {
                let classified = classifier.classify(candidate);
                let verifier = verifier.clone();
                async move {
                    let verdict = match classified.into_verdict() {
                        Ok(verdict) => verdict,
                        Err(ambiguous) => {
                            let outcome = verifier.verify(&ambiguous.policy).await;
                            ambiguous.resolve(outcome)
                        }
                    };
                    Ok::<_, Error>(verdict)
                }
            })
            .try_buffered(self.config.max_in_flight_verifications)
    }

    /// Wraps the verdict stream of a new pass in a reporter.
    pub fn reporter<P, I>(
        &self,
        persisted: P,
        indexed: I,
    ) -> InconsistencyReporter<impl Stream<Item = Result<Verdict>> + Send + 'static + use<P, I>>
    where
        P: MetadataFeed + 'static,
        I: MetadataFeed + 'static,
    {
        let context = self.begin_pass();
        let verdicts = self.verdicts(&context, persisted, indexed);
        InconsistencyReporter::new(context, verdicts)
    }

    /// Lazy, ordered stream of the inconsistent entity IDs of one pass.
    pub fn inconsistent_ids<P, I>(
        &self,
        persisted: P,
        indexed: I,
    ) -> impl Stream<Item = Result<EntityId>> + Send + 'static + use<P, I>
    where
        P: MetadataFeed + 'static,
        I: MetadataFeed + 'static,
    {
        self.reporter(persisted, indexed).entity_ids()
    }

    /// Runs one pass to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Feed`] if either feed fails (no partial report), or
    /// [`Error::OrderingViolation`] under strict ordering.
    pub async fn run_pass<P, I>(&self, persisted: P, indexed: I) -> Result<PassReport>
    where
        P: MetadataFeed + 'static,
        I: MetadataFeed + 'static,
    {
        self.run_pass_cancellable(persisted, indexed, &CancellationToken::new())
            .await
    }

    /// Runs one pass unless `cancel` fires first.
    ///
    /// # Errors
    ///
    /// As [`run_pass`](Self::run_pass), plus [`Error::Cancelled`] when the
    /// token fires. Buffered and in-flight work is discarded.
    pub async fn run_pass_cancellable<P, I>(
        &self,
        persisted: P,
        indexed: I,
        cancel: &CancellationToken,
    ) -> Result<PassReport>
    where
        P: MetadataFeed + 'static,
        I: MetadataFeed + 'static,
    {
        let reporter = self.reporter(persisted, indexed);
        let context = *reporter.context();
        let span = pass_span(&context.pass_id, context.reference_time);
        let started = std::time::Instant::now();

        let result = async {
            tracing::info!(
                tolerance_window_ms = self.config.tolerance_window_ms,
                max_in_flight = self.config.max_in_flight_verifications,
                "pass started"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(Error::Cancelled),
                report = reporter.collect_report() => report,
            }
        }
        .instrument(span.clone())
        .await;

        span.in_scope(|| {
            self.finish_pass(result.as_ref().map(|r| &r.stats), started.elapsed());
        });
        result
    }

    /// Runs one pass, pushing inconsistencies into `sink` as they are decided.
    ///
    /// `sink.finish` is called only when the pass completes.
    ///
    /// # Errors
    ///
    /// As [`run_pass_cancellable`](Self::run_pass_cancellable), plus sink errors.
    pub async fn run_pass_into<P, I>(
        &self,
        persisted: P,
        indexed: I,
        sink: &dyn InconsistencySink,
        cancel: &CancellationToken,
    ) -> Result<PassStats>
    where
        P: MetadataFeed + 'static,
        I: MetadataFeed + 'static,
    {
        let reporter = self.reporter(persisted, indexed);
        let context = *reporter.context();
        let span = pass_span(&context.pass_id, context.reference_time);
        let started = std::time::Instant::now();

        let result = async {
            tracing::info!("pass started");
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(Error::Cancelled),
                stats = reporter.drain_into(sink) => stats,
            }
        }
        .instrument(span.clone())
        .await;

        span.in_scope(|| self.finish_pass(result.as_ref(), started.elapsed()));
        result
    }

    fn finish_pass(
        &self,
        result: std::result::Result<&PassStats, &Error>,
        elapsed: std::time::Duration,
    ) {
        let status = match result {
            Ok(stats) => {
                tracing::info!(
                    persisted = stats.persisted_records,
                    indexed = stats.indexed_records,
                    suppressed = stats.suppressed,
                    verifications = stats.verifications_issued,
                    inconsistencies = stats.total_inconsistencies(),
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "pass completed"
                );
                "completed"
            }
            Err(Error::Cancelled) => {
                tracing::info!("pass cancelled");
                "cancelled"
            }
            Err(e) => {
                tracing::error!(error = %e, "pass failed");
                "failed"
            }
        };
        self.metrics.record_pass(status, elapsed);
    }
}
