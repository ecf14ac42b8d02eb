//! Merge-join of the persisted and indexed feeds.
//!
//! Both feeds arrive sorted by `entity_id`. The merger keeps one lookahead
//! record per side and compares their keys:
//!
//! ```text
//!  persisted < indexed  ──►  MissingFromIndex(persisted)   advance persisted
//!  persisted > indexed  ──►  OrphanedInIndex(indexed)      advance indexed
//!  persisted = indexed  ──►  Paired { persisted, indexed } advance both
//! ```
//!
//! Once one side is exhausted the other side drains as one-sided candidates.
//! The join is O(n + m) comparisons with O(1) memory beyond the two lookaheads.
//!
//! # Ordering precondition
//!
//! Feeds must be strictly ascending. The merger never re-sorts. It remembers the
//! previous ID per side and, on a violation, logs and counts it (debug builds
//! also assert), or fails the pass when strict ordering is enabled.

use std::cmp::Ordering;

use futures::Stream;
use serde::{Deserialize, Serialize};

use twinsync_core::{EntityId, Metadata};

use crate::error::{Error, Result};
use crate::feed::{FeedSide, MetadataFeed};
use crate::metrics::SyncMetrics;

/// Shape of a merge candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Present only in the persisted feed.
    MissingFromIndex,
    /// Present only in the indexed feed.
    OrphanedInIndex,
    /// Present in both feeds.
    Paired,
}

impl CandidateKind {
    /// Returns the metrics label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingFromIndex => "missing_from_index",
            Self::OrphanedInIndex => "orphaned_in_index",
            Self::Paired => "paired",
        }
    }
}

/// One position of the merge, before tolerance filtering or verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// The persisted record has no indexed counterpart.
    MissingFromIndex(Metadata),
    /// The indexed record has no persisted counterpart.
    OrphanedInIndex(Metadata),
    /// Both feeds hold a record for the same entity.
    Paired {
        /// Record from the authoritative store.
        persisted: Metadata,
        /// Record from the search index.
        indexed: Metadata,
    },
}

impl Candidate {
    /// Returns the join key of this candidate.
    #[must_use]
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::MissingFromIndex(record) | Self::OrphanedInIndex(record) => &record.entity_id,
            Self::Paired { persisted, .. } => &persisted.entity_id,
        }
    }

    /// Returns the shape of this candidate.
    #[must_use]
    pub const fn kind(&self) -> CandidateKind {
        match self {
            Self::MissingFromIndex(_) => CandidateKind::MissingFromIndex,
            Self::OrphanedInIndex(_) => CandidateKind::OrphanedInIndex,
            Self::Paired { .. } => CandidateKind::Paired,
        }
    }
}

/// One side of the merge: a feed plus its single-record lookahead.
struct SideCursor<F> {
    side: FeedSide,
    feed: F,
    lookahead: Option<Metadata>,
    last_id: Option<EntityId>,
    exhausted: bool,
}

impl<F: MetadataFeed> SideCursor<F> {
    fn new(side: FeedSide, feed: F) -> Self {
        Self {
            side,
            feed,
            lookahead: None,
            last_id: None,
            exhausted: false,
        }
    }

    /// Pulls the next record into the lookahead slot if it is empty.
    async fn fill(&mut self, strict: bool, metrics: &SyncMetrics) -> Result<()> {
        if self.lookahead.is_some() || self.exhausted {
            return Ok(());
        }

        let next = self
            .feed
            .next()
            .await
            .map_err(|e| Error::feed(self.side, e))?;

        let Some(record) = next else {
            self.exhausted = true;
            return Ok(());
        };

        if let Some(previous) = &self.last_id {
            if record.entity_id <= *previous {
                self.on_ordering_violation(previous, &record.entity_id, strict, metrics)?;
            }
        }
        self.last_id = Some(record.entity_id.clone());
        self.lookahead = Some(record);
        Ok(())
    }

    fn on_ordering_violation(
        &self,
        previous: &EntityId,
        next: &EntityId,
        strict: bool,
        metrics: &SyncMetrics,
    ) -> Result<()> {
        metrics.record_ordering_violation(self.side);
        tracing::error!(
            side = %self.side,
            previous = %previous,
            next = %next,
            "feed is not strictly ascending; classification of this key region is undefined"
        );

        if strict {
            return Err(Error::OrderingViolation {
                side: self.side,
                previous: previous.clone(),
                next: next.clone(),
            });
        }

        debug_assert!(
            false,
            "{} feed is not strictly ascending: '{next}' follows '{previous}'",
            self.side
        );
        Ok(())
    }

    fn peek(&self) -> Option<&Metadata> {
        self.lookahead.as_ref()
    }

    fn take(&mut self) -> Option<Metadata> {
        self.lookahead.take()
    }
}

/// Merge-join over a persisted and an indexed feed.
pub struct StreamMerger<P, I> {
    persisted: SideCursor<P>,
    indexed: SideCursor<I>,
    strict_ordering: bool,
    metrics: SyncMetrics,
}

impl<P, I> std::fmt::Debug for StreamMerger<P, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMerger")
            .field("persisted_exhausted", &self.persisted.exhausted)
            .field("indexed_exhausted", &self.indexed.exhausted)
            .field("strict_ordering", &self.strict_ordering)
            .finish_non_exhaustive()
    }
}

impl<P, I> StreamMerger<P, I>
where
    P: MetadataFeed,
    I: MetadataFeed,
{
    /// Creates a merger over the two feeds.
    pub fn new(persisted: P, indexed: I) -> Self {
        Self {
            persisted: SideCursor::new(FeedSide::Persisted, persisted),
            indexed: SideCursor::new(FeedSide::Indexed, indexed),
            strict_ordering: false,
            metrics: SyncMetrics::new(),
        }
    }

    /// Fails the pass on ordering violations instead of logging them.
    #[must_use]
    pub fn with_strict_ordering(mut self, strict: bool) -> Self {
        self.strict_ordering = strict;
        self
    }

    /// Produces the next candidate, or `None` once both feeds are exhausted.
    ///
    /// Reads at most one record from each feed per call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Feed`] if a feed read fails, or
    /// [`Error::OrderingViolation`] under strict ordering.
    pub async fn next_candidate(&mut self) -> Result<Option<Candidate>> {
        self.persisted
            .fill(self.strict_ordering, &self.metrics)
            .await?;
        self.indexed
            .fill(self.strict_ordering, &self.metrics)
            .await?;

        let step = match (self.persisted.peek(), self.indexed.peek()) {
            (None, None) => return Ok(None),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(p), Some(i)) => p.entity_id.cmp(&i.entity_id),
        };

        let candidate = match step {
            Ordering::Less => self.persisted.take().map(Candidate::MissingFromIndex),
            Ordering::Greater => self.indexed.take().map(Candidate::OrphanedInIndex),
            Ordering::Equal => self
                .persisted
                .take()
                .zip(self.indexed.take())
                .map(|(persisted, indexed)| Candidate::Paired { persisted, indexed }),
        };

        if let Some(candidate) = &candidate {
            self.metrics.record_candidate(candidate.kind());
        }
        Ok(candidate)
    }

    /// Turns the merger into a lazy stream of candidates.
    ///
    /// The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Candidate>> + Send
    where
        P: 'static,
        I: 'static,
    {
        futures::stream::try_unfold(self, |mut merger| async move {
            let candidate = merger.next_candidate().await?;
            Ok(candidate.map(|c| (c, merger)))
        })
    }
}
