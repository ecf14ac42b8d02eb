//! Metadata feeds consumed by the merger.
//!
//! A feed is a lazy, finite, pull-based sequence of [`Metadata`] records in
//! strictly ascending `entity_id` order. Storage drivers implement
//! [`MetadataFeed`] (directly, or through [`PagedFeed`] for keyset pagination);
//! the merger pulls one record at a time, so reads are paced by demand.
//!
//! ## Provided feeds
//!
//! - [`VecFeed`]: in-memory records (tests, replay)
//! - [`StreamFeed`]: adapts any `Stream<Item = Result<Metadata>>`
//! - [`PagedFeed`]: keyset-paginated reads from a [`PageSource`]
//! - [`JsonLinesFeed`]: one JSON record per line from any async reader

pub mod jsonl;
pub mod paged;

use std::fmt;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use twinsync_core::{Metadata, Result};

pub use jsonl::JsonLinesFeed;
pub use paged::{PageSource, PagedFeed};

/// Which side of the comparison a feed represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSide {
    /// The authoritative entity store.
    Persisted,
    /// The eventually-consistent search index.
    Indexed,
}

impl FeedSide {
    /// Returns the lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persisted => "persisted",
            Self::Indexed => "indexed",
        }
    }
}

impl fmt::Display for FeedSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered producer of metadata records for one pass.
///
/// Implementations must yield strictly ascending, duplicate-free entity IDs.
/// `Ok(None)` signals end of feed; an `Err` aborts the pass.
#[async_trait]
pub trait MetadataFeed: Send {
    /// Pulls the next record, or `None` once the feed is exhausted.
    async fn next(&mut self) -> Result<Option<Metadata>>;
}

#[async_trait]
impl<F: MetadataFeed + ?Sized> MetadataFeed for Box<F> {
    async fn next(&mut self) -> Result<Option<Metadata>> {
        (**self).next().await
    }
}

/// In-memory feed over pre-sorted records.
#[derive(Debug, Default)]
pub struct VecFeed {
    records: std::vec::IntoIter<Metadata>,
}

impl VecFeed {
    /// Creates a feed yielding `records` in the given order.
    #[must_use]
    pub fn new(records: Vec<Metadata>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }

    /// Creates an empty feed.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

impl From<Vec<Metadata>> for VecFeed {
    fn from(records: Vec<Metadata>) -> Self {
        Self::new(records)
    }
}

#[async_trait]
impl MetadataFeed for VecFeed {
    async fn next(&mut self) -> Result<Option<Metadata>> {
        Ok(self.records.next())
    }
}

/// Adapts a fallible stream of records into a feed.
#[derive(Debug)]
pub struct StreamFeed<S> {
    inner: S,
}

impl<S> StreamFeed<S>
where
    S: Stream<Item = Result<Metadata>> + Unpin + Send,
{
    /// Wraps `inner`.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> MetadataFeed for StreamFeed<S>
where
    S: Stream<Item = Result<Metadata>> + Unpin + Send,
{
    async fn next(&mut self) -> Result<Option<Metadata>> {
        self.inner.next().await.transpose()
    }
}
