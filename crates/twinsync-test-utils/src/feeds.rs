//! Feeds for failure and pacing tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use twinsync_core::{Error, Metadata, Result};
use twinsync_reconcile::feed::{MetadataFeed, VecFeed};

/// Yields its records, then fails instead of ending.
#[derive(Debug)]
pub struct FailingFeed {
    records: VecFeed,
    message: String,
}

impl FailingFeed {
    /// Fails with a storage error carrying `message` after `records`.
    pub fn after(records: Vec<Metadata>, message: impl Into<String>) -> Self {
        Self {
            records: VecFeed::new(records),
            message: message.into(),
        }
    }
}

#[async_trait]
impl MetadataFeed for FailingFeed {
    async fn next(&mut self) -> Result<Option<Metadata>> {
        match self.records.next().await? {
            Some(record) => Ok(Some(record)),
            None => Err(Error::storage(self.message.clone())),
        }
    }
}

/// Wraps a feed and counts how many records were pulled from it.
#[derive(Debug)]
pub struct CountingFeed<F> {
    inner: F,
    reads: Arc<AtomicUsize>,
}

impl<F: MetadataFeed> CountingFeed<F> {
    /// Wraps `inner`; the returned counter stays readable after the feed moves.
    pub fn new(inner: F) -> (Self, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                reads: Arc::clone(&reads),
            },
            reads,
        )
    }
}

#[async_trait]
impl<F: MetadataFeed> MetadataFeed for CountingFeed<F> {
    async fn next(&mut self) -> Result<Option<Metadata>> {
        let record = self.inner.next().await?;
        if record.is_some() {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }
        Ok(record)
    }
}
