//! Keyset-paginated feeds.
//!
//! Storage drivers expose ordered reads as pages: "the next `limit` records with
//! an ID strictly greater than `after`". [`PagedFeed`] turns that into a
//! record-at-a-time feed holding at most one page in memory.

use std::collections::VecDeque;

use async_trait::async_trait;

use twinsync_core::{EntityId, Metadata, Result};

use super::MetadataFeed;

/// Source of ordered metadata pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches up to `limit` records with IDs strictly greater than `after`
    /// (from the start when `after` is `None`), in ascending order.
    async fn fetch_page(&self, after: Option<&EntityId>, limit: usize) -> Result<Vec<Metadata>>;
}

/// Feed that reads a [`PageSource`] one page at a time.
///
/// The feed is exhausted once a page comes back shorter than the page size.
#[derive(Debug)]
pub struct PagedFeed<P> {
    source: P,
    page_size: usize,
    buffer: VecDeque<Metadata>,
    cursor: Option<EntityId>,
    exhausted: bool,
    pages_fetched: u64,
}

impl<P: PageSource> PagedFeed<P> {
    /// Creates a feed over `source`. A page size of zero is treated as one.
    pub fn new(source: P, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Number of pages fetched so far.
    #[must_use]
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }
}

#[async_trait]
impl<P: PageSource> MetadataFeed for PagedFeed<P> {
    async fn next(&mut self) -> Result<Option<Metadata>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .source
                .fetch_page(self.cursor.as_ref(), self.page_size)
                .await?;
            self.pages_fetched += 1;

            if page.len() < self.page_size {
                self.exhausted = true;
            }
            if let Some(last) = page.last() {
                self.cursor = Some(last.entity_id.clone());
            }
            tracing::trace!(
                records = page.len(),
                pages = self.pages_fetched,
                "fetched metadata page"
            );
            self.buffer.extend(page);
        }
    }
}
