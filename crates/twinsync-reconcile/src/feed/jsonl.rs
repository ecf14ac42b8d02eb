//! JSON-lines feed: one [`Metadata`] record per line.
//!
//! Used to replay exported feeds offline. Blank lines are skipped; a line that
//! does not parse is a feed error.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use twinsync_core::{Error, Metadata, Result};

use super::MetadataFeed;

/// Feed reading JSON-encoded metadata records line by line.
#[derive(Debug)]
pub struct JsonLinesFeed<R> {
    lines: Lines<R>,
    line_no: u64,
    source_name: String,
}

impl<R> JsonLinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Wraps a buffered reader; `source_name` is used in error messages.
    pub fn new(reader: R, source_name: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            source_name: source_name.into(),
        }
    }
}

impl JsonLinesFeed<BufReader<File>> {
    /// Opens a JSON-lines file.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|e| {
            Error::storage_with_source(format!("failed to open {}", path.display()), e)
        })?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

#[async_trait]
impl<R> MetadataFeed for JsonLinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next(&mut self) -> Result<Option<Metadata>> {
        loop {
            let line = self.lines.next_line().await.map_err(|e| {
                Error::storage_with_source(format!("failed to read {}", self.source_name), e)
            })?;
            let Some(line) = line else {
                return Ok(None);
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return serde_json::from_str(trimmed)
                .map(Some)
                .map_err(|e| Error::Serialization {
                    message: format!("{}:{}: {e}", self.source_name, self.line_no),
                });
        }
    }
}
