//! Error types for the background synchronization stream.
//!
//! Only pass-level failures are represented here. A verification that times out
//! or fails is not an error: it is classified as an inconsistency and the pass
//! carries on.

use twinsync_core::EntityId;

use crate::feed::FeedSide;

/// The result type used throughout twinsync-reconcile.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading from one of the metadata feeds failed.
    #[error("{side} feed failed: {source}")]
    Feed {
        /// Which feed failed.
        side: FeedSide,
        /// The collaborator's error.
        #[source]
        source: twinsync_core::Error,
    },

    /// A feed produced a non-ascending or duplicate entity ID.
    ///
    /// Only raised when strict ordering checks are enabled.
    #[error("{side} feed is not strictly ascending: '{next}' follows '{previous}'")]
    OrderingViolation {
        /// Which feed misbehaved.
        side: FeedSide,
        /// The last accepted entity ID.
        previous: EntityId,
        /// The offending entity ID.
        next: EntityId,
    },

    /// The pass was cancelled before it completed.
    #[error("reconciliation pass cancelled")]
    Cancelled,

    /// Configuration is invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The leadership backend failed.
    #[error("leadership error: {message}")]
    Leadership {
        /// Description of the failure.
        message: String,
    },

    /// An error from twinsync-core.
    #[error("core error: {0}")]
    Core(#[from] twinsync_core::Error),
}

impl Error {
    /// Wraps a collaborator error as a failure of the given feed.
    #[must_use]
    pub fn feed(side: FeedSide, source: twinsync_core::Error) -> Self {
        Self::Feed { side, source }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new leadership error.
    #[must_use]
    pub fn leadership(message: impl Into<String>) -> Self {
        Self::Leadership {
            message: message.into(),
        }
    }

    /// Returns true if this error means the pass was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
