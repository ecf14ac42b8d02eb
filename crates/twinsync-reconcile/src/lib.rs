//! # twinsync-reconcile
//!
//! Background synchronization between an authoritative entity store and the
//! search index that mirrors it.
//!
//! One pass merges two ordered metadata feeds and reports every entity whose
//! index entry is missing, orphaned, or stale:
//!
//! - **Stream Merger**: O(n + m) merge-join of the two feeds by `entity_id`
//! - **Classifier**: decides each candidate, or marks it ambiguous
//! - **Tolerance Window**: ignores discrepancies explained by recent index writes
//! - **Revision Verifier**: settles ambiguous policy revisions with a bounded,
//!   timeout-protected round trip to the policy authority
//! - **Inconsistency Reporter**: the ordered list of entities to repair
//!
//! ## Guarantees
//!
//! - **Ordered**: inconsistencies are reported in ascending `entity_id` order
//! - **Bounded**: at most `max_in_flight_verifications` round trips are
//!   outstanding; nothing else is buffered
//! - **Stateless**: passes share no state; a failed pass can simply be re-run
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use twinsync_core::{EntityId, Metadata, PolicyRef};
//! use twinsync_reconcile::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let policy = PolicyRef::new("org.acme:pumps")?;
//! let authority = StaticPolicyAuthority::new().with_revision(policy.clone(), 2);
//! let sync = BackgroundSync::new(Arc::new(authority), SyncConfig::default())?;
//!
//! let persisted = VecFeed::new(vec![
//!     Metadata::new(EntityId::new("org.acme:pump-1")?, 4).with_policy(policy.clone(), 1),
//!     Metadata::new(EntityId::new("org.acme:pump-2")?, 1),
//! ]);
//! let indexed = VecFeed::new(vec![
//!     // Index saw a newer policy revision; the authority confirms it.
//!     Metadata::new(EntityId::new("org.acme:pump-1")?, 4).with_policy(policy, 2),
//! ]);
//!
//! let report = sync.run_pass(persisted, indexed).await?;
//! let ids: Vec<_> = report.entity_ids().map(EntityId::as_str).collect();
//! assert_eq!(ids, ["org.acme:pump-2"]);
//! # Ok::<_, twinsync_reconcile::Error>(())
//! # }).unwrap();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod classify;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod feed;
pub mod leader;
pub mod merge;
pub mod metrics;
pub mod report;
pub mod sync;
pub mod throttle;
pub mod tolerance;
pub mod verdict;
pub mod verify;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::SyncConfig;
    pub use crate::coordinator::{PassOutcome, SyncCoordinator};
    pub use crate::error::{Error, Result};
    pub use crate::feed::{
        FeedSide, JsonLinesFeed, MetadataFeed, PageSource, PagedFeed, StreamFeed, VecFeed,
    };
    pub use crate::leader::{InMemoryLeaderElector, LeaderElector, LeadershipResult};
    pub use crate::report::{
        Inconsistency, InconsistencyReporter, InconsistencySink, MemorySink, PassReport, PassStats,
    };
    pub use crate::sync::BackgroundSync;
    pub use crate::throttle::ThrottleConfig;
    pub use crate::verdict::{ConsistentReason, InconsistencyKind, Outcome, Verdict};
    pub use crate::verify::{PolicyAuthority, PolicyRevision, StaticPolicyAuthority};
}

pub use error::{Error, Result};
pub use sync::BackgroundSync;
