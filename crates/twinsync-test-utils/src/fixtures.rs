//! Pre-built fixtures for reconciliation scenarios.
//!
//! All timestamps are relative to [`reference_time`], and [`test_config`] pins
//! the pass to it, so tolerance decisions never depend on the wall clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use twinsync_core::{EntityId, Metadata, PolicyRef};
use twinsync_reconcile::config::SyncConfig;
use twinsync_reconcile::feed::VecFeed;
use twinsync_reconcile::verify::PolicyAuthority;
use twinsync_reconcile::BackgroundSync;

/// Tolerance window used by [`test_config`].
pub const TEST_TOLERANCE: Duration = Duration::from_secs(60);

/// The fixed "now" of every test pass: 2026-01-01T12:00:00Z.
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

/// Configuration pinned to [`reference_time`] with a [`TEST_TOLERANCE`] window.
pub fn test_config() -> SyncConfig {
    SyncConfig::default()
        .with_reference_time(reference_time())
        .with_tolerance_window(TEST_TOLERANCE)
}

/// Builds a pass runner over `authority`.
pub fn sync_with(authority: impl PolicyAuthority + 'static, config: SyncConfig) -> BackgroundSync {
    BackgroundSync::new(Arc::new(authority), config).expect("valid test config")
}

/// A validated entity ID.
pub fn entity_id(id: &str) -> EntityId {
    EntityId::new(id).expect("valid entity id")
}

/// A validated policy reference.
pub fn policy(name: &str) -> PolicyRef {
    PolicyRef::new(name).expect("valid policy ref")
}

/// A record without policy or timestamp.
pub fn entity(id: &str, revision: u64) -> Metadata {
    Metadata::new(entity_id(id), revision)
}

/// A record associated with `policy_name` at `policy_revision`.
pub fn entity_with_policy(
    id: &str,
    revision: u64,
    policy_name: &str,
    policy_revision: u64,
) -> Metadata {
    entity(id, revision).with_policy(policy(policy_name), policy_revision)
}

/// Stamps `record` as written by the index 10 seconds before the reference time.
pub fn recent(record: Metadata) -> Metadata {
    record.observed_at(reference_time() - TimeDelta::seconds(10))
}

/// Stamps `record` as written by the index one hour before the reference time.
pub fn stale(record: Metadata) -> Metadata {
    record.observed_at(reference_time() - TimeDelta::hours(1))
}

/// Stamps `record` as written `age` before the reference time.
pub fn aged(record: Metadata, age: TimeDelta) -> Metadata {
    record.observed_at(reference_time() - age)
}

/// An in-memory feed over `records` (must already be ascending).
pub fn feed(records: Vec<Metadata>) -> VecFeed {
    VecFeed::new(records)
}

/// `count` records `x:00000`.. at revision 1, ascending.
pub fn numbered_entities(count: usize) -> Vec<Metadata> {
    (0..count)
        .map(|i| entity(&format!("x:{i:05}"), 1))
        .collect()
}
