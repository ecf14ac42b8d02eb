//! Custom assertion helpers for integration tests.

use twinsync_core::EntityId;
use twinsync_reconcile::report::PassReport;
use twinsync_reconcile::verdict::InconsistencyKind;

/// Asserts that the report lists exactly `expected`, in that order.
///
/// # Panics
///
/// Panics if the reported IDs differ.
pub fn assert_reported(report: &PassReport, expected: &[&str]) {
    let actual: Vec<&str> = report.entity_ids().map(EntityId::as_str).collect();
    assert_eq!(
        actual, expected,
        "Expected report {expected:?}, but got {actual:?}"
    );
}

/// Asserts that `id` was reported with the given kind label.
///
/// # Panics
///
/// Panics if `id` is absent or was reported with another kind.
pub fn assert_reported_as(report: &PassReport, id: &str, kind: &str) {
    let found = report
        .inconsistencies
        .iter()
        .find(|i| i.entity_id.as_str() == id)
        .unwrap_or_else(|| panic!("Expected {id} to be reported"));
    assert_eq!(
        found.kind.as_str(),
        kind,
        "Expected {id} as {kind}, but got {:?}",
        found.kind
    );
}

/// Returns the kind `id` was reported with, if any.
pub fn reported_kind<'a>(report: &'a PassReport, id: &str) -> Option<&'a InconsistencyKind> {
    report
        .inconsistencies
        .iter()
        .find(|i| i.entity_id.as_str() == id)
        .map(|i| &i.kind)
}

/// Asserts that the report is in strictly ascending ID order.
///
/// # Panics
///
/// Panics on the first pair out of order.
pub fn assert_ascending(report: &PassReport) {
    let ids: Vec<&EntityId> = report.entity_ids().collect();
    for pair in ids.windows(2) {
        assert!(
            pair[0] < pair[1],
            "Report out of order: {} before {}",
            pair[0],
            pair[1]
        );
    }
}
