//! End-to-end tests of one background synchronization pass.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::TimeDelta;
use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;

use twinsync_reconcile::error::Error;
use twinsync_reconcile::feed::{FeedSide, VecFeed};
use twinsync_reconcile::report::{MemorySink, PassStats};
use twinsync_reconcile::throttle::ThrottleConfig;
use twinsync_reconcile::verdict::{
    ConsistentReason, InconsistencyKind, Outcome, UnconfirmedRevision,
};
use twinsync_test_utils::*;

#[tokio::test]
async fn reports_missing_stale_and_mismatched_entities_in_order() {
    init_test_logging();
    let authority = ScriptedPolicyAuthority::new().with_revision(policy("P"), 6);
    let sync = sync_with(authority, test_config());

    let persisted = feed(vec![
        entity("a", 1),
        entity("b", 3),
        entity_with_policy("c", 3, "P", 0),
        entity_with_policy("d", 3, "P", 0),
        entity_with_policy("e", 3, "P", 0),
    ]);
    let indexed = feed(vec![
        recent(entity("b", 1)),
        entity_with_policy("c", 2, "P", 1),
        entity_with_policy("d", 3, "Q", 0),
        entity_with_policy("e", 3, "P", 3),
    ]);

    let report = sync.run_pass(persisted, indexed).await.unwrap();

    assert_reported(&report, &["a", "c", "d", "e"]);
    assert_reported_as(&report, "a", "missing_from_index");
    assert_reported_as(&report, "c", "revision_mismatch");
    assert_reported_as(&report, "d", "policy_ref_mismatch");
    assert_eq!(
        reported_kind(&report, "e"),
        Some(&InconsistencyKind::PolicyRevisionMismatch {
            policy_ref: policy("P"),
            persisted: 0,
            indexed: 3,
            cause: UnconfirmedRevision::Mismatch { authoritative: 6 },
        })
    );
    assert_eq!(report.stats.suppressed, 1);
    assert_eq!(report.stats.verifications_issued, 1);
}

#[tokio::test]
async fn only_ambiguous_candidates_reach_the_authority() {
    let authority = std::sync::Arc::new(
        ScriptedPolicyAuthority::new()
            .with_revision(policy("x:5"), 6)
            .with_revision(policy("x:6"), 6),
    );
    let sync = sync_with(
        std::sync::Arc::clone(&authority),
        test_config().with_tolerance_window(Duration::from_secs(3_600)),
    );

    let persisted = feed(vec![
        entity("x:0-only-persisted", 1),
        entity("x:2-within-tolerance", 3),
        entity_with_policy("x:3-revision-mismatch", 3, "x:3", 0),
        entity_with_policy("x:4-policy-id-mismatch", 3, "x:4", 0),
        entity_with_policy("x:5-policy-revision-mismatch", 3, "x:5", 0),
        entity_with_policy("x:6-all-up-to-date", 3, "x:6", 0),
    ]);
    let indexed = feed(vec![
        entity("x:1-only-indexed", 1),
        aged(entity("x:2-within-tolerance", 1), TimeDelta::zero()),
        entity_with_policy("x:3-revision-mismatch", 2, "x:3", 1),
        entity_with_policy("x:4-policy-id-mismatch", 3, "x:mismatched", 0),
        entity_with_policy("x:5-policy-revision-mismatch", 3, "x:5", 3),
        entity_with_policy("x:6-all-up-to-date", 5, "x:6", 6),
    ]);

    let report = sync.run_pass(persisted, indexed).await.unwrap();

    assert_reported(
        &report,
        &[
            "x:0-only-persisted",
            "x:1-only-indexed",
            "x:3-revision-mismatch",
            "x:4-policy-id-mismatch",
            "x:5-policy-revision-mismatch",
        ],
    );
    // x:3 is behind on entity revision and must be reported without a round trip.
    assert_eq!(authority.requests(), vec![policy("x:5"), policy("x:6")]);
    assert_eq!(report.stats.verifications_confirmed, 1);
    assert_eq!(report.stats.verifications_mismatched, 1);
}

#[tokio::test]
async fn empty_feeds_produce_a_clean_report() {
    let sync = sync_with(ScriptedPolicyAuthority::new(), test_config());
    let report = sync
        .run_pass(VecFeed::empty(), VecFeed::empty())
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.stats, PassStats::default());
    assert_eq!(report.reference_time, reference_time());
}

#[tokio::test]
async fn consistent_input_is_never_reported() {
    let records = vec![
        entity("a", 1),
        entity_with_policy("b", 7, "P", 2),
        entity_with_policy("c", 3, "Q", 0),
    ];
    let authority = std::sync::Arc::new(ScriptedPolicyAuthority::new());
    let sync = sync_with(std::sync::Arc::clone(&authority), test_config());

    let report = sync
        .run_pass(feed(records.clone()), feed(records))
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(report.stats.paired, 3);
    assert_eq!(authority.request_count(), 0);
}

#[tokio::test]
async fn tolerance_boundary_is_inclusive() {
    let window = TimeDelta::from_std(TEST_TOLERANCE).unwrap();
    let sync = sync_with(ScriptedPolicyAuthority::new(), test_config());

    let persisted = feed(vec![entity("behind-at-edge", 2), entity("behind-past-edge", 2)]);
    let indexed = feed(vec![
        aged(entity("behind-at-edge", 1), window),
        aged(entity("behind-past-edge", 1), window + TimeDelta::seconds(1)),
        aged(entity("orphan-at-edge", 1), window),
        aged(entity("orphan-in-future", 1), -TimeDelta::minutes(5)),
        aged(entity("orphan-past-edge", 1), window + TimeDelta::seconds(1)),
    ]);

    let report = sync.run_pass(persisted, indexed).await.unwrap();
    assert_reported(&report, &["behind-past-edge", "orphan-past-edge"]);
    assert_eq!(report.stats.suppressed, 3);
}

#[tokio::test]
async fn missing_from_index_ignores_tolerance() {
    let sync = sync_with(
        ScriptedPolicyAuthority::new(),
        test_config().with_tolerance_window(Duration::from_secs(u64::MAX)),
    );
    let report = sync
        .run_pass(feed(vec![recent(entity("a", 1))]), VecFeed::empty())
        .await
        .unwrap();
    assert_reported_as(&report, "a", "missing_from_index");
}

#[tokio::test(start_paused = true)]
async fn unanswered_verification_times_out_without_failing_the_pass() {
    let authority = ScriptedPolicyAuthority::new().with(policy("P"), Script::Hang);
    let sync = sync_with(
        authority,
        test_config().with_request_timeout(Duration::from_secs(3)),
    );

    let persisted = feed(vec![entity_with_policy("a", 1, "P", 0), entity("b", 1)]);
    let indexed = feed(vec![entity_with_policy("a", 1, "P", 1)]);

    let started = tokio::time::Instant::now();
    let report = sync.run_pass(persisted, indexed).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_reported(&report, &["a", "b"]);
    assert!(matches!(
        reported_kind(&report, "a"),
        Some(InconsistencyKind::PolicyRevisionMismatch {
            cause: UnconfirmedRevision::TimedOut,
            ..
        })
    ));
    assert_eq!(report.stats.verifications_timed_out, 1);
}

#[tokio::test]
async fn authority_errors_are_absorbed() {
    let authority =
        ScriptedPolicyAuthority::new().with(policy("P"), Script::Fail("policy store down".into()));
    let sync = sync_with(authority, test_config());

    let persisted = feed(vec![entity_with_policy("a", 1, "P", 0), entity("b", 1)]);
    let indexed = feed(vec![entity_with_policy("a", 1, "P", 1), entity("b", 1)]);

    let report = sync.run_pass(persisted, indexed).await.unwrap();
    assert_reported(&report, &["a"]);
    assert!(matches!(
        reported_kind(&report, "a"),
        Some(InconsistencyKind::PolicyRevisionMismatch {
            cause: UnconfirmedRevision::Failed { message },
            ..
        }) if message.contains("policy store down")
    ));
}

#[tokio::test(start_paused = true)]
async fn verifications_are_bounded_and_results_stay_ordered() {
    // Earlier entities answer slower, so completions arrive in reverse order.
    let mut authority = ScriptedPolicyAuthority::new();
    let mut persisted = Vec::new();
    let mut indexed = Vec::new();
    for i in 0..10u64 {
        let id = format!("x:{i:02}");
        let policy_name = format!("p:{i:02}");
        authority = authority.with(
            policy(&policy_name),
            Script::Delayed(99, Duration::from_millis(100 * (10 - i))),
        );
        persisted.push(entity_with_policy(&id, 1, &policy_name, 0));
        indexed.push(entity_with_policy(&id, 1, &policy_name, 1));
    }
    let authority = std::sync::Arc::new(authority);
    let sync = sync_with(
        std::sync::Arc::clone(&authority),
        test_config().with_max_in_flight_verifications(3),
    );

    let report = sync
        .run_pass(feed(persisted), feed(indexed))
        .await
        .unwrap();

    assert_eq!(authority.request_count(), 10);
    assert_eq!(authority.max_in_flight(), 3);
    assert_eq!(report.inconsistencies.len(), 10);
    assert_ascending(&report);
}

#[tokio::test(start_paused = true)]
async fn slow_verification_applies_backpressure_to_the_feeds() {
    let authority = ScriptedPolicyAuthority::new().with(policy("P"), Script::Hang);
    let sync = sync_with(
        authority,
        test_config()
            .with_max_in_flight_verifications(2)
            .with_request_timeout(Duration::from_secs(3_600)),
    );

    let mut persisted = vec![entity_with_policy("x:", 1, "P", 0)];
    persisted.extend(numbered_entities(100));
    let (persisted, reads) = CountingFeed::new(feed(persisted));
    let indexed = feed(vec![entity_with_policy("x:", 1, "P", 1)]);

    let result =
        tokio::time::timeout(Duration::from_secs(10), sync.run_pass(persisted, indexed)).await;

    assert!(result.is_err(), "pass should still be waiting on the authority");
    assert!(
        reads.load(Ordering::SeqCst) <= 4,
        "merger read {} records past a stalled verification",
        reads.load(Ordering::SeqCst)
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_discards_the_pass() {
    let authority = ScriptedPolicyAuthority::new().with(policy("P"), Script::Hang);
    let sync = sync_with(
        authority,
        test_config().with_request_timeout(Duration::from_secs(3_600)),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let sink = MemorySink::new();
    let result = sync
        .run_pass_into(
            feed(vec![entity("a", 1), entity_with_policy("b", 1, "P", 0)]),
            feed(vec![entity_with_policy("b", 1, "P", 1)]),
            &sink,
            &cancel,
        )
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(sink.finished().is_none());
}

#[tokio::test]
async fn feed_error_aborts_the_pass() {
    let sync = sync_with(ScriptedPolicyAuthority::new(), test_config());
    let indexed = FailingFeed::after(vec![entity("a", 1)], "cursor expired");

    let err = sync
        .run_pass(feed(vec![entity("a", 1), entity("b", 1)]), indexed)
        .await
        .unwrap_err();

    match err {
        Error::Feed { side, source } => {
            assert_eq!(side, FeedSide::Indexed);
            assert!(source.to_string().contains("cursor expired"));
        }
        other => panic!("expected feed error, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_pass_never_finishes_the_sink() {
    let sync = sync_with(ScriptedPolicyAuthority::new(), test_config());
    let sink = MemorySink::new();

    let result = sync
        .run_pass_into(
            FailingFeed::after(vec![entity("a", 1)], "connection reset"),
            VecFeed::empty(),
            &sink,
            &CancellationToken::new(),
        )
        .await;

    assert!(result.is_err());
    assert!(sink.finished().is_none());
}

#[tokio::test]
async fn sink_receives_the_same_ids_as_the_report() {
    let sync = sync_with(ScriptedPolicyAuthority::new(), test_config());
    let persisted = || feed(vec![entity("a", 1), entity("c", 2)]);
    let indexed = || feed(vec![stale(entity("b", 1)), stale(entity("c", 1))]);

    let sink = MemorySink::new();
    let stats = sync
        .run_pass_into(persisted(), indexed(), &sink, &CancellationToken::new())
        .await
        .unwrap();
    let report = sync.run_pass(persisted(), indexed()).await.unwrap();

    let sunk: Vec<_> = sink.received().into_iter().map(|i| i.entity_id).collect();
    let reported: Vec<_> = report.entity_ids().cloned().collect();
    assert_eq!(sunk, reported);
    assert_eq!(sink.finished(), Some(stats.clone()));
    assert_eq!(stats, report.stats);
}

#[tokio::test]
async fn strict_ordering_fails_on_duplicates() {
    let sync = sync_with(
        ScriptedPolicyAuthority::new(),
        test_config().with_strict_ordering(true),
    );

    let err = sync
        .run_pass(
            feed(vec![entity("a", 1), entity("a", 2)]),
            VecFeed::empty(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::OrderingViolation {
            side: FeedSide::Persisted,
            ..
        }
    ));
}

#[tokio::test]
async fn throttling_does_not_change_classification() {
    let throttled = sync_with(
        ScriptedPolicyAuthority::new(),
        test_config().with_throttle(ThrottleConfig {
            throughput: 1_000,
            period_ms: 1_000,
        }),
    );
    let plain = sync_with(ScriptedPolicyAuthority::new(), test_config());

    let persisted = || feed(numbered_entities(20));
    let indexed = || feed(numbered_entities(20).into_iter().step_by(2).collect());

    let a = throttled.run_pass(persisted(), indexed()).await.unwrap();
    let b = plain.run_pass(persisted(), indexed()).await.unwrap();
    assert_eq!(a.inconsistencies, b.inconsistencies);
    assert_eq!(a.inconsistencies.len(), 10);
}

#[tokio::test]
async fn verdict_stream_explains_suppressed_candidates() {
    let authority = ScriptedPolicyAuthority::new().with_revision(policy("P"), 1);
    let sync = sync_with(authority, test_config());
    let context = sync.begin_pass();

    let verdicts: Vec<_> = sync
        .verdicts(
            &context,
            feed(vec![entity("a", 2), entity_with_policy("b", 1, "P", 0), entity("c", 1)]),
            feed(vec![
                recent(entity("a", 1)),
                entity_with_policy("b", 1, "P", 1),
                entity("c", 1),
            ]),
        )
        .map_ok(|v| v.outcome)
        .try_collect()
        .await
        .unwrap();

    assert_eq!(
        verdicts,
        vec![
            Outcome::Consistent(ConsistentReason::WithinTolerance),
            Outcome::Consistent(ConsistentReason::ConfirmedByAuthority),
            Outcome::Consistent(ConsistentReason::UpToDate),
        ]
    );
}

#[tokio::test]
async fn inconsistent_ids_stream_matches_report() {
    let sync = sync_with(ScriptedPolicyAuthority::new(), test_config());
    let ids: Vec<String> = sync
        .inconsistent_ids(
            feed(vec![entity("a", 1), entity("b", 1)]),
            feed(vec![entity("b", 1), stale(entity("c", 1))]),
        )
        .map_ok(String::from)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(ids, vec!["a", "c"]);
}
