//! End-to-end tests for the activity tracking cycle.
//!
//! session_logs batch → ActivityTracker → MockProducer
//!
//! The MockProducer implements the same EventProducer port as the real
//! Producer, so everything except the network transport runs as in
//! production. Time is driven by a manual clock starting at t=0.

use integration_tests::{fixtures, setup::TestContext};
use session_core::{ActivityEvent, TrackerConfig};

/// Earliest activity wins for a session.
#[tokio::test]
async fn test_earliest_activity_is_buffered() {
    let mut ctx = TestContext::new();
    ctx.set_time(200);

    ctx.tracker
        .process_batch(&[
            fixtures::activity("u1", "s1", 0),
            fixtures::activity("u1", "s1", 100),
        ])
        .await
        .unwrap();

    assert_eq!(
        ctx.tracker.buffer().earliest("u1", "s1"),
        Some(fixtures::at(0))
    );
}

/// Threshold 3600: t=0 is inactive at 3700, active at 3500.
#[tokio::test]
async fn test_threshold_scenarios() {
    let mut ctx = TestContext::new();

    ctx.set_time(3500);
    let report = ctx
        .tracker
        .process_batch(&[fixtures::activity("u1", "s1", 0)])
        .await
        .unwrap();
    assert_eq!(report.inactive, 0);
    assert!(ctx.tracker.buffer().earliest("u1", "s1").is_some());

    ctx.set_time(3700);
    let report = ctx.tracker.process_batch(&[]).await.unwrap();
    assert_eq!(report.inactive, 1);
    assert_eq!(report.emitted, 1);
    assert!(ctx.tracker.buffer().is_empty());

    let published = ctx.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].user_id, "u1");
    assert_eq!(published[0].session_id, "s1");
    assert_eq!(published[0].activity_time, fixtures::at(0));
}

/// Two sweeps one second apart, both with inactive sessions: only the
/// first is published and the second set is lost.
#[tokio::test]
async fn test_second_sweep_inside_yield_interval_is_lost() {
    let mut ctx = TestContext::new();

    ctx.set_time(4000);
    ctx.tracker
        .process_batch(&[fixtures::activity("u1", "s1", 0)])
        .await
        .unwrap();

    ctx.set_time(4001);
    let report = ctx
        .tracker
        .process_batch(&[fixtures::activity("u2", "s1", 10)])
        .await
        .unwrap();
    assert_eq!(report.inactive, 1);
    assert_eq!(report.dropped, 1);

    // Nothing left to re-detect later.
    ctx.set_time(5000);
    let report = ctx.tracker.process_batch(&[]).await.unwrap();
    assert_eq!(report.inactive, 0);

    assert_eq!(ctx.producer.batch_count(), 1);
    let published = ctx.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].user_id, "u1");
}

/// Emission wipes active sessions too; only inactive ones are published.
#[tokio::test]
async fn test_emission_clears_active_sessions() {
    let mut ctx = TestContext::new();
    ctx.set_time(3700);

    ctx.tracker
        .process_batch(&[
            fixtures::activity("u1", "s1", 0),
            fixtures::activity("u1", "s2", 3650),
        ])
        .await
        .unwrap();

    assert!(ctx.tracker.buffer().is_empty());
    let published = ctx.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].session_id, "s1");

    // s2 restarts tracking from its next event.
    ctx.set_time(3710);
    ctx.tracker
        .process_batch(&[fixtures::activity("u1", "s2", 3705)])
        .await
        .unwrap();
    assert_eq!(
        ctx.tracker.buffer().earliest("u1", "s2"),
        Some(fixtures::at(3705))
    );
}

/// Throttled cycles leave the buffer's remaining entries untouched.
#[tokio::test]
async fn test_throttled_cycle_keeps_active_entries() {
    let mut ctx = TestContext::new();

    ctx.set_time(3700);
    ctx.tracker
        .process_batch(&[fixtures::activity("u1", "s1", 0)])
        .await
        .unwrap();

    ctx.set_time(3701);
    ctx.tracker
        .process_batch(&[
            fixtures::activity("u2", "s1", 0),
            fixtures::activity("u3", "s1", 3690),
        ])
        .await
        .unwrap();

    assert_eq!(
        ctx.tracker.buffer().earliest("u3", "s1"),
        Some(fixtures::at(3690))
    );
    assert_eq!(ctx.tracker.buffer().session_count(), 1);
}

/// Replaying a batch yields the same buffered times.
#[tokio::test]
async fn test_replayed_batch_is_idempotent() {
    let batch = vec![
        fixtures::activity("u1", "s1", 30),
        fixtures::activity_str("u1", "s1", 10),
        fixtures::activity("u2", "s4", 20),
    ];

    let mut once = TestContext::new();
    once.set_time(100);
    once.tracker.process_batch(&batch).await.unwrap();

    let mut twice = TestContext::new();
    twice.set_time(100);
    twice.tracker.process_batch(&batch).await.unwrap();
    twice.tracker.process_batch(&batch).await.unwrap();

    for (user, session) in [("u1", "s1"), ("u2", "s4")] {
        assert_eq!(
            once.tracker.buffer().earliest(user, session),
            twice.tracker.buffer().earliest(user, session)
        );
    }
    assert_eq!(
        twice.tracker.buffer().earliest("u1", "s1"),
        Some(fixtures::at(10))
    );
}

/// A bad timestamp is reported and the rest of the batch still applies.
#[tokio::test]
async fn test_malformed_time_is_reported_not_fatal() {
    let mut ctx = TestContext::new();
    ctx.set_time(3700);

    let report = ctx
        .tracker
        .process_batch(&[
            fixtures::activity_malformed("u1", "s1"),
            fixtures::activity("u2", "s1", 0),
        ])
        .await
        .unwrap();

    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].user_id, "u1");
    assert_eq!(report.emitted, 1);
    assert_eq!(ctx.published()[0].user_id, "u2");
}

/// Publish failure fails the cycle; redelivery recovers the session.
#[tokio::test]
async fn test_publish_failure_then_redelivery() {
    let mut ctx = TestContext::new();
    let batch = vec![fixtures::activity("u1", "s1", 0)];

    ctx.set_time(3700);
    ctx.producer.set_should_fail(true);
    assert!(ctx.tracker.process_batch(&batch).await.is_err());
    assert!(ctx.published().is_empty());

    ctx.producer.set_should_fail(false);
    let report = ctx.tracker.process_batch(&batch).await.unwrap();
    assert_eq!(report.emitted, 1);
    assert_eq!(ctx.published().len(), 1);
}

/// With retention enabled, throttled results are published later.
#[tokio::test]
async fn test_retained_results_published_after_interval() {
    let mut ctx = TestContext::with_config(TrackerConfig::default().with_retain_throttled(true));

    ctx.set_time(4000);
    ctx.tracker
        .process_batch(&[fixtures::activity("u1", "s1", 0)])
        .await
        .unwrap();

    ctx.set_time(4001);
    ctx.tracker
        .process_batch(&[fixtures::activity("u2", "s1", 0)])
        .await
        .unwrap();
    assert_eq!(ctx.tracker.pending().len(), 1);

    ctx.set_time(4003);
    ctx.tracker.process_batch(&[]).await.unwrap();

    let users: Vec<_> = ctx.published().into_iter().map(|e| e.user_id).collect();
    assert_eq!(users, vec!["u1", "u2"]);
    assert!(ctx.tracker.pending().is_empty());
}

/// Many sessions for one user go out as one batch, all keyed by the user.
#[tokio::test]
async fn test_single_batch_per_emission() {
    let mut ctx = TestContext::new();
    ctx.set_time(10_000);

    ctx.tracker
        .process_batch(&fixtures::user_sessions("u9", 25, 0))
        .await
        .unwrap();

    assert_eq!(ctx.producer.batch_count(), 1);
    let messages = ctx.producer.captured_messages();
    assert_eq!(messages.len(), 25);
    assert!(messages.iter().all(|m| m.key.as_deref() == Some("u9")));
}

/// Wire payloads in several time formats decode and merge by timestamp.
#[tokio::test]
async fn test_wire_payload_time_formats() {
    let payloads = [
        fixtures::session_log_json("u1", "s1", "1970-01-01T00:10:00Z"),
        fixtures::session_log_json("u1", "s1", "1970-01-01 00:05:00 +0000"),
        fixtures::session_log_json("u1", "s1", "1970-01-01 00:20:00 UTC"),
    ];
    let events: Vec<ActivityEvent> = payloads
        .iter()
        .map(|p| serde_json::from_slice(p).unwrap())
        .collect();

    let mut ctx = TestContext::new();
    ctx.set_time(1_000);
    let report = ctx.tracker.process_batch(&events).await.unwrap();

    assert_eq!(report.recorded, 3);
    assert_eq!(
        ctx.tracker.buffer().earliest("u1", "s1"),
        Some(fixtures::at(300))
    );
}
