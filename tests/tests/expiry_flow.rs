//! Tests for the expiry handling side.
//!
//! Published expiry events are replayed through the handler the way the
//! ExpiryWorker does after fetching them from `expired_sessions`.

use async_trait::async_trait;
use integration_tests::{fixtures, setup::TestContext};
use parking_lot::Mutex;
use session_core::{Error, ExpirySessionEvent, Result};
use std::sync::Arc;
use worker::{ExpiryHandler, ExpiryHook};

/// Records logouts instead of calling an auth service.
#[derive(Default)]
struct LogoutHook {
    logged_out: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ExpiryHook for LogoutHook {
    fn name(&self) -> &'static str {
        "logout"
    }

    async fn on_expired(&self, event: &ExpirySessionEvent) -> Result<()> {
        self.logged_out
            .lock()
            .push((event.user_id.clone(), event.session_id.clone()));
        Ok(())
    }
}

struct UnavailableHook;

#[async_trait]
impl ExpiryHook for UnavailableHook {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn on_expired(&self, _event: &ExpirySessionEvent) -> Result<()> {
        Err(Error::internal("notification service unavailable"))
    }
}

#[tokio::test]
async fn test_expired_sessions_reach_hooks() {
    let mut ctx = TestContext::new();
    ctx.set_time(8000);
    ctx.tracker
        .process_batch(&[
            fixtures::activity("u1", "s1", 0),
            fixtures::activity("u2", "s3", 100),
            fixtures::activity("u3", "s1", 7900),
        ])
        .await
        .unwrap();

    let logout = Arc::new(LogoutHook::default());
    let handler = ExpiryHandler::new().with_hook(logout.clone());

    let failures = ctx.deliver_to(&handler).await;

    assert_eq!(failures, 0);
    assert_eq!(
        *logout.logged_out.lock(),
        vec![
            ("u1".to_string(), "s1".to_string()),
            ("u2".to_string(), "s3".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_hook_failure_is_isolated() {
    let mut ctx = TestContext::new();
    ctx.set_time(8000);
    ctx.tracker
        .process_batch(&fixtures::user_sessions("u1", 2, 0))
        .await
        .unwrap();

    let logout = Arc::new(LogoutHook::default());
    let handler = ExpiryHandler::empty()
        .with_hook(Arc::new(UnavailableHook))
        .with_hook(logout.clone());

    let failures = ctx.deliver_to(&handler).await;

    assert_eq!(failures, 2);
    assert_eq!(logout.logged_out.lock().len(), 2);
}

#[tokio::test]
async fn test_published_payload_round_trips_to_handler_input() {
    let mut ctx = TestContext::new();
    ctx.set_time(3700);
    ctx.tracker
        .process_batch(&[fixtures::activity_str("u1", "s1", 50)])
        .await
        .unwrap();

    let messages = ctx.producer.captured_messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "expired_sessions");

    let payload: serde_json::Value = serde_json::from_slice(&messages[0].payload).unwrap();
    assert_eq!(payload["user_id"], "u1");
    assert_eq!(payload["session_id"], "s1");
    assert_eq!(payload["activity_time"], "1970-01-01T00:00:50Z");

    let event: ExpirySessionEvent = serde_json::from_slice(&messages[0].payload).unwrap();
    assert_eq!(event.activity_time, fixtures::at(50));
}
