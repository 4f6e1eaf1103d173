//! Common test setup functions.

use session_core::{ExpirySessionEvent, ManualClock, TrackerConfig};
use std::sync::Arc;
use worker::{ActivityTracker, ExpiryHandler};

use crate::fixtures::at;
use crate::mocks::MockProducer;

/// Tracker wired to a mock producer and a manual clock.
///
/// Runs the same tracker code path as production; only the broker and
/// wall clock are replaced.
pub struct TestContext {
    pub tracker: ActivityTracker,
    pub producer: Arc<MockProducer>,
    pub clock: ManualClock,
}

impl TestContext {
    /// Tracker created at t=0 with default thresholds.
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        telemetry::init_test_tracing();

        let producer = Arc::new(MockProducer::new());
        let clock = ManualClock::new(at(0));
        let tracker = ActivityTracker::new(config, producer.clone(), Arc::new(clock.clone()));

        Self {
            tracker,
            producer,
            clock,
        }
    }

    /// Moves the clock to `secs` after the epoch.
    pub fn set_time(&self, secs: i64) {
        self.clock.set(at(secs));
    }

    /// Expiry events published so far.
    pub fn published(&self) -> Vec<ExpirySessionEvent> {
        self.producer.captured_events()
    }

    /// Replays everything published through an expiry handler.
    pub async fn deliver_to(&self, handler: &ExpiryHandler) -> usize {
        handler.handle_batch(&self.published()).await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
