//! Activity worker: reads `session_logs` and drives one tracker.
//!
//! Per batch:
//! 1. Fetch activity events from one partition
//! 2. Run the tracker cycle (record, sweep, maybe emit)
//! 3. Commit the offset (at-least-once delivery)
//!
//! A failed cycle is not committed, so the same records are fetched again.
//! The min-merge makes reprocessing them harmless.

use redpanda::Consumer;
use session_core::{ActivityEvent, Result};
use std::sync::Arc;
use std::time::Duration;
use telemetry::{health, metrics};
use tracing::{debug, error, info};

use crate::tracker::{ActivityTracker, CycleReport};

/// Activity worker configuration.
#[derive(Debug, Clone)]
pub struct ActivityWorkerConfig {
    /// Pause after a failed cycle
    pub error_backoff: Duration,
}

impl Default for ActivityWorkerConfig {
    fn default() -> Self {
        Self {
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Worker owning the tracker for one partition.
pub struct ActivityWorker {
    consumer: Arc<Consumer>,
    tracker: ActivityTracker,
    config: ActivityWorkerConfig,
}

impl ActivityWorker {
    pub fn new(consumer: Arc<Consumer>, tracker: ActivityTracker) -> Self {
        Self::with_config(consumer, tracker, ActivityWorkerConfig::default())
    }

    pub fn with_config(
        consumer: Arc<Consumer>,
        tracker: ActivityTracker,
        config: ActivityWorkerConfig,
    ) -> Self {
        Self {
            consumer,
            tracker,
            config,
        }
    }

    /// Main run loop - fetch, process, commit.
    ///
    /// Batches are processed strictly one after another.
    pub async fn run(mut self) -> Result<()> {
        info!(
            topic = %self.consumer.config().topic,
            partition = self.consumer.partition(),
            threshold_secs = self.tracker.config().inactivity_threshold_secs,
            yield_interval_secs = self.tracker.config().yield_interval_secs,
            "Activity worker starting"
        );

        loop {
            let result = self.process_batch().await;
            record_cycle_health(&result);

            match result {
                Ok(Some(report)) => {
                    if report.did_emit() {
                        debug!(emitted = report.emitted, "Emitted expiry batch");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    metrics().cycle_failures.inc();
                    error!(
                        partition = self.consumer.partition(),
                        "Activity batch processing error: {}",
                        e
                    );
                    tokio::time::sleep(self.config.error_backoff).await;
                    self.consumer.reset_connection().await;
                }
            }
        }
    }

    /// Processes a single batch: fetch → cycle → commit.
    ///
    /// A delivered batch runs a cycle even if none of its records decoded.
    async fn process_batch(&mut self) -> Result<Option<CycleReport>> {
        let batch = self.consumer.fetch_batch::<ActivityEvent>().await?;

        let Some(offset) = batch.offset else {
            return Ok(None);
        };

        let report = self.tracker.process_batch(&batch.records).await?;
        self.consumer.commit(offset).await?;

        Ok(Some(report))
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }
}

/// Tracker health follows the outcome of the latest cycle. Empty fetches
/// leave it unchanged.
fn record_cycle_health(result: &Result<Option<CycleReport>>) {
    match result {
        Ok(Some(_)) => health().tracker.set_healthy(),
        Ok(None) => {}
        Err(e) => health().tracker.set_unhealthy(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_worker_config_defaults() {
        let config = ActivityWorkerConfig::default();
        assert_eq!(config.error_backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_cycle_outcome_drives_tracker_health() {
        record_cycle_health(&Err(session_core::Error::publish("broker down")));
        assert!(!health().tracker.is_healthy());
        assert!(health()
            .tracker
            .message()
            .is_some_and(|m| m.contains("broker down")));

        record_cycle_health(&Ok(None));
        assert!(!health().tracker.is_healthy());

        record_cycle_health(&Ok(Some(CycleReport::default())));
        assert!(health().tracker.is_healthy());
        assert!(health().tracker.message().is_none());
    }
}
