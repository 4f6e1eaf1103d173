//! Worker scheduler for background tasks.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use redpanda::{Consumer, EventProducer};
use session_core::TrackerConfig;
use telemetry::{health, metrics, HealthStatus};

use crate::activity::{ActivityWorker, ActivityWorkerConfig};
use crate::expiry::{ExpiryHandler, ExpiryWorker};
use crate::tracker::ActivityTracker;

/// Worker scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Metrics and health snapshot log interval in seconds
    #[serde(default = "default_metrics_report_interval_secs")]
    pub metrics_report_interval_secs: u64,
    /// Pause after a failed batch, in milliseconds
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

fn default_metrics_report_interval_secs() -> u64 {
    60
}

fn default_error_backoff_ms() -> u64 {
    1000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            metrics_report_interval_secs: default_metrics_report_interval_secs(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl WorkerConfig {
    /// Never zero; a zero period would make the report ticker panic.
    pub fn metrics_report_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_report_interval_secs.max(1))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Background worker scheduler.
///
/// Every activity partition gets its own tracker; trackers share nothing.
pub struct WorkerScheduler {
    config: WorkerConfig,
    tracker_config: TrackerConfig,
    producer: Arc<dyn EventProducer>,
    activity_consumers: Vec<Arc<Consumer>>,
    expiry_consumers: Vec<Arc<Consumer>>,
    handler: Arc<ExpiryHandler>,
}

impl WorkerScheduler {
    pub fn new(
        config: WorkerConfig,
        tracker_config: TrackerConfig,
        producer: Arc<dyn EventProducer>,
    ) -> Self {
        Self {
            config,
            tracker_config,
            producer,
            activity_consumers: Vec::new(),
            expiry_consumers: Vec::new(),
            handler: Arc::new(ExpiryHandler::new()),
        }
    }

    /// Adds activity consumers, one tracker each.
    pub fn with_activity_consumers(mut self, consumers: Vec<Arc<Consumer>>) -> Self {
        self.activity_consumers = consumers;
        self
    }

    /// Adds expiry consumers sharing one handler.
    pub fn with_expiry_consumers(
        mut self,
        consumers: Vec<Arc<Consumer>>,
        handler: Arc<ExpiryHandler>,
    ) -> Self {
        self.expiry_consumers = consumers;
        self.handler = handler;
        self
    }

    /// Starts all background workers.
    pub fn start(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        for consumer in &self.activity_consumers {
            let tracker =
                ActivityTracker::with_system_clock(self.tracker_config.clone(), self.producer.clone());
            let worker = ActivityWorker::with_config(
                consumer.clone(),
                tracker,
                ActivityWorkerConfig {
                    error_backoff: self.config.error_backoff(),
                },
            );
            let partition = consumer.partition();

            handles.push(tokio::spawn(async move {
                if let Err(e) = worker.run().await {
                    error!(partition = partition, "Activity worker fatal error: {}", e);
                }
            }));
        }
        if !self.activity_consumers.is_empty() {
            health().tracker.set_healthy();
            info!(
                partitions = self.activity_consumers.len(),
                "Activity workers started"
            );
        }

        for consumer in &self.expiry_consumers {
            let worker =
                ExpiryWorker::new(consumer.clone(), self.handler.clone(), self.config.error_backoff());
            let partition = consumer.partition();

            handles.push(tokio::spawn(async move {
                if let Err(e) = worker.run().await {
                    error!(partition = partition, "Expiry worker fatal error: {}", e);
                }
            }));
        }
        if !self.expiry_consumers.is_empty() {
            info!(
                partitions = self.expiry_consumers.len(),
                "Expiry workers started"
            );
        }

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_metrics_report().await;
        }));

        info!("Background workers started");
        handles
    }

    async fn run_metrics_report(&self) {
        let mut ticker = interval(self.config.metrics_report_interval());

        loop {
            ticker.tick().await;

            let snapshot = metrics().snapshot();
            info!(
                records_consumed = snapshot.records_consumed,
                events_rejected = snapshot.activity_events_rejected,
                sessions_expired = snapshot.sessions_expired,
                sessions_dropped = snapshot.sessions_dropped_by_throttle,
                emissions = snapshot.emissions,
                expiry_sent = snapshot.expiry_events_sent,
                send_errors = snapshot.producer_send_errors,
                buffered_sessions = snapshot.buffered_sessions,
                cycle_latency_mean_ms = snapshot.cycle_latency_mean_ms,
                "Metrics snapshot"
            );

            let report = health().report();
            if report.status == HealthStatus::Healthy {
                info!(status = ?report.status, "Health snapshot");
            } else {
                warn!(
                    status = ?report.status,
                    failing = ?health().failing(),
                    "Health snapshot"
                );
            }
        }
    }
}
