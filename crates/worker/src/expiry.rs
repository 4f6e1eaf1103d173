//! Expiry handling: reacts to `expired_sessions` events.
//!
//! The built-in hook only logs. Session teardown (logout, token revocation,
//! notification) plugs in as additional hooks.

use async_trait::async_trait;
use redpanda::Consumer;
use session_core::{ExpirySessionEvent, Result};
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics;
use tracing::{debug, error, info, warn};

/// Side effect run for every expired session.
#[async_trait]
pub trait ExpiryHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_expired(&self, event: &ExpirySessionEvent) -> Result<()>;
}

/// Logs each expired session.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHook;

#[async_trait]
impl ExpiryHook for LogHook {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn on_expired(&self, event: &ExpirySessionEvent) -> Result<()> {
        info!(
            user_id = %event.user_id,
            session_id = %event.session_id,
            last_activity = %event.activity_time,
            "Processing expired session"
        );
        Ok(())
    }
}

/// Runs registered hooks for each expiry event.
pub struct ExpiryHandler {
    hooks: Vec<Arc<dyn ExpiryHook>>,
}

impl Default for ExpiryHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpiryHandler {
    /// Handler with the logging hook.
    pub fn new() -> Self {
        Self {
            hooks: vec![Arc::new(LogHook)],
        }
    }

    /// Handler with no hooks.
    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ExpiryHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn hook_names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Runs every hook in order. Returns the number of hooks that failed;
    /// a failing hook does not stop the ones after it.
    pub async fn handle(&self, event: &ExpirySessionEvent) -> usize {
        let mut failures = 0;

        for hook in &self.hooks {
            if let Err(e) = hook.on_expired(event).await {
                failures += 1;
                metrics().expiry_hook_failures.inc();
                warn!(
                    hook = hook.name(),
                    user_id = %event.user_id,
                    session_id = %event.session_id,
                    error = %e,
                    "Expiry hook failed"
                );
            }
        }

        metrics().expiry_events_handled.inc();
        failures
    }

    /// Handles events one at a time, in order. Returns total hook failures.
    pub async fn handle_batch(&self, events: &[ExpirySessionEvent]) -> usize {
        let mut failures = 0;
        for event in events {
            failures += self.handle(event).await;
        }
        failures
    }
}

/// Consumes one partition of `expired_sessions`.
pub struct ExpiryWorker {
    consumer: Arc<Consumer>,
    handler: Arc<ExpiryHandler>,
    error_backoff: Duration,
}

impl ExpiryWorker {
    pub fn new(consumer: Arc<Consumer>, handler: Arc<ExpiryHandler>, error_backoff: Duration) -> Self {
        Self {
            consumer,
            handler,
            error_backoff,
        }
    }

    /// Main run loop - fetch, handle, commit.
    pub async fn run(&self) -> Result<()> {
        info!(
            topic = %self.consumer.config().topic,
            partition = self.consumer.partition(),
            hooks = ?self.handler.hook_names(),
            "Expiry worker starting"
        );

        loop {
            match self.process_batch().await {
                Ok(count) => {
                    if count > 0 {
                        debug!(count = count, "Handled expiry batch");
                    }
                }
                Err(e) => {
                    error!("Expiry batch error: {}", e);
                    tokio::time::sleep(self.error_backoff).await;
                    self.consumer.reset_connection().await;
                }
            }
        }
    }

    async fn process_batch(&self) -> Result<usize> {
        let batch = self.consumer.fetch_batch::<ExpirySessionEvent>().await?;

        let Some(offset) = batch.offset else {
            return Ok(0);
        };

        self.handler.handle_batch(&batch.records).await;
        self.consumer.commit(offset).await?;

        Ok(batch.records.len())
    }
}
