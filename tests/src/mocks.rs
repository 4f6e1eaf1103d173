//! Mock implementations for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use redpanda::{EventProducer, OutboundMessage, SendResult};
use session_core::{Error, ExpirySessionEvent, Result};
use std::sync::Arc;

/// Mock producer that captures messages in memory.
///
/// Implements the same `EventProducer` port as the real `Producer`, so
/// tests see exactly what would be handed to Redpanda.
#[derive(Clone)]
pub struct MockProducer {
    /// One entry per `produce_many` call.
    batches: Arc<Mutex<Vec<Vec<OutboundMessage>>>>,
    /// Simulate failures if set.
    should_fail: Arc<Mutex<bool>>,
}

impl MockProducer {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Number of `produce_many` calls that succeeded.
    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// All captured messages, flattened.
    pub fn captured_messages(&self) -> Vec<OutboundMessage> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Captured payloads decoded as expiry events, per batch.
    pub fn captured_batches(&self) -> Vec<Vec<ExpirySessionEvent>> {
        self.batches
            .lock()
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .filter_map(|m| serde_json::from_slice(&m.payload).ok())
                    .collect()
            })
            .collect()
    }

    /// All captured expiry events, flattened.
    pub fn captured_events(&self) -> Vec<ExpirySessionEvent> {
        self.captured_batches().into_iter().flatten().collect()
    }

    /// Clear captured messages.
    pub fn clear(&self) {
        self.batches.lock().clear();
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }
}

impl Default for MockProducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventProducer for MockProducer {
    async fn produce_many(&self, messages: Vec<OutboundMessage>) -> Result<SendResult> {
        if *self.should_fail.lock() {
            return Err(Error::publish("Mock producer failure"));
        }

        let count = messages.len();
        self.batches.lock().push(messages);

        Ok(SendResult {
            events_sent: count,
            events_queued: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn expired(user: &str) -> ExpirySessionEvent {
        ExpirySessionEvent {
            user_id: user.into(),
            session_id: "sess-123".into(),
            activity_time: DateTime::from_timestamp(0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_mock_producer_captures_messages() {
        let mock = MockProducer::new();

        let message = OutboundMessage::expired_session(&expired("u1")).unwrap();
        let result = mock.produce_many(vec![message]).await.unwrap();

        assert_eq!(result.events_sent, 1);
        assert_eq!(mock.batch_count(), 1);
        assert_eq!(mock.captured_events()[0].user_id, "u1");
        assert_eq!(mock.captured_messages()[0].key.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_mock_producer_failure_mode() {
        let mock = MockProducer::new();
        mock.set_should_fail(true);

        let result = mock.produce_many(vec![]).await;
        assert!(result.is_err());
        assert_eq!(mock.batch_count(), 0);
    }
}
