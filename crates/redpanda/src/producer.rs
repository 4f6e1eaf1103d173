//! Redpanda producer using rskafka.
//!
//! `produce_many` only queues: records are routed to a partition by key and
//! appended to that partition's batch. Delivery happens on the background
//! flush task, woken early when a batch fills. A batch that fails to deliver
//! goes back to the front of its queue for the next attempt.

use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::{
    partition::{Compression, PartitionClient, UnknownTopicHandling},
    Client,
};
use rskafka::record::Record;
use serde::Serialize;
use session_core::{Error, ExpirySessionEvent, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use telemetry::{health, metrics};
use tokio::sync::{Notify, OnceCell, RwLock};
use tracing::{debug, error, warn};

use crate::batch::{BatchAccumulator, BatchConfig, RecordBatch};
use crate::config::RedpandaConfig;
use crate::partitioner::partition_for;
use crate::topics::{partitions_for, topic};

/// Background flush tick.
const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// An outbound record before partition routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    /// Serializes `value` as the JSON payload.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        key: Option<String>,
        value: &T,
    ) -> Result<Self> {
        Ok(Self {
            topic: topic.into(),
            key,
            payload: serde_json::to_vec(value)?,
        })
    }

    /// Expiry message keyed by user id.
    pub fn expired_session(event: &ExpirySessionEvent) -> Result<Self> {
        Self::json(
            topic::EXPIRED_SESSIONS,
            Some(event.key().to_string()),
            event,
        )
    }
}

/// Result of handing messages to a producer.
#[derive(Debug, Default)]
pub struct SendResult {
    /// Confirmed by the broker during this call
    pub events_sent: usize,
    /// Accepted and waiting for background delivery
    pub events_queued: usize,
}

/// Publish port for outbound messages.
#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Accepts a whole batch, or fails without accepting any of it.
    async fn produce_many(&self, messages: Vec<OutboundMessage>) -> Result<SendResult>;
}

/// Batching producer.
pub struct Producer {
    accumulator: Arc<BatchAccumulator>,
    config: RedpandaConfig,
    client: OnceCell<Arc<Client>>,
    /// Cached partition clients per topic partition
    partitions: RwLock<BTreeMap<(String, i32), Arc<PartitionClient>>>,
    /// Wakes the flush task when a batch fills
    ready: Notify,
}

impl Producer {
    /// Creates a new producer. Connects lazily on first delivery.
    pub async fn new(config: RedpandaConfig) -> Result<Self> {
        let batch_config = BatchConfig {
            max_size: config.batch_size,
            max_age: Duration::from_millis(config.batch_timeout_ms),
        };

        Ok(Self {
            accumulator: Arc::new(BatchAccumulator::new(batch_config)),
            config,
            client: OnceCell::new(),
            partitions: RwLock::new(BTreeMap::new()),
            ready: Notify::new(),
        })
    }

    async fn client(&self) -> Result<Arc<Client>> {
        self.client
            .get_or_try_init(|| async { self.config.connect().await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Gets or creates a partition client.
    async fn get_client(&self, topic: &str, partition: i32) -> Result<Arc<PartitionClient>> {
        let key = (topic.to_string(), partition);

        {
            let clients = self.partitions.read().await;
            if let Some(client) = clients.get(&key) {
                return Ok(client.clone());
            }
        }

        let partition_client = self
            .client()
            .await?
            .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error)
            .await
            .map_err(|e| Error::connection(format!("Failed to get partition client: {}", e)))?;

        let partition_client = Arc::new(partition_client);

        {
            let mut clients = self.partitions.write().await;
            clients.insert(key, partition_client.clone());
        }

        Ok(partition_client)
    }

    fn compression(&self) -> Compression {
        match self.config.compression.as_str() {
            "gzip" => Compression::Gzip,
            "snappy" => Compression::Snappy,
            "lz4" => Compression::Lz4,
            "zstd" => Compression::Zstd,
            _ => Compression::NoCompression,
        }
    }

    fn partition_count(&self, topic: &str) -> i32 {
        if topic == self.config.expiry.topic {
            return self.config.expiry.partitions;
        }
        if topic == self.config.activity.topic {
            return self.config.activity.partitions;
        }
        partitions_for(topic).unwrap_or(1)
    }

    /// Delivers a batch to its partition, bounded by the request timeout.
    async fn send_batch(&self, batch: &RecordBatch) -> Result<usize> {
        let start = std::time::Instant::now();

        let count = tokio::time::timeout(self.config.request_timeout(), self.produce(batch))
            .await
            .map_err(|_| Error::publish("Produce request timed out"))??;

        let elapsed = start.elapsed();
        metrics().expiry_events_sent.inc_by(count as u64);
        metrics().producer_latency_ms.observe(elapsed.as_millis() as u64);

        debug!(
            topic = %batch.topic,
            partition = batch.partition,
            count = count,
            latency_ms = %elapsed.as_millis(),
            "Flushed batch to Redpanda"
        );

        Ok(count)
    }

    async fn produce(&self, batch: &RecordBatch) -> Result<usize> {
        let client = self.get_client(&batch.topic, batch.partition).await?;

        client
            .produce(batch.records.clone(), self.compression())
            .await
            .map_err(|e| Error::publish(format!("Failed to produce: {}", e)))?;

        Ok(batch.len())
    }

    /// Delivers a batch; on failure it is requeued and the broker marked
    /// unhealthy.
    async fn flush_batch(&self, batch: RecordBatch) -> Result<usize> {
        match self.send_batch(&batch).await {
            Ok(count) => {
                health().redpanda.set_healthy();
                Ok(count)
            }
            Err(e) => {
                error!(
                    topic = %batch.topic,
                    partition = batch.partition,
                    records = batch.len(),
                    "Failed to send batch to Redpanda: {}",
                    e
                );
                metrics().producer_send_errors.inc_by(batch.len() as u64);
                health().redpanda.set_unhealthy(e.to_string());
                self.accumulator.requeue(batch);
                Err(e)
            }
        }
    }

    /// Starts the background flush task.
    pub fn start_flush_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let producer = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = producer.ready.notified() => {}
                }

                for batch in producer.accumulator.flush_ready() {
                    if producer.flush_batch(batch).await.is_err() {
                        warn!("Batch requeued for the next flush");
                    }
                }
            }
        })
    }

    /// Flushes all pending batches. Undelivered batches stay queued.
    pub async fn flush(&self) -> Result<()> {
        let mut result = Ok(());
        for batch in self.accumulator.flush_all() {
            if let Err(e) = self.flush_batch(batch).await {
                result = Err(e);
            }
        }
        result
    }

    /// Records waiting for delivery.
    pub fn pending(&self) -> usize {
        self.accumulator.pending()
    }
}

#[async_trait]
impl EventProducer for Producer {
    /// Routes and queues every message without touching the network.
    async fn produce_many(&self, messages: Vec<OutboundMessage>) -> Result<SendResult> {
        let count = messages.len();
        let mut batch_full = false;

        for message in messages {
            let partition =
                partition_for(message.key.as_deref(), self.partition_count(&message.topic));

            let record = Record {
                key: message.key.map(String::into_bytes),
                value: Some(message.payload),
                headers: BTreeMap::new(),
                timestamp: Utc::now(),
            };

            batch_full |= self.accumulator.add(&message.topic, partition, record);
        }

        if batch_full {
            self.ready.notify_one();
        }

        Ok(SendResult {
            events_sent: 0,
            events_queued: count,
        })
    }
}
