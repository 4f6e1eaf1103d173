//! Redpanda consumer for one topic partition.
//!
//! Uses rskafka for Kafka-compatible message consumption with:
//! - Manual offset management for at-least-once delivery
//! - Batch fetching with configurable size and timeout
//! - JSON deserialization into any `DeserializeOwned` payload

use rskafka::client::partition::{OffsetAt, PartitionClient, UnknownTopicHandling};
use rskafka::record::RecordAndOffset;
use serde::de::DeserializeOwned;
use session_core::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry::{health, metrics};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{ConsumerConfig, RedpandaConfig, StartOffset};

/// Offset tracking for manual commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub partition: i32,
    pub offset: i64,
}

/// Decoded records from one fetch.
#[derive(Debug)]
pub struct FetchedBatch<T> {
    pub records: Vec<T>,
    /// Offset to commit once the records are processed
    pub offset: Option<Offset>,
    /// Records skipped because their payload did not decode
    pub malformed: usize,
}

impl<T> FetchedBatch<T> {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            offset: None,
            malformed: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Consumer for reading one partition of a topic.
pub struct Consumer {
    config: ConsumerConfig,
    connection: RedpandaConfig,
    partition: i32,
    partition_client: RwLock<Option<Arc<PartitionClient>>>,
    /// Next offset to read
    current_offset: AtomicI64,
    initialized: AtomicBool,
}

impl Consumer {
    /// Creates a new consumer. Connects lazily on first fetch.
    pub async fn new(
        connection: &RedpandaConfig,
        config: ConsumerConfig,
        partition: i32,
    ) -> Result<Self> {
        info!(
            group_id = %config.group_id,
            topic = %config.topic,
            partition = partition,
            batch_size = config.batch_size,
            "Creating Redpanda consumer"
        );

        Ok(Self {
            config,
            connection: connection.clone(),
            partition,
            partition_client: RwLock::new(None),
            current_offset: AtomicI64::new(-1),
            initialized: AtomicBool::new(false),
        })
    }

    async fn ensure_connected(&self) -> Result<Arc<PartitionClient>> {
        {
            let client = self.partition_client.read().await;
            if let Some(ref c) = *client {
                return Ok(c.clone());
            }
        }

        let client = self.connection.connect().await?;

        let partition_client = client
            .partition_client(
                self.config.topic.clone(),
                self.partition,
                UnknownTopicHandling::Error,
            )
            .await
            .map_err(|e| Error::connection(format!("Failed to get partition client: {}", e)))?;

        let partition_client = Arc::new(partition_client);

        // Committed offset survives reconnects; only the first connect seeks.
        if !self.initialized.load(Ordering::SeqCst) {
            let at = match self.config.start_offset {
                StartOffset::Earliest => OffsetAt::Earliest,
                StartOffset::Latest => OffsetAt::Latest,
            };
            let offset = partition_client
                .get_offset(at)
                .await
                .map_err(|e| Error::connection(format!("Failed to get offset: {}", e)))?;

            self.current_offset.store(offset, Ordering::SeqCst);
            self.initialized.store(true, Ordering::SeqCst);

            info!(
                topic = %self.config.topic,
                partition = self.partition,
                offset = offset,
                "Consumer initialized at offset"
            );
        }

        {
            let mut client_guard = self.partition_client.write().await;
            *client_guard = Some(partition_client.clone());
        }

        Ok(partition_client)
    }

    /// Fetches a batch of records.
    ///
    /// Waits up to `batch_timeout_ms` for data. Records whose payload does
    /// not decode are skipped and counted; their offsets are still covered
    /// by the returned commit offset.
    pub async fn fetch_batch<T: DeserializeOwned>(&self) -> Result<FetchedBatch<T>> {
        match self.fetch().await {
            Ok(records) => {
                health().redpanda.set_healthy();
                Ok(self.decode(records))
            }
            Err(e) => {
                health().redpanda.set_unhealthy(e.to_string());
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<RecordAndOffset>> {
        let client = self.ensure_connected().await?;

        let timeout = Duration::from_millis(self.config.batch_timeout_ms);
        let max_bytes = (self.config.batch_size * 64 * 1024).min(i32::MAX as usize) as i32;

        let current = self.current_offset.load(Ordering::SeqCst);

        let (records, _watermark) = client
            .fetch_records(current, 1..max_bytes, timeout.as_millis() as i32)
            .await
            .map_err(|e| {
                error!(
                    topic = %self.config.topic,
                    partition = self.partition,
                    "Fetch error: {}",
                    e
                );
                Error::connection(format!("Failed to fetch records: {}", e))
            })?;

        Ok(records)
    }

    /// Decodes fetched records. Undecodable payloads are skipped and counted;
    /// their offsets are still covered by the returned commit offset.
    fn decode<T: DeserializeOwned>(&self, records: Vec<RecordAndOffset>) -> FetchedBatch<T> {
        if records.is_empty() {
            return FetchedBatch::empty();
        }

        let current = self.current_offset.load(Ordering::SeqCst);

        let mut decoded = Vec::with_capacity(records.len());
        let mut malformed = 0;
        let mut max_offset = current;

        for record in records {
            max_offset = record.offset.max(max_offset);

            match record.record.value {
                Some(value) => match serde_json::from_slice::<T>(&value) {
                    Ok(payload) => decoded.push(payload),
                    Err(e) => {
                        malformed += 1;
                        warn!(
                            topic = %self.config.topic,
                            offset = record.offset,
                            error = %e,
                            "Failed to deserialize record"
                        );
                    }
                },
                None => malformed += 1,
            }
        }

        metrics().records_consumed.inc_by(decoded.len() as u64);
        if malformed > 0 {
            metrics().malformed_records.inc_by(malformed as u64);
        }

        debug!(
            topic = %self.config.topic,
            partition = self.partition,
            records = decoded.len(),
            malformed = malformed,
            offset_start = current,
            offset_end = max_offset,
            "Fetched batch from Redpanda"
        );

        FetchedBatch {
            records: decoded,
            offset: Some(Offset {
                partition: self.partition,
                offset: max_offset + 1,
            }),
            malformed,
        }
    }

    /// Commits an offset after successful processing.
    ///
    /// Until a commit, every fetch re-reads from the last committed offset.
    pub async fn commit(&self, offset: Offset) -> Result<()> {
        let prev = self.current_offset.swap(offset.offset, Ordering::SeqCst);

        debug!(
            topic = %self.config.topic,
            partition = offset.partition,
            prev_offset = prev,
            new_offset = offset.offset,
            "Committed offset"
        );

        Ok(())
    }

    /// Returns the current consumer offset.
    pub fn current_offset(&self) -> i64 {
        self.current_offset.load(Ordering::SeqCst)
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Returns the consumer configuration.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Checks if the consumer is healthy.
    pub async fn health_check(&self) -> bool {
        match self.ensure_connected().await {
            Ok(_) => true,
            Err(e) => {
                error!("Consumer health check failed: {}", e);
                false
            }
        }
    }

    /// Resets the connection (for error recovery).
    pub async fn reset_connection(&self) {
        let mut client = self.partition_client.write().await;
        *client = None;
        info!(
            topic = %self.config.topic,
            partition = self.partition,
            "Consumer connection reset"
        );
    }
}
