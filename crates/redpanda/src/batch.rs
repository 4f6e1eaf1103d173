//! Record batch accumulator.

use parking_lot::Mutex;
use rskafka::record::Record;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A batch of records bound for one topic partition.
#[derive(Debug)]
pub struct RecordBatch {
    pub topic: String,
    pub partition: i32,
    pub records: Vec<Record>,
    pub created_at: Instant,
}

impl RecordBatch {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
            records: Vec::new(),
            created_at: Instant::now(),
        }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Take the records out, leaving an empty batch for the same partition.
    fn take(&mut self) -> RecordBatch {
        let records = std::mem::take(&mut self.records);
        let created_at = std::mem::replace(&mut self.created_at, Instant::now());
        RecordBatch {
            topic: self.topic.clone(),
            partition: self.partition,
            records,
            created_at,
        }
    }
}

/// Batch accumulator configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum batch size before flush
    pub max_size: usize,
    /// Maximum batch age before flush
    pub max_age: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            max_age: Duration::from_millis(100),
        }
    }
}

/// Accumulates records into batches per topic partition.
pub struct BatchAccumulator {
    config: BatchConfig,
    batches: Mutex<HashMap<(String, i32), RecordBatch>>,
}

impl BatchAccumulator {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            batches: Mutex::new(HashMap::new()),
        }
    }

    /// Add a record to its partition batch.
    /// Returns true once that batch is full and ready for delivery.
    pub fn add(&self, topic: &str, partition: i32, record: Record) -> bool {
        let mut batches = self.batches.lock();

        let batch = batches
            .entry((topic.to_string(), partition))
            .or_insert_with(|| RecordBatch::new(topic, partition));

        batch.push(record);
        batch.len() >= self.config.max_size
    }

    /// Take every batch that is full or has exceeded max age.
    pub fn flush_ready(&self) -> Vec<RecordBatch> {
        let mut batches = self.batches.lock();

        batches
            .values_mut()
            .filter(|batch| {
                !batch.is_empty()
                    && (batch.len() >= self.config.max_size || batch.age() >= self.config.max_age)
            })
            .map(RecordBatch::take)
            .collect()
    }

    /// Put an undelivered batch back ahead of anything queued since.
    pub fn requeue(&self, mut failed: RecordBatch) {
        let mut batches = self.batches.lock();

        let batch = batches
            .entry((failed.topic.clone(), failed.partition))
            .or_insert_with(|| RecordBatch::new(failed.topic.clone(), failed.partition));

        failed.records.append(&mut batch.records);
        batch.records = failed.records;
        batch.created_at = batch.created_at.min(failed.created_at);
    }

    /// Flush all batches regardless of size or age.
    pub fn flush_all(&self) -> Vec<RecordBatch> {
        let mut batches = self.batches.lock();

        batches
            .values_mut()
            .filter(|batch| !batch.is_empty())
            .map(RecordBatch::take)
            .collect()
    }

    /// Records waiting for delivery.
    pub fn pending(&self) -> usize {
        self.batches.lock().values().map(RecordBatch::len).sum()
    }
}
