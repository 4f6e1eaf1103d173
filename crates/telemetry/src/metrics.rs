//! In-process metrics collection.
//!
//! Collected in memory; the worker scheduler logs a snapshot periodically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for session expiry.
#[derive(Debug, Default)]
pub struct Metrics {
    // Consumer metrics
    pub records_consumed: Counter,
    pub malformed_records: Counter,

    // Tracker metrics
    pub activity_events_recorded: Counter,
    pub activity_events_rejected: Counter,
    pub sweeps: Counter,
    pub sessions_expired: Counter,
    pub sessions_dropped_by_throttle: Counter,
    pub emissions: Counter,
    pub throttled_sweeps: Counter,
    pub cycle_failures: Counter,

    // Producer metrics
    pub expiry_events_sent: Counter,
    pub producer_send_errors: Counter,

    // Expiry handler metrics
    pub expiry_events_handled: Counter,
    pub expiry_hook_failures: Counter,

    // Latency histograms
    pub cycle_latency_ms: Histogram,
    pub producer_latency_ms: Histogram,

    // Gauges
    pub buffered_sessions: Gauge,
    pub pending_sessions: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub records_consumed: u64,
    pub malformed_records: u64,
    pub activity_events_recorded: u64,
    pub activity_events_rejected: u64,
    pub sweeps: u64,
    pub sessions_expired: u64,
    pub sessions_dropped_by_throttle: u64,
    pub emissions: u64,
    pub throttled_sweeps: u64,
    pub cycle_failures: u64,
    pub expiry_events_sent: u64,
    pub producer_send_errors: u64,
    pub expiry_events_handled: u64,
    pub expiry_hook_failures: u64,
    pub cycle_latency_mean_ms: f64,
    pub producer_latency_mean_ms: f64,
    pub buffered_sessions: u64,
    pub pending_sessions: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            records_consumed: self.records_consumed.get(),
            malformed_records: self.malformed_records.get(),
            activity_events_recorded: self.activity_events_recorded.get(),
            activity_events_rejected: self.activity_events_rejected.get(),
            sweeps: self.sweeps.get(),
            sessions_expired: self.sessions_expired.get(),
            sessions_dropped_by_throttle: self.sessions_dropped_by_throttle.get(),
            emissions: self.emissions.get(),
            throttled_sweeps: self.throttled_sweeps.get(),
            cycle_failures: self.cycle_failures.get(),
            expiry_events_sent: self.expiry_events_sent.get(),
            producer_send_errors: self.producer_send_errors.get(),
            expiry_events_handled: self.expiry_events_handled.get(),
            expiry_hook_failures: self.expiry_hook_failures.get(),
            cycle_latency_mean_ms: self.cycle_latency_ms.mean(),
            producer_latency_mean_ms: self.producer_latency_ms.mean(),
            buffered_sessions: self.buffered_sessions.get(),
            pending_sessions: self.pending_sessions.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
