//! Activity tracker: buffer, sweep, throttle, publish.
//!
//! One tracker per consumed partition. Each delivered batch runs one cycle:
//! 1. Record every event (earliest time per session wins)
//! 2. Sweep sessions idle past the inactivity threshold out of the buffer
//! 3. If the emission gate permits, publish one expiry event per session
//!    and clear the whole buffer
//!
//! A sweep whose results the gate refuses loses them, because the sessions
//! already left the buffer. `TrackerConfig::retain_throttled` keeps them in
//! a pending set for the next cycle instead.
//!
//! The full-buffer clear also resets sessions that were still active; their
//! tracking restarts from the next event seen.

use chrono::{DateTime, Utc};
use redpanda::{EventProducer, OutboundMessage};
use session_core::{
    ActivityBuffer, ActivityEvent, Clock, EmissionGate, Error, ExpirySessionEvent,
    InactiveSessions, Result, SystemClock, TrackerConfig,
};
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An event that could not be recorded.
#[derive(Debug)]
pub struct RejectedEvent {
    /// Position in the delivered batch
    pub index: usize,
    pub user_id: String,
    pub session_id: String,
    pub error: Error,
}

/// What the emission gate did with a sweep's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Nothing was inactive.
    Nothing,
    /// Published this many sessions.
    Emitted(usize),
    /// Gate closed; results dropped or held for the next cycle.
    Throttled { dropped: usize, retained: usize },
}

/// Summary of one processing cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub recorded: usize,
    pub rejected: Vec<RejectedEvent>,
    /// Sessions found inactive by this cycle's sweep
    pub inactive: usize,
    pub emitted: usize,
    pub dropped: usize,
    /// Sessions held for the next cycle
    pub retained: usize,
}

impl CycleReport {
    pub fn did_emit(&self) -> bool {
        self.emitted > 0
    }
}

/// Stateful inactivity detector for one partition.
pub struct ActivityTracker {
    config: TrackerConfig,
    buffer: ActivityBuffer,
    gate: EmissionGate,
    pending: InactiveSessions,
    clock: Arc<dyn Clock>,
    producer: Arc<dyn EventProducer>,
}

impl ActivityTracker {
    /// Creates a tracker. The first emission waits one yield interval from
    /// now.
    pub fn new(
        config: TrackerConfig,
        producer: Arc<dyn EventProducer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let gate = EmissionGate::new(config.yield_interval(), clock.now());

        Self {
            config,
            buffer: ActivityBuffer::new(),
            gate,
            pending: InactiveSessions::new(),
            clock,
            producer,
        }
    }

    pub fn with_system_clock(config: TrackerConfig, producer: Arc<dyn EventProducer>) -> Self {
        Self::new(config, producer, Arc::new(SystemClock))
    }

    /// Records one activity event into the buffer.
    pub fn record_activity(&mut self, event: &ActivityEvent) -> Result<()> {
        self.buffer.record(event)
    }

    /// Evicts and returns sessions inactive as of `now`.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> InactiveSessions {
        let inactive = self
            .buffer
            .sweep(now, self.config.inactivity_threshold());

        metrics().sweeps.inc();
        metrics().sessions_expired.inc_by(inactive.len() as u64);
        inactive
    }

    /// Publishes `results` if the emission gate permits.
    ///
    /// On publish failure the clock and buffer are left as they were and the
    /// error is returned.
    pub async fn maybe_emit(
        &mut self,
        results: InactiveSessions,
        now: DateTime<Utc>,
    ) -> Result<EmitOutcome> {
        let results = if self.config.retain_throttled {
            let mut held = std::mem::take(&mut self.pending);
            held.merge(results);
            held
        } else {
            results
        };

        if results.is_empty() {
            return Ok(EmitOutcome::Nothing);
        }

        if !self.gate.permits(&results, now) {
            metrics().throttled_sweeps.inc();
            let count = results.len();

            if self.config.retain_throttled {
                debug!(sessions = count, "Emission throttled, holding inactive sessions");
                self.hold(results);
                return Ok(EmitOutcome::Throttled {
                    dropped: 0,
                    retained: count,
                });
            }

            warn!(
                sessions = count,
                since_last_emission_ms = (now - self.gate.last_emission_time()).num_milliseconds(),
                "Emission throttled, dropping inactive sessions"
            );
            metrics().sessions_dropped_by_throttle.inc_by(count as u64);
            return Ok(EmitOutcome::Throttled {
                dropped: count,
                retained: 0,
            });
        }

        match self.flush(&results).await {
            Ok(count) => {
                self.gate.mark_emitted(now);
                self.buffer.clear();
                self.set_pending_gauge();
                Ok(EmitOutcome::Emitted(count))
            }
            Err(e) => {
                if self.config.retain_throttled {
                    self.hold(results);
                }
                Err(e)
            }
        }
    }

    /// Runs one full cycle for a delivered batch.
    pub async fn process_batch(&mut self, events: &[ActivityEvent]) -> Result<CycleReport> {
        let start = std::time::Instant::now();
        let mut report = CycleReport::default();

        for (index, event) in events.iter().enumerate() {
            match self.record_activity(event) {
                Ok(()) => report.recorded += 1,
                Err(error) if !error.is_per_event() => return Err(error),
                Err(error) => {
                    warn!(
                        index = index,
                        user_id = %event.user_id,
                        session_id = %event.session_id,
                        error = %error,
                        "Rejected activity event"
                    );
                    report.rejected.push(RejectedEvent {
                        index,
                        user_id: event.user_id.clone(),
                        session_id: event.session_id.clone(),
                        error,
                    });
                }
            }
        }

        metrics()
            .activity_events_recorded
            .inc_by(report.recorded as u64);
        metrics()
            .activity_events_rejected
            .inc_by(report.rejected.len() as u64);

        let now = self.clock.now();
        let inactive = self.sweep(now);
        report.inactive = inactive.len();

        match self.maybe_emit(inactive, now).await? {
            EmitOutcome::Nothing => {}
            EmitOutcome::Emitted(count) => report.emitted = count,
            EmitOutcome::Throttled { dropped, retained } => {
                report.dropped = dropped;
                report.retained = retained;
            }
        }

        metrics()
            .buffered_sessions
            .set(self.buffer.session_count() as u64);
        metrics()
            .cycle_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        debug!(
            recorded = report.recorded,
            rejected = report.rejected.len(),
            inactive = report.inactive,
            emitted = report.emitted,
            buffered = self.buffer.session_count(),
            "Processed activity batch"
        );

        Ok(report)
    }

    /// Builds one keyed message per session and hands the batch to the
    /// producer in a single call.
    async fn flush(&self, results: &InactiveSessions) -> Result<usize> {
        let total = results.len();
        info!(
            emission_id = %Uuid::new_v4(),
            users = results.user_count(),
            "--- Flushing {} inactive sessions ---",
            total
        );

        let messages = results
            .iter()
            .map(|session| OutboundMessage::expired_session(&ExpirySessionEvent::from(session)))
            .collect::<Result<Vec<_>>>()?;

        self.producer.produce_many(messages).await?;
        metrics().emissions.inc();

        Ok(total)
    }

    fn hold(&mut self, results: InactiveSessions) {
        self.pending = results;
        self.set_pending_gauge();
    }

    fn set_pending_gauge(&self) {
        metrics().pending_sessions.set(self.pending.len() as u64);
    }

    pub fn buffer(&self) -> &ActivityBuffer {
        &self.buffer
    }

    /// Sessions held for the next cycle (always empty unless
    /// `retain_throttled` is set).
    pub fn pending(&self) -> &InactiveSessions {
        &self.pending
    }

    pub fn last_emission_time(&self) -> DateTime<Utc> {
        self.gate.last_emission_time()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}
