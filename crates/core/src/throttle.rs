//! Emission throttle.

use chrono::{DateTime, Duration, Utc};

use crate::events::InactiveSessions;

/// Gate limiting how often results are emitted downstream.
#[derive(Debug, Clone)]
pub struct EmissionGate {
    last_emission_time: DateTime<Utc>,
    yield_interval: Duration,
}

impl EmissionGate {
    /// The interval is measured from `started_at` until the first emission.
    pub fn new(yield_interval: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            last_emission_time: started_at,
            yield_interval,
        }
    }

    /// Emission requires a non-empty result set and a full yield interval
    /// since the last emission.
    pub fn permits(&self, results: &InactiveSessions, now: DateTime<Utc>) -> bool {
        !results.is_empty() && now - self.last_emission_time >= self.yield_interval
    }

    pub fn mark_emitted(&mut self, now: DateTime<Utc>) {
        self.last_emission_time = now;
    }

    pub fn last_emission_time(&self) -> DateTime<Utc> {
        self.last_emission_time
    }

    pub fn yield_interval(&self) -> Duration {
        self.yield_interval
    }
}
