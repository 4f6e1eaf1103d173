//! Tracker configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::Result;

/// Sessions idle longer than this are expired (seconds).
pub const INACTIVITY_THRESHOLD_SECS: i64 = 3600;

/// Minimum spacing between emissions (seconds).
pub const YIELD_INTERVAL_SECS: i64 = 3;

/// Upper bound for either interval: 100 years.
pub const MAX_INTERVAL_SECS: i64 = 3_153_600_000;

/// Activity tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrackerConfig {
    /// Inactivity threshold in seconds
    #[serde(default = "default_inactivity_threshold_secs")]
    #[validate(range(min = 0, max = 3_153_600_000_i64))]
    pub inactivity_threshold_secs: i64,
    /// Minimum seconds between emissions
    #[serde(default = "default_yield_interval_secs")]
    #[validate(range(min = 0, max = 3_153_600_000_i64))]
    pub yield_interval_secs: i64,
    /// Keep throttled or unpublished results for the next sweep instead of
    /// dropping them. Off by default: a throttled sweep loses its results.
    #[serde(default)]
    pub retain_throttled: bool,
}

fn default_inactivity_threshold_secs() -> i64 {
    INACTIVITY_THRESHOLD_SECS
}

fn default_yield_interval_secs() -> i64 {
    YIELD_INTERVAL_SECS
}

fn bounded_seconds(secs: i64) -> Duration {
    Duration::try_seconds(secs.clamp(0, MAX_INTERVAL_SECS)).unwrap_or_else(Duration::zero)
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold_secs: default_inactivity_threshold_secs(),
            yield_interval_secs: default_yield_interval_secs(),
            retain_throttled: false,
        }
    }
}

impl TrackerConfig {
    /// Rejects intervals outside `0..=MAX_INTERVAL_SECS`.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        Ok(())
    }

    /// Threshold clamped to `0..=MAX_INTERVAL_SECS`.
    pub fn inactivity_threshold(&self) -> Duration {
        bounded_seconds(self.inactivity_threshold_secs)
    }

    /// Yield interval clamped to `0..=MAX_INTERVAL_SECS`.
    pub fn yield_interval(&self) -> Duration {
        bounded_seconds(self.yield_interval_secs)
    }

    pub fn with_retain_throttled(mut self, retain: bool) -> Self {
        self.retain_throttled = retain;
        self
    }
}
