//! Earliest-activity buffer per (user, session).
//!
//! A session's clock never advances once it is in the buffer: later
//! activity only lowers the stored time. Entries leave the buffer when a
//! sweep finds them inactive or when the whole buffer is cleared.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use validator::Validate;

use crate::error::Result;
use crate::events::{ActivityEvent, InactiveSessions};

/// Per-user map of session id to earliest activity time.
type Sessions = HashMap<String, DateTime<Utc>>;

/// Instance-owned activity buffer.
#[derive(Debug, Default)]
pub struct ActivityBuffer {
    users: HashMap<String, Sessions>,
}

impl ActivityBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one activity event, keeping the earliest time per session.
    ///
    /// Fails without touching the buffer if the ids are empty or the
    /// activity time cannot be normalized.
    pub fn record(&mut self, event: &ActivityEvent) -> Result<()> {
        event.validate()?;
        let activity_time = event.activity_time.normalize()?;

        self.record_at(&event.user_id, &event.session_id, activity_time);
        Ok(())
    }

    /// Records an already-normalized activity time.
    pub fn record_at(&mut self, user_id: &str, session_id: &str, activity_time: DateTime<Utc>) {
        self.users
            .entry(user_id.to_string())
            .or_default()
            .entry(session_id.to_string())
            .and_modify(|earliest| *earliest = (*earliest).min(activity_time))
            .or_insert(activity_time);
    }

    /// Evicts every session whose earliest activity is strictly older than
    /// `now - threshold` and returns them. Users left without sessions are
    /// removed. A cutoff before the earliest representable time expires
    /// nothing.
    pub fn sweep(&mut self, now: DateTime<Utc>, threshold: Duration) -> InactiveSessions {
        let mut inactive = InactiveSessions::new();
        let Some(cutoff) = now.checked_sub_signed(threshold) else {
            return inactive;
        };

        for (user_id, sessions) in self.users.iter_mut() {
            sessions.retain(|session_id, activity_time| {
                if *activity_time < cutoff {
                    inactive.insert(user_id.as_str(), session_id.as_str(), *activity_time);
                    false
                } else {
                    true
                }
            });
        }

        self.users.retain(|_, sessions| !sessions.is_empty());
        inactive
    }

    /// Earliest recorded activity for a session.
    pub fn earliest(&self, user_id: &str, session_id: &str) -> Option<DateTime<Utc>> {
        self.users.get(user_id)?.get(session_id).copied()
    }

    pub fn contains_user(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// Number of sessions across all users.
    pub fn session_count(&self) -> usize {
        self.users.values().map(HashMap::len).sum()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}
