//! Activity and expiry event definitions.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use crate::error::{Error, Result};

/// Offset-bearing string formats accepted after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

/// Naive formats, interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Activity time as it arrives on the wire.
///
/// Producers send either epoch seconds or a formatted string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActivityTime {
    Epoch(i64),
    EpochFloat(f64),
    Text(String),
}

impl ActivityTime {
    /// Normalizes to a UTC timestamp.
    pub fn normalize(&self) -> Result<DateTime<Utc>> {
        match self {
            Self::Epoch(secs) => DateTime::from_timestamp(*secs, 0).ok_or_else(|| {
                Error::invalid_activity_time(secs.to_string(), "epoch seconds out of range")
            }),
            Self::EpochFloat(secs) => from_fractional_epoch(*secs),
            Self::Text(raw) => parse_time_str(raw),
        }
    }
}

impl From<DateTime<Utc>> for ActivityTime {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Text(ts.to_rfc3339())
    }
}

impl From<i64> for ActivityTime {
    fn from(secs: i64) -> Self {
        Self::Epoch(secs)
    }
}

impl From<&str> for ActivityTime {
    fn from(raw: &str) -> Self {
        Self::Text(raw.to_string())
    }
}

fn from_fractional_epoch(secs: f64) -> Result<DateTime<Utc>> {
    if !secs.is_finite() {
        return Err(Error::invalid_activity_time(
            secs.to_string(),
            "epoch seconds not finite",
        ));
    }

    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);

    DateTime::from_timestamp(whole as i64, nanos).ok_or_else(|| {
        Error::invalid_activity_time(secs.to_string(), "epoch seconds out of range")
    })
}

fn parse_time_str(raw: &str) -> Result<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::invalid_activity_time(raw, "empty timestamp"));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(value, fmt) {
            return Ok(ts.with_timezone(&Utc));
        }
    }

    let naive = value.strip_suffix(" UTC").unwrap_or(value);
    for fmt in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Ok(ts.and_utc());
        }
    }

    if let Ok(secs) = value.parse::<i64>() {
        return ActivityTime::Epoch(secs).normalize();
    }
    if let Ok(secs) = value.parse::<f64>() {
        return from_fractional_epoch(secs);
    }

    Err(Error::invalid_activity_time(raw, "unrecognized timestamp format"))
}

/// Accepts string or numeric identifiers, storing them as strings.
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Uint(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::Uint(n) => n.to_string(),
    })
}

/// Inbound activity event from `session_logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ActivityEvent {
    #[serde(deserialize_with = "id_string")]
    #[validate(length(min = 1))]
    pub user_id: String,
    #[serde(deserialize_with = "id_string")]
    #[validate(length(min = 1))]
    pub session_id: String,
    pub activity_time: ActivityTime,
}

impl ActivityEvent {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        activity_time: impl Into<ActivityTime>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            activity_time: activity_time.into(),
        }
    }
}

/// A session detected as inactive during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InactiveSession {
    pub user_id: String,
    pub session_id: String,
    pub last_activity_time: DateTime<Utc>,
}

/// Result set of a sweep, grouped by user.
///
/// Ordered maps keep the flattened output stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InactiveSessions {
    users: BTreeMap<String, BTreeMap<String, DateTime<Utc>>>,
}

impl InactiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session. An existing entry keeps the earlier time.
    pub fn insert(
        &mut self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        last_activity_time: DateTime<Utc>,
    ) {
        self.users
            .entry(user_id.into())
            .or_default()
            .entry(session_id.into())
            .and_modify(|t| *t = (*t).min(last_activity_time))
            .or_insert(last_activity_time);
    }

    /// Merges another result set into this one.
    pub fn merge(&mut self, other: InactiveSessions) {
        for (user_id, sessions) in other.users {
            for (session_id, t) in sessions {
                self.insert(user_id.clone(), session_id, t);
            }
        }
    }

    pub fn get(&self, user_id: &str, session_id: &str) -> Option<DateTime<Utc>> {
        self.users.get(user_id)?.get(session_id).copied()
    }

    pub fn contains(&self, user_id: &str, session_id: &str) -> bool {
        self.get(user_id, session_id).is_some()
    }

    /// Number of sessions across all users.
    pub fn len(&self) -> usize {
        self.users.values().map(BTreeMap::len).sum()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Iterates sessions in (user, session) order.
    pub fn iter(&self) -> impl Iterator<Item = InactiveSession> + '_ {
        self.users.iter().flat_map(|(user_id, sessions)| {
            sessions.iter().map(move |(session_id, t)| InactiveSession {
                user_id: user_id.clone(),
                session_id: session_id.clone(),
                last_activity_time: *t,
            })
        })
    }

    /// Flattens into one outbound event per (user, session).
    pub fn to_expiry_events(&self) -> Vec<ExpirySessionEvent> {
        self.iter().map(ExpirySessionEvent::from).collect()
    }
}

/// Outbound message on `expired_sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirySessionEvent {
    pub user_id: String,
    pub session_id: String,
    pub activity_time: DateTime<Utc>,
}

impl ExpirySessionEvent {
    /// Partition key; all expiries of one user share a partition.
    pub fn key(&self) -> &str {
        &self.user_id
    }
}

impl From<InactiveSession> for ExpirySessionEvent {
    fn from(session: InactiveSession) -> Self {
        Self {
            user_id: session.user_id,
            session_id: session.session_id,
            activity_time: session.last_activity_time,
        }
    }
}
