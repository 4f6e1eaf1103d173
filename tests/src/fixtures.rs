//! Test fixtures and event generators.

use chrono::{DateTime, Utc};
use session_core::{ActivityEvent, ActivityTime};

/// Timestamp `secs` after the Unix epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Activity event with an epoch-seconds time.
pub fn activity(user_id: &str, session_id: &str, secs: i64) -> ActivityEvent {
    ActivityEvent::new(user_id, session_id, secs)
}

/// Activity event with an RFC 3339 string time.
pub fn activity_str(user_id: &str, session_id: &str, secs: i64) -> ActivityEvent {
    ActivityEvent::new(user_id, session_id, at(secs))
}

/// Activity event whose time cannot be parsed.
pub fn activity_malformed(user_id: &str, session_id: &str) -> ActivityEvent {
    ActivityEvent {
        user_id: user_id.to_string(),
        session_id: session_id.to_string(),
        activity_time: ActivityTime::Text("last tuesday".to_string()),
    }
}

/// `n` sessions for one user, all active at `secs`.
pub fn user_sessions(user_id: &str, n: usize, secs: i64) -> Vec<ActivityEvent> {
    (0..n)
        .map(|i| activity(user_id, &format!("s{}", i), secs))
        .collect()
}

/// Raw `session_logs` payload as a producer would send it.
pub fn session_log_json(user_id: &str, session_id: &str, activity_time: &str) -> Vec<u8> {
    serde_json::json!({
        "user_id": user_id,
        "session_id": session_id,
        "activity_time": activity_time,
    })
    .to_string()
    .into_bytes()
}
