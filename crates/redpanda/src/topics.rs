//! Topic definitions.

/// Topic names.
pub mod topic {
    /// Inbound user activity.
    pub const SESSION_LOGS: &str = "session_logs";
    /// Outbound expiry notifications.
    pub const EXPIRED_SESSIONS: &str = "expired_sessions";

    /// All topics for initialization.
    pub const ALL: &[&str] = &[SESSION_LOGS, EXPIRED_SESSIONS];
}

/// Topic configuration.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    pub name: &'static str,
    pub partitions: i32,
}

impl TopicConfig {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            partitions: 5,
        }
    }
}

/// Default topic configurations.
pub fn default_topic_configs() -> Vec<TopicConfig> {
    vec![
        TopicConfig::new(topic::SESSION_LOGS),
        TopicConfig::new(topic::EXPIRED_SESSIONS),
    ]
}

/// Partition count for a known topic.
pub fn partitions_for(name: &str) -> Option<i32> {
    default_topic_configs()
        .into_iter()
        .find(|t| t.name == name)
        .map(|t| t.partitions)
}
