//! Redpanda health checks.

use crate::config::RedpandaConfig;
use std::collections::HashSet;
use tracing::{debug, error};

/// Check Redpanda connection health.
pub async fn check_connection(config: &RedpandaConfig) -> bool {
    match config.connect().await {
        Ok(client) => match client.list_topics().await {
            Ok(topics) => {
                debug!(topics = topics.len(), "Redpanda connection healthy");
                true
            }
            Err(e) => {
                error!("Failed to list Redpanda topics: {}", e);
                false
            }
        },
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

/// Returns the required topics that do not exist.
///
/// All topics are reported missing when the broker is unreachable.
pub async fn verify_topics(config: &RedpandaConfig, topics: &[&str]) -> Vec<String> {
    let existing: HashSet<String> = match config.connect().await {
        Ok(client) => match client.list_topics().await {
            Ok(found) => found.into_iter().map(|t| t.name).collect(),
            Err(_) => HashSet::new(),
        },
        Err(_) => HashSet::new(),
    };

    missing_topics(&existing, topics)
}

fn missing_topics(existing: &HashSet<String>, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|t| !existing.contains(**t))
        .map(|t| t.to_string())
        .collect()
}
