//! Redpanda configuration.

use rskafka::client::{Client, ClientBuilder, Credentials, SaslConfig};
use serde::{Deserialize, Serialize};
use session_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::topics::topic;

/// Redpanda connection and producer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses
    pub brokers: Vec<String>,
    /// Batch size (number of records) that wakes the flush task early
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batch timeout in milliseconds
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Compression type (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression: String,
    /// Bound on connecting and on each produce request, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// SASL username (Redpanda Cloud)
    #[serde(default)]
    pub sasl_username: Option<String>,
    /// SASL password (Redpanda Cloud)
    #[serde(default)]
    pub sasl_password: Option<String>,
    /// Inbound activity topic consumer
    #[serde(default = "ConsumerConfig::activity")]
    pub activity: ConsumerConfig,
    /// Outbound expiry topic consumer
    #[serde(default = "ConsumerConfig::expiry")]
    pub expiry: ConsumerConfig,
}

fn default_batch_size() -> usize {
    1000
}

fn default_batch_timeout_ms() -> u64 {
    100
}

fn default_compression() -> String {
    "lz4".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30000
}

impl Default for RedpandaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            compression: default_compression(),
            request_timeout_ms: default_request_timeout_ms(),
            sasl_username: None,
            sasl_password: None,
            activity: ConsumerConfig::activity(),
            expiry: ConsumerConfig::expiry(),
        }
    }
}

impl RedpandaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// SASL credentials, when both halves are configured.
    pub fn sasl_credentials(&self) -> Option<(String, String)> {
        match (&self.sasl_username, &self.sasl_password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        }
    }

    /// Builds a client, with TLS and SCRAM auth when credentials are set.
    pub async fn connect(&self) -> Result<Client> {
        let mut builder = ClientBuilder::new(self.brokers.clone());

        if let Some((username, password)) = self.sasl_credentials() {
            builder = builder
                .tls_config(create_tls_config())
                .sasl_config(SaslConfig::ScramSha256(Credentials::new(username, password)));
        }

        // rskafka retries an unreachable broker indefinitely.
        tokio::time::timeout(self.request_timeout(), builder.build())
            .await
            .map_err(|_| {
                Error::connection(format!(
                    "Timed out connecting to Redpanda after {}ms",
                    self.request_timeout_ms
                ))
            })?
            .map_err(|e| Error::connection(format!("Failed to connect to Redpanda: {}", e)))
    }
}

/// Creates a TLS configuration for Redpanda Cloud.
fn create_tls_config() -> Arc<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Where a consumer starts when it has no committed offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    Earliest,
    #[default]
    Latest,
}

/// Consumer configuration for one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub group_id: String,
    pub topic: String,
    /// Partitions to consume; one worker per partition
    #[serde(default = "default_partitions")]
    pub partitions: i32,
    /// Maximum records per fetch
    #[serde(default = "default_consumer_batch_size")]
    pub batch_size: usize,
    /// Fetch wait in milliseconds
    #[serde(default = "default_consumer_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    #[serde(default)]
    pub start_offset: StartOffset,
}

fn default_partitions() -> i32 {
    5
}

fn default_consumer_batch_size() -> usize {
    500
}

fn default_consumer_batch_timeout_ms() -> u64 {
    1000
}

impl ConsumerConfig {
    pub fn new(group_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            topic: topic.into(),
            partitions: default_partitions(),
            batch_size: default_consumer_batch_size(),
            batch_timeout_ms: default_consumer_batch_timeout_ms(),
            start_offset: StartOffset::default(),
        }
    }

    /// Consumer for inbound activity events.
    pub fn activity() -> Self {
        Self::new("session-activity-tracker", topic::SESSION_LOGS)
    }

    /// Consumer for outbound expiry events.
    pub fn expiry() -> Self {
        Self::new("session-expiry-handler", topic::EXPIRED_SESSIONS)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::activity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redpanda_config_defaults() {
        let config = RedpandaConfig::default();
        assert_eq!(config.brokers, vec!["localhost:9092"]);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.activity.topic, "session_logs");
        assert_eq!(config.expiry.topic, "expired_sessions");
        assert!(config.sasl_credentials().is_none());
    }

    #[test]
    fn test_sasl_requires_both_halves() {
        let mut config = RedpandaConfig {
            sasl_username: Some("svc".into()),
            ..Default::default()
        };
        assert!(config.sasl_credentials().is_none());

        config.sasl_password = Some("secret".into());
        assert_eq!(
            config.sasl_credentials(),
            Some(("svc".to_string(), "secret".to_string()))
        );
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_broker_times_out() {
        let config = RedpandaConfig {
            brokers: vec!["127.0.0.1:1".to_string()],
            request_timeout_ms: 100,
            ..Default::default()
        };

        let result = tokio::time::timeout(Duration::from_secs(5), config.connect())
            .await
            .expect("connect is bounded by the request timeout");
        match result {
            Err(e) => assert_eq!(e.error_code(), Some("CONN_001")),
            Ok(_) => panic!("connected to an unreachable broker"),
        }
    }

    #[test]
    fn test_start_offset_deserialize() {
        let config: ConsumerConfig = serde_json::from_str(
            r#"{"group_id": "g", "topic": "t", "start_offset": "earliest"}"#,
        )
        .unwrap();
        assert_eq!(config.start_offset, StartOffset::Earliest);
        assert_eq!(config.partitions, 5);
    }
}
