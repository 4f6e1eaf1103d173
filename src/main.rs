//! Session Expiry Service
//!
//! Detects user sessions that have gone silent:
//! - Consumes activity events from `session_logs`, one tracker per partition
//! - Publishes throttled batches of expiry events to `expired_sessions`
//! - Consumes `expired_sessions` and runs expiry hooks

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use redpanda::{topic, Consumer, ConsumerConfig, EventProducer, Producer, RedpandaConfig};
use session_core::TrackerConfig;
use telemetry::{health, init_tracing_from_env};
use worker::{ExpiryHandler, WorkerConfig, WorkerScheduler};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    redpanda: RedpandaConfig,

    #[serde(default)]
    tracker: TrackerConfig,

    #[serde(default)]
    worker: WorkerConfig,

    /// Run the expiry handler in this process
    #[serde(default = "default_handle_expiries")]
    handle_expiries: bool,
}

fn default_handle_expiries() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redpanda: RedpandaConfig::default(),
            tracker: TrackerConfig::default(),
            worker: WorkerConfig::default(),
            handle_expiries: default_handle_expiries(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ requires explicit crypto provider selection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Session Expiry v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;

    info!(
        brokers = ?config.redpanda.brokers,
        sasl_username = config.redpanda.sasl_username.as_deref().unwrap_or("none"),
        threshold_secs = config.tracker.inactivity_threshold_secs,
        yield_interval_secs = config.tracker.yield_interval_secs,
        retain_throttled = config.tracker.retain_throttled,
        "Loaded configuration"
    );

    check_health(&config).await;

    let producer = Arc::new(
        Producer::new(config.redpanda.clone())
            .await
            .context("Failed to create Redpanda producer")?,
    );
    let _flush_handle = producer.clone().start_flush_task();

    let activity_consumers = build_consumers(&config.redpanda, &config.redpanda.activity)
        .await
        .context("Failed to create activity consumers")?;

    let mut scheduler = WorkerScheduler::new(
        config.worker.clone(),
        config.tracker.clone(),
        producer.clone() as Arc<dyn EventProducer>,
    )
    .with_activity_consumers(activity_consumers);

    if config.handle_expiries {
        let expiry_consumers = build_consumers(&config.redpanda, &config.redpanda.expiry)
            .await
            .context("Failed to create expiry consumers")?;
        scheduler =
            scheduler.with_expiry_consumers(expiry_consumers, Arc::new(ExpiryHandler::new()));
    }

    let _worker_handles = Arc::new(scheduler).start();

    shutdown_signal().await;

    info!("Shutting down...");

    // Buffered tracker state is not persisted; only queued expiries are flushed.
    if let Err(e) = producer.flush().await {
        error!("Failed to flush producer: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// One consumer per configured partition.
async fn build_consumers(
    connection: &RedpandaConfig,
    config: &ConsumerConfig,
) -> Result<Vec<Arc<Consumer>>> {
    let mut consumers = Vec::with_capacity(config.partitions.max(0) as usize);
    for partition in 0..config.partitions {
        let consumer = Consumer::new(connection, config.clone(), partition)
            .await
            .with_context(|| format!("Failed to create consumer for partition {}", partition))?;
        consumers.push(Arc::new(consumer));
    }
    Ok(consumers)
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        .add_source(config::Config::try_from(&Config::default())?)
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("SESSION_EXPIRY")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Nested parsing in the config crate is unreliable for underscored field names
    if let Ok(brokers) = std::env::var("SESSION_EXPIRY_REDPANDA_BROKERS") {
        config.redpanda.brokers = brokers.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Ok(username) = std::env::var("SESSION_EXPIRY_REDPANDA_SASL_USERNAME") {
        config.redpanda.sasl_username = Some(username);
    }
    if let Ok(password) = std::env::var("SESSION_EXPIRY_REDPANDA_SASL_PASSWORD") {
        config.redpanda.sasl_password = Some(password);
    }

    config
        .tracker
        .check()
        .context("Tracker intervals must be between 0 and 100 years")?;

    Ok(config)
}

/// Check broker health and required topics on startup.
async fn check_health(config: &Config) {
    if redpanda::health::check_connection(&config.redpanda).await {
        health().redpanda.set_healthy();
        info!("Redpanda connection: healthy");
    } else {
        health().redpanda.set_unhealthy("Connection failed");
        error!("Redpanda connection: unhealthy");
        return;
    }

    let missing = redpanda::health::verify_topics(&config.redpanda, topic::ALL).await;
    if !missing.is_empty() {
        warn!(missing = ?missing, "Required topics not found");
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
