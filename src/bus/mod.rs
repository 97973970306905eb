//! Partitioned log abstraction.
//!
//! This module contains:
//! - `EventLog` trait: keyed, durably-acknowledged appends
//! - `LogConsumer` trait: consumer-group reads with manual commit
//! - Log backend configuration and factory
//! - Implementations: Kafka (rdkafka), in-memory channel log, fault injection

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{MessagingConfig, MessagingType};

// Implementation modules
pub mod channel;
pub mod faulty;
#[cfg(feature = "kafka")]
pub mod kafka;

// Re-exports
pub use channel::{ChannelConsumer, ChannelLog};
pub use faulty::{FaultyConsumer, FaultyLog};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConsumer, KafkaLog, KafkaLogConfig};

// ============================================================================
// Traits
// ============================================================================

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors that can occur during log operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Append failed: {0}")]
    Append(String),

    #[error("Poll failed: {0}")]
    Poll(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Seek failed: {0}")]
    Seek(String),

    #[error("Partition assignment for group '{group}' on '{topic}' is held by another member")]
    AssignmentHeld { group: String, topic: String },

    #[error("Consumer is closed")]
    Closed,
}

impl LogError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LogError::Closed | LogError::AssignmentHeld { .. })
    }
}

/// Where the log placed an appended record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub partition: i32,
    pub offset: i64,
}

/// A record read from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl LogRecord {
    /// Position of this record in its topic.
    pub fn position(&self) -> Position {
        Position {
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// Append side of the log.
///
/// Implementations must not acknowledge an append until it is durable
/// (replicated to the configured quorum), and internal retries must not
/// create duplicate records. Shared across concurrent callers.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append `value` to `topic`, routed by `key`.
    ///
    /// Resolves once the log has durably accepted the record or reported a
    /// definitive failure.
    async fn append(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<Position>;
}

/// Read side of the log, bound to one consumer group and topic.
///
/// Owned exclusively by a single worker. New groups start at the earliest
/// offset; existing groups resume from their last committed offset.
#[async_trait]
pub trait LogConsumer: Send {
    /// Wait up to `timeout` for the next record.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<LogRecord>>;

    /// Record that `record` and everything before it in its partition is done.
    async fn commit(&mut self, record: &LogRecord) -> Result<()>;

    /// Move the fetch position back to `record` so the next poll returns it
    /// again.
    async fn rewind(&mut self, record: &LogRecord) -> Result<()>;

    /// Leave the group and release the partition assignment.
    async fn close(&mut self) -> Result<()>;
}

// ============================================================================
// Factory
// ============================================================================

/// A configured log backend that can hand out appenders and consumers.
#[derive(Clone)]
pub enum LogBackend {
    /// In-process log; only visible inside this process.
    Channel(Arc<ChannelLog>),
    /// Kafka cluster.
    #[cfg(feature = "kafka")]
    Kafka(KafkaLogConfig),
}

impl LogBackend {
    /// Build an appender for the backend.
    pub async fn event_log(&self) -> std::result::Result<Arc<dyn EventLog>, LogError> {
        match self {
            LogBackend::Channel(log) => Ok(Arc::clone(log) as Arc<dyn EventLog>),
            #[cfg(feature = "kafka")]
            LogBackend::Kafka(config) => Ok(Arc::new(KafkaLog::new(config.clone())?)),
        }
    }

    /// Join `group_id` on `topic` and return the consumer.
    pub async fn consumer(
        &self,
        group_id: &str,
        topic: &str,
    ) -> std::result::Result<Box<dyn LogConsumer>, LogError> {
        match self {
            LogBackend::Channel(log) => Ok(Box::new(log.consumer(group_id, topic)?)),
            #[cfg(feature = "kafka")]
            LogBackend::Kafka(config) => Ok(Box::new(KafkaConsumer::new(config, group_id, topic)?)),
        }
    }
}

/// Initialize the log backend based on configuration.
///
/// Requires the corresponding feature to be enabled:
/// - Channel: always available
/// - Kafka: `--features kafka`
pub fn init_log_backend(
    config: &MessagingConfig,
) -> std::result::Result<LogBackend, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Channel => {
            let log = ChannelLog::new(config.channel.partitions);
            info!(
                messaging_type = "channel",
                partitions = config.channel.partitions,
                "Log backend initialized"
            );
            Ok(LogBackend::Channel(Arc::new(log)))
        }
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let kafka_config = KafkaLogConfig::from_config(&config.kafka);
                info!(
                    messaging_type = "kafka",
                    bootstrap_servers = %kafka_config.bootstrap_servers,
                    "Log backend initialized"
                );
                Ok(LogBackend::Kafka(kafka_config))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err("Kafka support requires the 'kafka' feature. Rebuild with --features kafka".into())
            }
        }
    }
}
