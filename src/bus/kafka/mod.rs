//! Kafka log implementation.
//!
//! Producer: `acks=all` and `enable.idempotence=true`, so an append is only
//! acknowledged once replicated to the in-sync quorum and librdkafka's
//! internal retries cannot duplicate a record.
//!
//! Consumer: `enable.auto.commit=false` and `auto.offset.reset=earliest`.
//! Offsets are committed explicitly, one record at a time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info, warn};

use super::{EventLog, LogConsumer, LogError, LogRecord, Position, Result};
use crate::config::KafkaConfig;

/// How long `send` may wait for room in the local producer queue.
const QUEUE_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for seek requests.
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for Kafka connection.
#[derive(Clone, Debug)]
pub struct KafkaLogConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Upper bound on delivery, including librdkafka's internal retries.
    pub message_timeout_ms: u64,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl KafkaLogConfig {
    /// Create config for a cluster with default timeouts and no security.
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            message_timeout_ms: 30_000,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }

    /// Build from the messaging section of the application config.
    pub fn from_config(config: &KafkaConfig) -> Self {
        let mut cfg = Self::new(&config.bootstrap_servers)
            .with_message_timeout(Duration::from_millis(config.message_timeout_ms));

        if let (Some(user), Some(pass), Some(mechanism)) = (
            &config.sasl_username,
            &config.sasl_password,
            &config.sasl_mechanism,
        ) {
            cfg = cfg.with_sasl(user, pass, mechanism);
        }

        if let Some(ref protocol) = config.security_protocol {
            cfg = cfg.with_security_protocol(protocol);
        }

        if let Some(ref ca) = config.ssl_ca_location {
            cfg = cfg.with_ssl_ca(ca);
        }

        cfg
    }

    /// Add SASL authentication.
    pub fn with_sasl(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: impl Into<String>,
    ) -> Self {
        self.sasl_username = Some(username.into());
        self.sasl_password = Some(password.into());
        self.sasl_mechanism = Some(mechanism.into());
        self.security_protocol = Some("SASL_SSL".to_string());
        self
    }

    /// Set security protocol.
    pub fn with_security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    /// Set SSL CA certificate location.
    pub fn with_ssl_ca(mut self, ca_location: impl Into<String>) -> Self {
        self.ssl_ca_location = Some(ca_location.into());
        self
    }

    /// Set the delivery timeout.
    pub fn with_message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Build a ClientConfig for producers.
    fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("message.timeout.ms", self.message_timeout_ms.to_string());
        config.set("acks", "all");
        config.set("enable.idempotence", "true");

        self.apply_security_config(&mut config);
        config
    }

    /// Build a ClientConfig for consumers.
    fn build_consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", group_id);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");

        self.apply_security_config(&mut config);
        config
    }

    /// Apply security settings to a ClientConfig.
    fn apply_security_config(&self, config: &mut ClientConfig) {
        if let Some(ref protocol) = self.security_protocol {
            config.set("security.protocol", protocol);
        }

        if let Some(ref mechanism) = self.sasl_mechanism {
            config.set("sasl.mechanism", mechanism);
        }

        if let Some(ref username) = self.sasl_username {
            config.set("sasl.username", username);
        }

        if let Some(ref password) = self.sasl_password {
            config.set("sasl.password", password);
        }

        if let Some(ref ca_location) = self.ssl_ca_location {
            config.set("ssl.ca.location", ca_location);
        }
    }
}

/// Kafka appender.
///
/// One producer per process; `FutureProducer` is internally synchronized
/// and shared by every concurrent request.
pub struct KafkaLog {
    producer: FutureProducer,
}

impl KafkaLog {
    /// Create a new Kafka producer.
    pub fn new(config: KafkaLogConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .build_producer_config()
            .create()
            .map_err(|e| LogError::Connection(format!("Failed to create Kafka producer: {}", e)))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            "Connected to Kafka"
        );

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventLog for KafkaLog {
    async fn append(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<Position> {
        let record = FutureRecord::to(topic).key(key).payload(value);

        let (partition, offset) = self
            .producer
            .send(record, QUEUE_TIMEOUT)
            .await
            .map_err(|(e, _)| LogError::Append(format!("Failed to append: {}", e)))?;

        debug!(topic, partition, offset, "Appended record to Kafka");

        Ok(Position { partition, offset })
    }
}

/// Kafka consumer-group member for one topic.
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
    group_id: String,
    closed: bool,
}

impl KafkaConsumer {
    /// Create a consumer in `group_id` and subscribe it to `topic`.
    pub fn new(config: &KafkaLogConfig, group_id: &str, topic: &str) -> Result<Self> {
        let consumer: StreamConsumer = config
            .build_consumer_config(group_id)
            .create()
            .map_err(|e| LogError::Connection(format!("Failed to create Kafka consumer: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| LogError::Connection(format!("Failed to subscribe to topic: {}", e)))?;

        info!(group_id, topic, "Subscribed to Kafka topic");

        Ok(Self {
            consumer: Arc::new(consumer),
            group_id: group_id.to_string(),
            closed: false,
        })
    }
}

#[async_trait]
impl LogConsumer for KafkaConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<LogRecord>> {
        if self.closed {
            return Err(LogError::Closed);
        }

        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(LogError::Poll(e.to_string())),
            Ok(Ok(message)) => Ok(Some(LogRecord {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec),
            })),
        }
    }

    async fn commit(&mut self, record: &LogRecord) -> Result<()> {
        if self.closed {
            return Err(LogError::Closed);
        }

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(|e| LogError::Commit(e.to_string()))?;

        // Synchronous commit blocks on the broker round trip.
        let consumer = self.consumer.clone();
        tokio::task::spawn_blocking(move || consumer.commit(&offsets, CommitMode::Sync))
            .await
            .map_err(|e| LogError::Commit(format!("Commit task failed: {}", e)))?
            .map_err(|e| LogError::Commit(e.to_string()))?;

        debug!(
            group_id = %self.group_id,
            partition = record.partition,
            offset = record.offset,
            "Committed offset"
        );
        Ok(())
    }

    async fn rewind(&mut self, record: &LogRecord) -> Result<()> {
        if self.closed {
            return Err(LogError::Closed);
        }

        self.consumer
            .seek(
                &record.topic,
                record.partition,
                Offset::Offset(record.offset),
                SEEK_TIMEOUT,
            )
            .map_err(|e| LogError::Seek(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.consumer.unsubscribe();
            info!(group_id = %self.group_id, "Kafka consumer left group");
        }
        Ok(())
    }
}

impl Drop for KafkaConsumer {
    fn drop(&mut self) {
        if !self.closed {
            warn!(group_id = %self.group_id, "Kafka consumer dropped without close");
        }
    }
}

#[cfg(test)]
mod tests;
