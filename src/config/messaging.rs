//! Messaging and log backend configuration types.

use serde::Deserialize;

use crate::bus::channel::DEFAULT_PARTITIONS;

/// Topic carrying `OrderCreated` events.
pub const DEFAULT_TOPIC: &str = "global.orders.v1";

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process log (no external broker).
    #[default]
    Channel,
    /// Kafka cluster.
    Kafka,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// Topic events are appended to and consumed from.
    pub topic: String,
    /// Kafka-specific configuration.
    pub kafka: KafkaConfig,
    /// Channel-specific configuration.
    pub channel: ChannelConfig,
}

impl MessagingConfig {
    /// Where the log lives, for log output.
    pub fn endpoint(&self) -> &str {
        match self.messaging_type {
            MessagingType::Channel => "in-process",
            MessagingType::Kafka => &self.kafka.bootstrap_servers,
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            messaging_type: MessagingType::Channel,
            topic: DEFAULT_TOPIC.to_string(),
            kafka: KafkaConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Delivery timeout for appends, including client retries.
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

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            message_timeout_ms: 30_000,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }
}

/// In-process log configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Partitions per topic.
    pub partitions: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
        }
    }
}
