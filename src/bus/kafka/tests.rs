use super::*;

#[test]
fn test_default_config() {
    let config = KafkaLogConfig::new("localhost:9092");
    assert_eq!(config.bootstrap_servers, "localhost:9092");
    assert_eq!(config.message_timeout_ms, 30_000);
    assert!(config.security_protocol.is_none());
}

#[test]
fn test_producer_config_is_durable_and_idempotent() {
    let config = KafkaLogConfig::new("localhost:9092").build_producer_config();
    assert_eq!(config.get("acks"), Some("all"));
    assert_eq!(config.get("enable.idempotence"), Some("true"));
    assert_eq!(config.get("message.timeout.ms"), Some("30000"));
}

#[test]
fn test_consumer_config_uses_manual_commit() {
    let config = KafkaLogConfig::new("localhost:9092").build_consumer_config("kitchen");
    assert_eq!(config.get("group.id"), Some("kitchen"));
    assert_eq!(config.get("enable.auto.commit"), Some("false"));
    assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
}

#[test]
fn test_sasl_config() {
    let config = KafkaLogConfig::new("localhost:9092").with_sasl("user", "pass", "SCRAM-SHA-256");
    assert_eq!(config.sasl_username, Some("user".to_string()));
    assert_eq!(config.sasl_password, Some("pass".to_string()));
    assert_eq!(config.sasl_mechanism, Some("SCRAM-SHA-256".to_string()));
    assert_eq!(config.security_protocol, Some("SASL_SSL".to_string()));

    let client = config.build_producer_config();
    assert_eq!(client.get("sasl.mechanism"), Some("SCRAM-SHA-256"));
}

#[test]
fn test_ssl_config() {
    let config = KafkaLogConfig::new("localhost:9092")
        .with_security_protocol("SSL")
        .with_ssl_ca("/path/to/ca.crt");
    assert_eq!(config.security_protocol, Some("SSL".to_string()));
    assert_eq!(config.ssl_ca_location, Some("/path/to/ca.crt".to_string()));
}

#[test]
fn test_from_app_config_requires_full_sasl_triple() {
    let app = KafkaConfig {
        bootstrap_servers: "kafka:29092".to_string(),
        sasl_username: Some("user".to_string()),
        ..Default::default()
    };
    let config = KafkaLogConfig::from_config(&app);
    assert_eq!(config.bootstrap_servers, "kafka:29092");
    assert!(config.sasl_username.is_none());
    assert!(config.security_protocol.is_none());
}
