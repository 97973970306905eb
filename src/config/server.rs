//! Server, auth, and pipeline timing configuration types.

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

/// Signing key used when none is configured. Only fit for local development.
pub const DEV_SIGNING_KEY: &str = "super-secret-key-for-dev-only";

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port for the order HTTP API.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind.
    pub fn bind_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Bearer token configuration for the order API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require a valid token on `POST /orders`.
    pub enabled: bool,
    /// HMAC-SHA256 signing key.
    pub signing_key: String,
    /// Expected `iss` claim.
    pub issuer: String,
    /// Lifetime of issued tokens.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signing_key: DEV_SIGNING_KEY.to_string(),
            issuer: "global-order-platform".to_string(),
            token_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl AuthConfig {
    /// Whether the development key is still in use.
    pub fn uses_dev_key(&self) -> bool {
        self.signing_key == DEV_SIGNING_KEY
    }
}

/// Publisher configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// How long a publish waits for the log to acknowledge.
    pub ack_timeout_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 10_000,
        }
    }
}

impl PublisherConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Consumer group id.
    pub group_id: String,
    /// How long one poll waits for a record.
    pub poll_timeout_ms: u64,
    /// First pause after a poll or processing failure.
    pub backoff_min_ms: u64,
    /// Longest pause between consecutive failures.
    pub backoff_max_ms: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            group_id: "kitchen-service-group".to_string(),
            poll_timeout_ms: 100,
            backoff_min_ms: 100,
            backoff_max_ms: 5_000,
        }
    }
}

impl SubscriberConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn backoff_min(&self) -> Duration {
        Duration::from_millis(self.backoff_min_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_bind_addr_ipv6() {
        let config = ServerConfig {
            host: "::".to_string(),
            port: 9090,
        };
        assert_eq!(config.bind_addr().unwrap().to_string(), "[::]:9090");

        let config = ServerConfig {
            host: "::1".to_string(),
            port: 8080,
        };
        assert!(config.bind_addr().unwrap().is_ipv6());
    }

    #[test]
    fn test_bind_addr_rejects_bad_host() {
        let config = ServerConfig {
            host: "not an address".to_string(),
            port: 8080,
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_auth_config_default_uses_dev_key() {
        let config = AuthConfig::default();
        assert!(config.enabled);
        assert!(config.uses_dev_key());
        assert_eq!(config.issuer, "global-order-platform");
    }

    #[test]
    fn test_subscriber_config_durations() {
        let config = SubscriberConfig::default();
        assert_eq!(config.group_id, "kitchen-service-group");
        assert_eq!(config.poll_timeout(), Duration::from_millis(100));
        assert!(config.backoff_min() < config.backoff_max());
    }
}
