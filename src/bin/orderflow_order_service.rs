//! orderflow-order-service: HTTP front door for new orders
//!
//! Accepts `POST /orders`, publishes one `OrderCreated` event per request and
//! replies once the log has acknowledged it.
//!
//! ## Architecture
//! ```text
//! [client] --(HTTP + bearer token)--> [order-service] --(append)--> [log: global.orders.v1]
//! ```
//!
//! ## Configuration
//! - ORDERFLOW_CONFIG: Path to a YAML config file (optional)
//! - ORDERFLOW__SERVER__PORT: HTTP port (default: 8080)
//! - ORDERFLOW__MESSAGING__TYPE: `channel` or `kafka`
//! - ORDERFLOW__AUTH__SIGNING_KEY: Token signing key
//! - ORDERFLOW_LOG: Log filter (default: info)

use std::sync::Arc;

use tracing::{info, warn};

use orderflow::auth::JwtAuth;
use orderflow::bus::init_log_backend;
use orderflow::config::Config;
use orderflow::event::verify_schema;
use orderflow::http::router;
use orderflow::publisher::OrderPublisher;
use orderflow::utils::bootstrap::{connect_with_retry, init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    verify_schema()?;
    let config = Config::load(None)?;

    let backend = init_log_backend(&config.messaging)?;
    let log = connect_with_retry("event log", config.messaging.endpoint(), || {
        backend.event_log()
    })
    .await?;
    let publisher = Arc::new(OrderPublisher::new(
        log,
        &config.messaging.topic,
        config.publisher.ack_timeout(),
    ));

    let auth = if config.auth.enabled {
        if config.auth.uses_dev_key() {
            warn!("Using the built-in development signing key; set auth.signing_key");
        }
        Some(Arc::new(JwtAuth::from_config(&config.auth)))
    } else {
        warn!("Authentication disabled; POST /orders is open");
        None
    };

    let addr = config.server.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        addr = %addr,
        topic = %config.messaging.topic,
        "orderflow-order-service started"
    );

    axum::serve(listener, router(publisher, auth))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("orderflow-order-service stopped");
    Ok(())
}
