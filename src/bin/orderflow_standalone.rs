//! orderflow-standalone: order and kitchen services in one process
//!
//! Runs the HTTP order service and one kitchen subscriber against a shared
//! in-process log. Useful for local development without a Kafka cluster;
//! `messaging.type: kafka` is honored too.
//!
//! ## Configuration
//! Same sources as the individual services (ORDERFLOW_CONFIG, ORDERFLOW__*).

use std::sync::Arc;

use tracing::{info, warn};

use orderflow::auth::JwtAuth;
use orderflow::bus::init_log_backend;
use orderflow::config::Config;
use orderflow::event::verify_schema;
use orderflow::http::router;
use orderflow::publisher::OrderPublisher;
use orderflow::subscriber::{KitchenHandler, OrderSubscriber};
use orderflow::utils::bootstrap::{init_tracing, shutdown_token};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    verify_schema()?;
    let config = Config::load(None)?;
    let topic = config.messaging.topic.clone();

    let backend = init_log_backend(&config.messaging)?;
    let publisher = Arc::new(OrderPublisher::new(
        backend.event_log().await?,
        &topic,
        config.publisher.ack_timeout(),
    ));
    let consumer = backend
        .consumer(&config.subscriber.group_id, &topic)
        .await?;

    let auth = if config.auth.enabled {
        if config.auth.uses_dev_key() {
            warn!("Using the built-in development signing key; set auth.signing_key");
        }
        Some(Arc::new(JwtAuth::from_config(&config.auth)))
    } else {
        None
    };

    let shutdown = shutdown_token();
    let subscriber =
        OrderSubscriber::from_config(consumer, Arc::new(KitchenHandler), &config.subscriber);
    let kitchen = tokio::spawn(subscriber.run(shutdown.clone()));

    let addr = config.server.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, topic = %topic, "orderflow-standalone started");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router(publisher, auth))
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await?;

    shutdown.cancel();
    let report = kitchen.await?;
    info!(committed = report.committed, "orderflow-standalone stopped");

    match report.fatal {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}
