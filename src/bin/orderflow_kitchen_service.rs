//! orderflow-kitchen-service: consumes orders and prepares them
//!
//! Joins the kitchen consumer group on the orders topic, processes each
//! `OrderCreated` event and commits its offset only after processing
//! succeeded. Run several instances to spread partitions across workers.
//!
//! ## Configuration
//! - ORDERFLOW_CONFIG: Path to a YAML config file (optional)
//! - ORDERFLOW__SUBSCRIBER__GROUP_ID: Consumer group (default: kitchen-service-group)
//! - ORDERFLOW__MESSAGING__TYPE: `channel` or `kafka`
//! - ORDERFLOW_LOG: Log filter (default: info)

use std::sync::Arc;

use tracing::info;

use orderflow::bus::init_log_backend;
use orderflow::config::Config;
use orderflow::event::verify_schema;
use orderflow::subscriber::{KitchenHandler, OrderSubscriber};
use orderflow::utils::bootstrap::{connect_with_retry, init_tracing, shutdown_token};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    verify_schema()?;
    let config = Config::load(None)?;

    let backend = init_log_backend(&config.messaging)?;
    let group_id = config.subscriber.group_id.clone();
    let topic = config.messaging.topic.clone();
    let consumer = connect_with_retry("event log", config.messaging.endpoint(), || {
        backend.consumer(&group_id, &topic)
    })
    .await?;

    info!(
        group_id = %group_id,
        topic = %topic,
        "orderflow-kitchen-service started"
    );

    let subscriber =
        OrderSubscriber::from_config(consumer, Arc::new(KitchenHandler), &config.subscriber);
    let report = subscriber.run(shutdown_token()).await;

    info!(
        committed = report.committed,
        skipped = report.skipped,
        "orderflow-kitchen-service stopped"
    );

    match report.fatal {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}
