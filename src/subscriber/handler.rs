//! Business action invoked for each decoded order.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::info;

use crate::event::OrderCreated;

/// Failure reported by an `OrderHandler`. The record is not committed and
/// will be delivered again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Processing order {order_id} failed: {message}")]
pub struct ProcessingError {
    pub order_id: String,
    pub message: String,
}

impl ProcessingError {
    pub fn new(order_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            message: message.into(),
        }
    }
}

/// Handler for orders read from the log.
///
/// Delivery is at-least-once: the same event can arrive again after a crash
/// or a failed commit, so implementations must be idempotent. They must also
/// report their own failures instead of swallowing them; a returned error is
/// the only thing that keeps the record from being committed.
pub trait OrderHandler: Send + Sync {
    /// Process one order.
    fn process(&self, event: Arc<OrderCreated>) -> BoxFuture<'static, Result<(), ProcessingError>>;
}

/// Kitchen placeholder action: announces that an order is being prepared.
///
/// Stateless, so repeating it for a redelivered event is harmless.
#[derive(Debug, Clone, Copy, Default)]
pub struct KitchenHandler;

impl OrderHandler for KitchenHandler {
    fn process(&self, event: Arc<OrderCreated>) -> BoxFuture<'static, Result<(), ProcessingError>> {
        Box::pin(async move {
            info!(
                order_id = %event.order_id,
                store_id = %event.store_id,
                total = %event.total_display(),
                "Kitchen preparing order"
            );
            Ok(())
        })
    }
}
