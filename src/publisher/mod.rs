//! Order publisher.
//!
//! Turns one validated order request into one durably appended
//! `OrderCreated` event. The call returns only after the log confirms the
//! append, reports a failure, or the deadline passes.
//!
//! There is exactly one append per call and no retry here: retries that
//! cannot duplicate records belong to the log client (idempotent produce),
//! and any further retry policy belongs to the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{EventLog, LogError, Position};
use crate::event::{codec, OrderCreated, STATUS_NEW};

/// Order total in minor currency units, limited to `0..=i32::MAX` so it
/// always fits the wire `int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AmountCents(i32);

/// Amount outside the range the schema can carry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("total_amount_cents must be between 0 and {max}, got {value}", max = i32::MAX)]
pub struct InvalidAmount {
    pub value: i64,
}

impl AmountCents {
    pub fn new(cents: i64) -> Result<Self, InvalidAmount> {
        match i32::try_from(cents) {
            Ok(value) if value >= 0 => Ok(Self(value)),
            _ => Err(InvalidAmount { value: cents }),
        }
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

/// A validated order, as delivered by the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub store_id: String,
    pub total_amount_cents: AmountCents,
}

impl OrderRequest {
    pub fn new(store_id: impl Into<String>, total_amount_cents: AmountCents) -> Self {
        Self {
            store_id: store_id.into(),
            total_amount_cents,
        }
    }
}

/// Confirmation that an order's event is durably in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub order_id: String,
    pub position: Position,
}

/// Errors from publishing an order.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The log reported a definitive failure. Nothing was published.
    #[error("Log rejected order {order_id}: {source}")]
    Rejected {
        order_id: String,
        #[source]
        source: LogError,
    },

    /// No acknowledgement before the deadline. The append may or may not
    /// have happened; callers must not treat this as a confirmed failure.
    #[error("No acknowledgement for order {order_id} after {waited:?}; outcome unknown")]
    Timeout { order_id: String, waited: Duration },
}

impl PublishError {
    /// The order id that was generated for the failed publish.
    pub fn order_id(&self) -> &str {
        match self {
            PublishError::Rejected { order_id, .. } | PublishError::Timeout { order_id, .. } => {
                order_id
            }
        }
    }

    /// Whether the event might have been appended despite the error.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, PublishError::Timeout { .. })
    }
}

/// Publishes `OrderCreated` events to one topic.
///
/// Cheap to share: the log client is the only resource and is reused by
/// every concurrent call.
pub struct OrderPublisher {
    log: Arc<dyn EventLog>,
    topic: String,
    ack_timeout: Duration,
}

impl OrderPublisher {
    pub fn new(log: Arc<dyn EventLog>, topic: impl Into<String>, ack_timeout: Duration) -> Self {
        Self {
            log,
            topic: topic.into(),
            ack_timeout,
        }
    }

    /// Publish with the configured acknowledgement timeout.
    pub async fn publish(&self, request: OrderRequest) -> Result<PublishReceipt, PublishError> {
        self.publish_before(request, Instant::now() + self.ack_timeout)
            .await
    }

    /// Publish, giving up at `deadline` or after the acknowledgement timeout,
    /// whichever comes first.
    #[tracing::instrument(name = "orders.publish", skip_all, fields(store_id = %request.store_id))]
    pub async fn publish_before(
        &self,
        request: OrderRequest,
        deadline: Instant,
    ) -> Result<PublishReceipt, PublishError> {
        let event = new_order_event(request);
        let payload = codec::encode(&event);

        let started = Instant::now();
        let deadline = deadline.min(started + self.ack_timeout);
        let append = self
            .log
            .append(&self.topic, event.partition_key(), &payload);

        match tokio::time::timeout_at(deadline, append).await {
            Ok(Ok(position)) => {
                info!(
                    order_id = %event.order_id,
                    partition = position.partition,
                    offset = position.offset,
                    "Order published"
                );
                Ok(PublishReceipt {
                    order_id: event.order_id,
                    position,
                })
            }
            Ok(Err(source)) => {
                warn!(order_id = %event.order_id, error = %source, "Order publish rejected");
                Err(PublishError::Rejected {
                    order_id: event.order_id,
                    source,
                })
            }
            Err(_) => {
                let waited = started.elapsed();
                warn!(
                    order_id = %event.order_id,
                    waited_ms = waited.as_millis() as u64,
                    "Order publish timed out; outcome unknown"
                );
                Err(PublishError::Timeout {
                    order_id: event.order_id,
                    waited,
                })
            }
        }
    }
}

/// Build the event for a new order: fresh id, `NEW`, stamped now.
fn new_order_event(request: OrderRequest) -> OrderCreated {
    OrderCreated {
        order_id: Uuid::new_v4().to_string(),
        store_id: request.store_id,
        total_amount_cents: request.total_amount_cents.get(),
        status: STATUS_NEW.to_string(),
        created_at: chrono::Utc::now().timestamp_millis(),
    }
}
