//! The `OrderCreated` event and its wire schema.
//!
//! This module contains:
//! - `OrderCreated`: the unit of data flowing through the pipeline
//! - `SCHEMA_JSON`: the Avro schema text shared with every other producer
//!   and consumer of the topic
//! - `codec`: Avro binary encode/decode bound to that schema

pub mod codec;
mod schema;

pub use codec::{decode, encode, DecodeError};
pub use schema::{verify_schema, SchemaError, SCHEMA_JSON};

/// Status written by the publisher for every new order.
pub const STATUS_NEW: &str = "NEW";

/// An order was accepted by the order service.
///
/// Every field is required on the wire. Values are immutable once encoded:
/// consumers never rewrite or republish them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCreated {
    /// Globally unique id, assigned by the publisher. Also the partition key.
    pub order_id: String,
    /// Store the order originated from.
    pub store_id: String,
    /// Order total in minor currency units.
    pub total_amount_cents: i32,
    /// Lifecycle status. Only `NEW` is written here; other values pass
    /// through untouched.
    pub status: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl OrderCreated {
    /// Partition key for this event: the raw bytes of `order_id`.
    pub fn partition_key(&self) -> &[u8] {
        self.order_id.as_bytes()
    }

    /// Total formatted as a decimal currency amount, e.g. `5.99`.
    pub fn total_display(&self) -> String {
        let cents = i64::from(self.total_amount_cents);
        let sign = if cents < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, cents.abs() / 100, cents.abs() % 100)
    }
}
