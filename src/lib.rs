//! Orderflow - order events over a partitioned log
//!
//! An order service turns HTTP order requests into `OrderCreated` events on
//! a durable, partitioned log; a kitchen service consumes them with
//! at-least-once processing and commits offsets only after success.

pub mod auth;
pub mod bus;
pub mod config;
pub mod event;
pub mod http;
pub mod publisher;
pub mod subscriber;
pub mod utils;
