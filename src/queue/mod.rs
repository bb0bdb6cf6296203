//! Delivery queue for job-dispatch notices.
//!
//! This module provides the at-least-once message channel between job
//! creation and worker pickup:
//!
//! - **DeliveryNotice**: the message announcing a dispatchable job
//! - **DeliveryQueue**: send / read-with-visibility-timeout / delete
//! - **RedisDeliveryQueue**: Redis-backed implementation

pub mod delivery;
pub mod notice;

// Re-export main types for convenience
pub use delivery::{DeliveryQueue, QueueError, RedisDeliveryQueue};
pub use notice::{DeliveryNotice, ReceivedNotice};
