//! # Relay Bus - Subject-Based Publish/Subscribe Transport
//!
//! Defines the transport capability consumed by `relay-middleware` and ships
//! an in-process implementation of it.
//!
//! ## Subjects
//!
//! ```text
//! time.us.east          literal subject
//! time.*.east           '*' matches exactly one token
//! time.us.>             '>' matches one or more trailing tokens
//! ```
//!
//! ## Delivery Model
//!
//! ```text
//!                      ┌────────────────────────┐
//!   publish(msg) ────▶ │      InMemoryBus       │
//!                      └────────────────────────┘
//!                        │          │         │
//!              every plain sub   one member per queue group
//!                        ▼          ▼         ▼
//!                  ┌─────────┐ ┌─────────┐ ┌─────────┐
//!                  │ buffer  │ │ buffer  │ │ buffer  │  pending / dropped
//!                  └─────────┘ └─────────┘ └─────────┘
//!                        │          │         │
//!                        ▼          ▼         ▼
//!                     handler    handler   handler     delivered
//! ```
//!
//! Every subscription owns a bounded buffer. A full buffer drops the message
//! for that subscription only and bumps its `dropped` counter.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod message;
pub mod publisher;
pub mod subject;
pub mod subscriber;
pub mod transport;

// Re-export main types
pub use message::Message;
pub use publisher::InMemoryBus;
pub use subscriber::BusSubscription;
pub use transport::{
    transport_handler, BusError, SubscriptionHandle, SubscriptionId, Transport, TransportHandler,
};

/// Maximum messages buffered per subscription before new ones are dropped.
pub const DEFAULT_PENDING_LIMIT: usize = 65_536;

/// Subject token separator.
pub const TOKEN_SEPARATOR: char = '.';

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pending_limit() {
        assert_eq!(DEFAULT_PENDING_LIMIT, 65_536);
    }
}
