//! Adapters binding the ports to a transport.

pub mod publisher;

pub use publisher::{reply_post_hook, TransportPublisher};
