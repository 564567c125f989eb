//! Ports.
//!
//! Outbound capabilities are defined by the crates that own them
//! ([`Transport`](relay_bus::Transport), [`Meter`](relay_telemetry::Meter));
//! the publish side is defined here because publish units wrap it.

pub mod outbound;

pub use outbound::Publisher;
