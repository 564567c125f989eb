//! # Relay Middleware - Handler Chains and Subscription Statistics
//!
//! Wraps message handlers and publishers of a subject-based transport in
//! configurable middleware chains, and reports per-subject delivery
//! statistics of every live subscription as observable gauges.
//!
//! ## Guarantees
//!
//! | Property | Enforcement |
//! |----------|-------------|
//! | Chain order | Units execute in reverse configuration order |
//! | Single core | A second guarded [`Core`] fails with [`CoreError::MultipleInstances`] |
//! | Fresh context | Every delivery gets its own request context |
//! | Error sink | Handler errors never reach the transport |
//! | Stats snapshot | A collection tick sees a consistent set of subscriptions |
//!
//! ## Layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ ConnContext (subscribe / publish facade)                   │
//! │   ├── Core::wrap ─────▶ handler chain ──▶ MsgHandler       │
//! │   ├── Core::use_publisher ▶ publish chain ──▶ Publisher    │
//! │   └── SubscriptionStatMetric ◀── register / deregister     │
//! ├───────────────────────────────────────────────────────────┤
//! │ domain/     handler types, chain composition, aggregation  │
//! │ middleware/ tracing, logging, metrics, recovery, validation│
//! │ ports/      Publisher                                      │
//! │ adapters/   TransportPublisher, reply post-hook            │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let core = Core::builder()
//!     .config(MiddlewareConfig::from_env())
//!     .build()?;
//! let conn = core.use_conn(InMemoryBus::new());
//!
//! conn.subscribe("orders.*", handler_fn(|cx, msg| async move {
//!     process(cx, msg).await
//! })).await?;
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod conn;
pub mod core;
pub mod domain;
pub mod middleware;
pub mod ports;
pub mod stats;

// Re-export main types
pub use adapters::{reply_post_hook, TransportPublisher};
pub use config::MiddlewareConfig;
pub use conn::ConnContext;
pub use self::core::{Core, CoreBuilder};
pub use domain::*;
pub use middleware::{
    LoggingLayer, MetricsLayer, Middleware, PublishMiddleware, RecoveryLayer, TracingLayer,
    ValidationLayer,
};
pub use ports::Publisher;
pub use stats::SubscriptionStatMetric;
