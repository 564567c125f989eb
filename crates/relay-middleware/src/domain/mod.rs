//! Domain layer: handler shapes, chain composition, the construction guard
//! and per-subject aggregation. No transport or metrics backend here.

pub mod aggregate;
pub mod chain;
pub mod errors;
pub mod guard;
pub mod handler;

pub use aggregate::{aggregate, SubjectAggregate, SubscriptionCounters};
pub use chain::{compose, compose_publisher, HandlerLayer, PublishLayer};
pub use errors::{CoreError, HandlerError};
pub use guard::{SingletonGuard, PROCESS_GUARD};
pub use handler::{
    adapt_post_fn, handler_fn, post_fn, post_hook, HandlerFuture, MsgHandler, PostFn, PostHook,
};
