//! Handler shapes.
//!
//! | Shape | Signature | Used by |
//! |-------|-----------|---------|
//! | [`MsgHandler`] | `(Context, Message) -> Result<()>` | `subscribe`, middleware units |
//! | [`PostFn`] | `(Context, subject, payload) -> Result<Bytes>` | legacy `subscribe_post` |
//! | [`PostHook`] | `(Context, Message, response) -> Result<()>` | runs after a successful [`PostFn`] |

use bytes::Bytes;
use futures::future::BoxFuture;
use opentelemetry::Context;
use relay_bus::Message;
use std::future::Future;
use std::sync::Arc;

use super::errors::HandlerError;

/// Future returned by a [`MsgHandler`].
pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// A message handler with a request-scoped context.
pub type MsgHandler = Arc<dyn Fn(Context, Message) -> HandlerFuture + Send + Sync>;

/// Legacy handler: receives subject and payload, returns a response payload.
pub type PostFn =
    Arc<dyn Fn(Context, String, Bytes) -> BoxFuture<'static, Result<Bytes, HandlerError>> + Send + Sync>;

/// Runs after a successful [`PostFn`] with the original message and the response.
pub type PostHook = Arc<dyn Fn(Context, Message, Bytes) -> HandlerFuture + Send + Sync>;

/// Build a [`MsgHandler`] from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> MsgHandler
where
    F: Fn(Context, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |cx, msg| Box::pin(f(cx, msg)))
}

/// Build a [`PostFn`] from an async closure.
pub fn post_fn<F, Fut>(f: F) -> PostFn
where
    F: Fn(Context, String, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, HandlerError>> + Send + 'static,
{
    Arc::new(move |cx, subject, payload| Box::pin(f(cx, subject, payload)))
}

/// Build a [`PostHook`] from an async closure.
pub fn post_hook<F, Fut>(f: F) -> PostHook
where
    F: Fn(Context, Message, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |cx, msg, response| Box::pin(f(cx, msg, response)))
}

/// Adapt a legacy [`PostFn`] into a [`MsgHandler`].
///
/// The post function is called with (context, subject, payload). Only when it
/// succeeds and `hook` is set, the hook is called with (context, original
/// message, response). The adapted handler always returns `Ok(())`: errors
/// from both the post function and the hook are dropped here, and existing
/// callers rely on that.
pub fn adapt_post_fn(post: PostFn, hook: Option<PostHook>) -> MsgHandler {
    Arc::new(move |cx: Context, msg: Message| {
        let post = Arc::clone(&post);
        let hook = hook.clone();
        Box::pin(async move {
            let response = match post(cx.clone(), msg.subject.clone(), msg.payload.clone()).await {
                Ok(response) => response,
                Err(_) => return Ok(()),
            };

            if let Some(hook) = hook {
                let _ = hook(cx, msg, response).await;
            }
            Ok(())
        })
    })
}
