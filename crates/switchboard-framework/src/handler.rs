//! Handler system for the Switchboard framework.
//!
//! Handlers are plain async functions or closures taking an
//! `Arc<InteractionContext>`. Any return type implementing [`HandleResponse`]
//! is accepted, so a handler can return nothing, a [`Reply`] to send, or a
//! `Result` whose error is routed to the recovery pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use switchboard_framework::{InteractionContext, into_handler};
//!
//! // Side effects only
//! async fn log_press(ctx: Arc<InteractionContext>) {
//!     tracing::info!(actor = ctx.actor_id(), "pressed");
//! }
//!
//! // Reply is delivered automatically
//! async fn balance(ctx: Arc<InteractionContext>) -> anyhow::Result<Reply> {
//!     Ok(Reply::text("You have 40 coins"))
//! }
//!
//! let handler = into_handler(balance);
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::InteractionContext;
use switchboard_core::{HandlerResult, Reply};

// ============================================================================
// HandleResponse - Handle handler return values
// ============================================================================

/// A trait for types that can be produced by a handler.
///
/// The dispatcher awaits [`into_response`](HandleResponse::into_response) and
/// treats an `Err` as a handler failure.
#[async_trait]
pub trait HandleResponse: Send {
    /// Converts this value into the handler's final result.
    async fn into_response(self, ctx: Arc<InteractionContext>) -> HandlerResult;
}

/// `()` - nothing to deliver.
#[async_trait]
impl HandleResponse for () {
    async fn into_response(self, _ctx: Arc<InteractionContext>) -> HandlerResult {
        Ok(())
    }
}

/// [`Reply`] - delivered through [`InteractionContext::respond`].
///
/// A delivery failure becomes the handler's failure.
#[async_trait]
impl HandleResponse for Reply {
    async fn into_response(self, ctx: Arc<InteractionContext>) -> HandlerResult {
        ctx.respond(self).await?;
        Ok(())
    }
}

/// `Option<T>` - the inner value is handled on `Some`, nothing on `None`.
#[async_trait]
impl<T: HandleResponse> HandleResponse for Option<T> {
    async fn into_response(self, ctx: Arc<InteractionContext>) -> HandlerResult {
        match self {
            Some(t) => t.into_response(ctx).await,
            None => Ok(()),
        }
    }
}

/// `Result<T, E>` - the inner value is handled on `Ok`, the error is returned
/// on `Err`.
#[async_trait]
impl<T, E> HandleResponse for Result<T, E>
where
    T: HandleResponse,
    E: Into<anyhow::Error> + Send,
{
    async fn into_response(self, ctx: Arc<InteractionContext>) -> HandlerResult {
        match self {
            Ok(t) => t.into_response(ctx).await,
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// An invocable unit of behaviour.
///
/// Implemented for every `Fn(Arc<InteractionContext>) -> impl Future` whose
/// output implements [`HandleResponse`]. State the handler needs is captured
/// by the closure at registration time.
pub trait Handler<R>: Send + Sync + 'static {
    /// Invokes the handler.
    fn call(&self, ctx: Arc<InteractionContext>) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> Handler<R> for F
where
    F: Fn(Arc<InteractionContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandleResponse + 'static,
{
    fn call(&self, ctx: Arc<InteractionContext>) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(Arc::clone(&ctx));
        Box::pin(async move { fut.await.into_response(ctx).await })
    }
}

// ============================================================================
// BoxedHandler - Type-erased handler stored in the registry
// ============================================================================

/// A type-erased handler that can be stored in collections.
///
/// Two `BoxedHandler`s are the same callback exactly when
/// [`Arc::ptr_eq`] holds.
pub type BoxedHandler =
    Arc<dyn Fn(Arc<InteractionContext>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Converts a handler function into a boxed handler.
pub fn into_handler<H, R>(handler: H) -> BoxedHandler
where
    H: Handler<R>,
    R: 'static,
{
    Arc::new(move |ctx| handler.call(ctx))
}
