//! Handler trait and type erasure.
//!
//! # One shape for middleware and handlers
//!
//! Every entry in a chain takes the request's [`Context`] and returns a boxed
//! future borrowing it. Middleware is simply a handler that calls
//! [`Context::next`] somewhere in its body; a terminal handler doesn't.
//!
//! ```text
//! fn users(c: &mut Context<G>) -> BoxFuture<'_> { … }  ← user writes this
//!        ↓ group.get("", users)
//! Arc::new(users)  as  BoxedHandler<G>                 ← stored in a Chain
//!        ↓
//! handler.call(ctx)  at request time                   ← one vtable dispatch
//! ```
//!
//! The future borrows the context mutably for its whole life, which is what
//! lets code after `c.next().await` observe the final response state.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;

/// A heap-allocated, type-erased future borrowing the request context.
///
/// `Send` so tokio can move the in-flight request between worker threads.
pub type BoxFuture<'a, T = ()> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased chain entry shared across concurrent requests.
pub type BoxedHandler<G> = Arc<dyn Handler<G>>;

/// Implemented by every middleware and route handler.
///
/// Plain functions get it for free:
///
/// ```rust
/// use trellis::{BoxFuture, Context};
///
/// fn hello(c: &mut Context) -> BoxFuture<'_> {
///     Box::pin(async move {
///         c.response().text("hello");
///     })
/// }
/// ```
///
/// Implement it by hand for middleware that carries settings, as
/// [`middleware::Logger`](crate::middleware::Logger) does.
pub trait Handler<G>: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context<G>) -> BoxFuture<'a>;
}

impl<G, F> Handler<G> for F
where
    F: for<'a> Fn(&'a mut Context<G>) -> BoxFuture<'a> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context<G>) -> BoxFuture<'a> {
        self(ctx)
    }
}

/// Erases `handler` so entries of different types can share one chain, e.g.
/// for [`Group::on_with`](crate::Group::on_with).
pub fn boxed<G, H: Handler<G>>(handler: H) -> BoxedHandler<G> {
    Arc::new(handler)
}
