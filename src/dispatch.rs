//! Request dispatch: the per-request lifecycle around a resolved chain.
//!
//! ```text
//! resolve(method, path) ──► acquire context ──► bind request, params, chain
//!        │                                             │
//!        │ miss: not-found / 405 chain                 ▼
//!        └──────────────────────────────────► AppContext::reset
//!                                                      │
//!                                               chain (next, next, …)
//!                                                      │  panic ──► 500
//!                                                      ▼
//!                                              AppContext::done
//!                                                      │
//!                                         snapshot response, release context
//! ```
//!
//! `done` and the release back to the pool sit in a drop guard, so they also
//! happen if the dispatch future is dropped mid-chain (client disconnect,
//! server shutdown).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::app::AppContext;
use crate::context::Context;
use crate::method::Method;
use crate::pool::ContextPool;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Chain, Router};

impl<G: AppContext> Router<G> {
    /// Runs one request through its chain and returns the finished response.
    ///
    /// This is everything the server does per request after reading the body,
    /// so it's also the entry point for driving a router without sockets:
    ///
    /// ```rust
    /// use trellis::{BoxFuture, Context, Method, Request, Router};
    ///
    /// fn hello(c: &mut Context) -> BoxFuture<'_> {
    ///     Box::pin(async move { c.response().text("hello"); })
    /// }
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let app = Router::new().get("/", hello);
    /// let res = app.dispatch(Request::new(Method::Get, "/")).await;
    /// assert_eq!(res.body(), b"hello");
    /// # });
    /// ```
    ///
    /// Panics in the globals' reset hook, in middleware or in the handler
    /// are caught here: the partial response is discarded, a
    /// `500 Internal Server Error` goes out instead, and the context is
    /// still cleaned up and recycled.
    pub async fn dispatch(&self, request: Request) -> Response {
        let mut lease = Lease::new(&self.pool);
        let ctx = lease.ctx();

        let chain = self.route(&request, ctx);
        let method = request.method();
        ctx.bind(request, chain);

        let run = AssertUnwindSafe(async {
            ctx.begin();
            ctx.next().await;
        });
        let outcome = run.catch_unwind().await;
        if let Err(panic) = outcome {
            error!(
                %method,
                path = ctx.path(),
                panic = panic_message(panic.as_ref()),
                "handler panicked"
            );
            fail(ctx);
        }

        // `finish` clears the pending flag before calling `done`, so a
        // panicking hook is not re-run by the lease.
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| ctx.finish())) {
            error!(
                %method,
                path = ctx.path(),
                panic = panic_message(panic.as_ref()),
                "done hook panicked"
            );
            fail(ctx);
        }

        ctx.response_ref().snapshot()
    }

    /// Picks the chain for `request`, writing path parameters (or the
    /// `allow` header) into `ctx`.
    fn route(&self, request: &Request, ctx: &mut Context<G>) -> Arc<Chain<G>> {
        let (method, path) = (request.method(), request.path());
        if let Some(chain) = self.lookup(method, path, ctx.params_mut()) {
            return chain;
        }
        match self.allowed_methods(method, path) {
            Some(allowed) => {
                ctx.response_mut().header("allow", &allow_header(&allowed));
                self.method_not_allowed_chain()
            }
            None => self.not_found_chain(),
        }
    }
}

/// A context on loan from the pool. Dropping it runs any pending `done` hook
/// and hands the context back.
struct Lease<'p, G: AppContext> {
    pool: &'p ContextPool<G>,
    ctx: Option<Box<Context<G>>>,
}

impl<'p, G: AppContext> Lease<'p, G> {
    fn new(pool: &'p ContextPool<G>) -> Self {
        Self { pool, ctx: Some(pool.acquire()) }
    }

    fn ctx(&mut self) -> &mut Context<G> {
        // Only `Drop` takes the context out.
        self.ctx.as_deref_mut().unwrap_or_else(|| unreachable!("lease already returned"))
    }
}

impl<G: AppContext> Drop for Lease<'_, G> {
    fn drop(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            // Reached with a pending `done` only when the request was dropped
            // mid-chain; there is no response left to fail.
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| ctx.finish())) {
                error!(panic = panic_message(panic.as_ref()), "done hook panicked on cancelled request");
            }
            self.pool.release(ctx);
        }
    }
}

/// Replaces whatever the chain wrote with a bare 500.
fn fail<G>(ctx: &mut Context<G>) {
    let response = ctx.response_mut();
    response.clear();
    response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
}

fn allow_header(methods: &[Method]) -> String {
    methods.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ")
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic.downcast_ref::<&str>().copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
