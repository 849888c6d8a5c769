//! The per-request context threaded through every chain.

use std::sync::Arc;

use crate::app::AppContext;
use crate::method::Method;
use crate::request::{Params, Request};
use crate::response::ResponseWriter;
use crate::router::Chain;

/// Request state for one in-flight request.
///
/// Contexts are pooled: the router hands one out per request, binds the
/// request, path parameters and resolved [`Chain`] to it, and takes it back
/// once the chain has finished. Between requests everything request-specific
/// is cleared; the buffers and the application globals `G` are kept.
///
/// A context is owned by exactly one request at a time, so nothing inside it
/// needs locking.
pub struct Context<G = ()> {
    request: Request,
    params: Params,
    response: ResponseWriter,
    chain: Option<Arc<Chain<G>>>,
    cursor: usize,
    app: G,
    live: bool,
}

impl<G> Context<G> {
    pub(crate) fn new(app: G) -> Self {
        Self {
            request: Request::new(Method::Get, "/"),
            params: Params::default(),
            response: ResponseWriter::new(),
            chain: None,
            cursor: 0,
            app,
            live: false,
        }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn method(&self) -> Method { self.request.method }
    pub fn path(&self) -> &str { &self.request.path }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `c.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Params { &self.params }

    /// The pattern the request matched, e.g. `/users/:id/profile`.
    /// `None` for not-found and method-not-allowed chains.
    pub fn route(&self) -> Option<&str> {
        self.chain.as_deref().and_then(Chain::pattern)
    }

    pub fn response(&mut self) -> &mut ResponseWriter { &mut self.response }

    /// Read-only view of the response, for middleware inspecting the outcome
    /// after `next()` returns.
    pub fn response_ref(&self) -> &ResponseWriter { &self.response }

    /// The application globals bound to this context.
    pub fn app(&mut self) -> &mut G { &mut self.app }

    // ── lifecycle (driven by the dispatcher) ──────────────────────────────────

    pub(crate) fn bind(&mut self, request: Request, chain: Arc<Chain<G>>) {
        self.request = request;
        self.chain = Some(chain);
        self.cursor = 0;
    }

    pub(crate) fn params_mut(&mut self) -> &mut Params { &mut self.params }

    pub(crate) fn response_mut(&mut self) -> &mut ResponseWriter { &mut self.response }

    /// Clears per-request state, keeping allocations and the globals.
    pub(crate) fn recycle(&mut self) {
        self.params.clear();
        self.response.clear();
        self.request.method = Method::Get;
        self.request.path.clear();
        self.request.headers.clear();
        self.request.body = bytes::Bytes::new();
        self.request.query = None;
        self.chain = None;
        self.cursor = 0;
        self.live = false;
    }
}

impl<G: AppContext> Context<G> {
    /// Runs the rest of the chain: the next middleware, or ultimately the
    /// route handler. Code after `next().await` runs once everything
    /// downstream has returned.
    ///
    /// A middleware that never calls `next` short-circuits the chain. Calling
    /// it again after it has returned is a no-op: the remainder of a chain
    /// runs at most once per request.
    ///
    /// ```rust
    /// use trellis::{BoxFuture, Context, StatusCode};
    ///
    /// fn require_token(c: &mut Context) -> BoxFuture<'_> {
    ///     Box::pin(async move {
    ///         if c.request().header("authorization").is_none() {
    ///             c.response().set_status(StatusCode::UNAUTHORIZED);
    ///             return;
    ///         }
    ///         c.next().await;
    ///     })
    /// }
    /// ```
    pub async fn next(&mut self) {
        let Some(chain) = self.chain.clone() else { return };
        let Some(entry) = chain.entries().get(self.cursor) else { return };

        self.cursor += 1;
        entry.call(self).await;

        // Park the cursor so a repeated `next()` upstream cannot re-enter the
        // part of the chain a downstream middleware chose to skip.
        self.cursor = chain.entries().len();
    }

    /// Runs the globals' reset hook. Must precede `next()`.
    pub(crate) fn begin(&mut self) {
        self.live = true;
        self.app.reset(&self.request);
    }

    /// Runs the globals' done hook if `begin` ran and `finish` hasn't yet.
    pub(crate) fn finish(&mut self) {
        if std::mem::take(&mut self.live) {
            self.app.done();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{BoxFuture, boxed};
    use std::sync::Mutex;

    fn record(log: &Arc<Mutex<Vec<&'static str>>>, s: &'static str) {
        log.lock().unwrap().push(s);
    }

    #[derive(Clone)]
    struct Step {
        log: Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        calls: usize,
    }

    impl crate::handler::Handler<()> for Step {
        fn call<'a>(&'a self, ctx: &'a mut Context<()>) -> BoxFuture<'a> {
            Box::pin(async move {
                record(&self.log, self.name);
                for _ in 0..self.calls {
                    ctx.next().await;
                }
            })
        }
    }

    fn chain_of(steps: &[Step]) -> Arc<Chain<()>> {
        Arc::new(Chain::new(None, steps.iter().cloned().map(boxed).collect()))
    }

    #[tokio::test]
    async fn second_next_is_a_no_op() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = |name, calls| Step { log: Arc::clone(&log), name, calls };
        let chain = chain_of(&[step("a", 2), step("b", 0), step("c", 1)]);

        let mut ctx = Context::new(());
        ctx.bind(Request::new(Method::Get, "/"), chain);
        ctx.next().await;

        // `b` short-circuits; `a`'s second call must not reach `c`.
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(ctx.cursor, 3);
    }

    #[tokio::test]
    async fn recycle_forgets_the_request() {
        let mut ctx = Context::new(());
        ctx.bind(Request::new(Method::Post, "/x?y=1").with_body("zz"), chain_of(&[]));
        ctx.params_mut().push("id", "7");
        ctx.response().write_str("body");
        ctx.begin();

        ctx.recycle();
        assert!(ctx.param("id").is_none());
        assert!(ctx.response_ref().body().is_empty());
        assert!(ctx.request().body().is_empty());
        assert!(ctx.request().query().is_none());
        assert!(ctx.route().is_none());
        assert_eq!(ctx.path(), "");
        assert_eq!(ctx.method(), Method::Get);
    }
}
