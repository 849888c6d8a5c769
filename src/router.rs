//! Route registration: the group tree and the per-method radix trees it
//! flattens into.
//!
//! Groups exist only while the application is being wired up. Every route
//! registered through a group is stored fully resolved: its complete path
//! (every ancestor prefix joined on `/`) and its complete [`Chain`] (every
//! ancestor's middleware, root first, then route middleware, then the
//! handler). Dispatch is therefore a single radix-tree lookup with no tree
//! walk and no per-request chain assembly.

use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::app::AppContext;
use crate::context::Context;
use crate::error::RouteError;
use crate::handler::{BoxFuture, BoxedHandler, Handler, boxed};
use crate::method::Method;
use crate::path;
use crate::pool::{ContextPool, DEFAULT_POOL_CAPACITY};
use crate::request::Params;

// ── Chain ─────────────────────────────────────────────────────────────────────

/// The resolved middleware-plus-handler sequence for one route.
pub struct Chain<G> {
    pattern: Option<Box<str>>,
    entries: Box<[BoxedHandler<G>]>,
}

impl<G> Chain<G> {
    pub(crate) fn new(pattern: Option<String>, entries: Vec<BoxedHandler<G>>) -> Self {
        Self { pattern: pattern.map(String::into_boxed_str), entries: entries.into_boxed_slice() }
    }

    /// The registered pattern, e.g. `/users/:id`. `None` for fallback chains.
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Number of entries, the handler included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[BoxedHandler<G>] {
        &self.entries
    }
}

/// Outcome of looking a request up in the route table.
pub enum Resolution<G> {
    Matched { chain: Arc<Chain<G>>, params: Params },
    /// The path exists under other methods. Only reported when
    /// [`Router::handle_method_not_allowed`] is on.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router.
///
/// One radix tree per HTTP method, O(path-length) lookup. Build it once at
/// startup, then hand it to [`Server::serve`](crate::Server::serve); it is
/// read-only from then on. Each registration call returns `self` so calls
/// chain naturally.
///
/// ```rust
/// use trellis::{BoxFuture, Context, Router};
///
/// fn users(c: &mut Context) -> BoxFuture<'_> {
///     Box::pin(async move { c.response().text("users"); })
/// }
///
/// fn profile(c: &mut Context) -> BoxFuture<'_> {
///     Box::pin(async move {
///         let id = c.param("id").unwrap_or_default().to_owned();
///         c.response().text(&format!("profile of {id}"));
///     })
/// }
///
/// let app = Router::new()
///     .group("/users", |g| {
///         g.get("", users);
///         g.group("/:id", |user| {
///             user.get("/profile", profile);
///         });
///     });
/// ```
///
/// # Panics
///
/// Registration panics on a malformed or conflicting route (see
/// [`RouteError`]). The table is fixed before serving, so a bad route is a
/// startup bug, not a request-time condition.
pub struct Router<G = ()> {
    routes: HashMap<Method, MatchitRouter<Arc<Chain<G>>>>,
    middleware: Vec<BoxedHandler<G>>,
    not_found: BoxedHandler<G>,
    not_found_chain: Arc<Chain<G>>,
    method_not_allowed: BoxedHandler<G>,
    method_not_allowed_chain: Arc<Chain<G>>,
    handle_405: bool,
    pub(crate) pool: ContextPool<G>,
}

impl Router<()> {
    /// A router whose contexts carry no application globals.
    pub fn new() -> Self {
        Self::with_app_context(|| ())
    }
}

impl Default for Router<()> {
    fn default() -> Self { Self::new() }
}

impl<G: AppContext> Router<G> {
    /// A router whose contexts each carry a `G` built by `factory`.
    ///
    /// `factory` runs once per pooled context, not once per request; the
    /// instance is recycled along with its context, and [`AppContext::reset`]
    /// / [`AppContext::done`] bracket every request that uses it.
    pub fn with_app_context(factory: impl Fn() -> G + Send + Sync + 'static) -> Self {
        let not_found = boxed(default_not_found::<G>);
        let method_not_allowed = boxed(default_method_not_allowed::<G>);
        Self {
            routes: HashMap::new(),
            middleware: Vec::new(),
            not_found_chain: Arc::new(Chain::new(None, vec![Arc::clone(&not_found)])),
            not_found,
            method_not_allowed_chain: Arc::new(Chain::new(None, vec![Arc::clone(&method_not_allowed)])),
            method_not_allowed,
            handle_405: false,
            pool: ContextPool::new(Arc::new(factory), DEFAULT_POOL_CAPACITY),
        }
    }

    /// Appends root middleware. It wraps every route registered *after* this
    /// call, including routes in groups opened later, and the not-found and
    /// method-not-allowed handlers.
    pub fn middleware(mut self, middleware: impl Handler<G>) -> Self {
        self.middleware.push(boxed(middleware));
        self.refresh_fallbacks();
        self
    }

    /// Opens a group at `prefix`. The group starts with the root middleware
    /// registered so far.
    pub fn group(mut self, prefix: &str, build: impl FnOnce(&mut Group<'_, G>)) -> Self {
        let prefix = path::join("", prefix);
        let middleware = self.middleware.clone();
        build(&mut Group { router: &mut self, prefix, middleware });
        self
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler<G>) -> Self {
        let entries = with_handler(&self.middleware, Vec::new(), boxed(handler));
        self.add(method, &path::join("", path), entries);
        self
    }

    /// Like [`on`](Router::on) with middleware that applies to this route only.
    pub fn on_with(
        mut self,
        method: Method,
        path: &str,
        middleware: impl IntoIterator<Item = BoxedHandler<G>>,
        handler: impl Handler<G>,
    ) -> Self {
        let entries = with_handler(&self.middleware, middleware.into_iter().collect(), boxed(handler));
        self.add(method, &path::join("", path), entries);
        self
    }

    /// Fallible form of [`on`](Router::on).
    pub fn try_on(mut self, method: Method, path: &str, handler: impl Handler<G>) -> Result<Self, RouteError> {
        let entries = with_handler(&self.middleware, Vec::new(), boxed(handler));
        self.try_add(method, &path::join("", path), entries)?;
        Ok(self)
    }

    /// Registers `handler` for every method in [`Method::ALL`].
    pub fn any(mut self, path: &str, handler: impl Handler<G>) -> Self {
        let handler = boxed(handler);
        let full = path::join("", path);
        for method in Method::ALL {
            let entries = with_handler(&self.middleware, Vec::new(), Arc::clone(&handler));
            self.add(method, &full, entries);
        }
        self
    }

    pub fn get(self, path: &str, handler: impl Handler<G>) -> Self { self.on(Method::Get, path, handler) }
    pub fn post(self, path: &str, handler: impl Handler<G>) -> Self { self.on(Method::Post, path, handler) }
    pub fn put(self, path: &str, handler: impl Handler<G>) -> Self { self.on(Method::Put, path, handler) }
    pub fn patch(self, path: &str, handler: impl Handler<G>) -> Self { self.on(Method::Patch, path, handler) }
    pub fn delete(self, path: &str, handler: impl Handler<G>) -> Self { self.on(Method::Delete, path, handler) }
    pub fn head(self, path: &str, handler: impl Handler<G>) -> Self { self.on(Method::Head, path, handler) }
    pub fn options(self, path: &str, handler: impl Handler<G>) -> Self { self.on(Method::Options, path, handler) }
    pub fn connect(self, path: &str, handler: impl Handler<G>) -> Self { self.on(Method::Connect, path, handler) }
    pub fn trace(self, path: &str, handler: impl Handler<G>) -> Self { self.on(Method::Trace, path, handler) }

    /// Replaces the handler run when nothing matches. It runs behind the
    /// root middleware. The default sets `404 Not Found`.
    pub fn not_found(mut self, handler: impl Handler<G>) -> Self {
        self.not_found = boxed(handler);
        self.refresh_fallbacks();
        self
    }

    /// When on, a path that matches under other methods gets the
    /// method-not-allowed handler (default `405` plus an `allow` header)
    /// instead of the not-found one. Off by default.
    pub fn handle_method_not_allowed(mut self, enabled: bool) -> Self {
        self.handle_405 = enabled;
        self
    }

    /// Replaces the method-not-allowed handler. The `allow` header is set
    /// before it runs.
    pub fn method_not_allowed(mut self, handler: impl Handler<G>) -> Self {
        self.method_not_allowed = boxed(handler);
        self.refresh_fallbacks();
        self
    }

    /// Looks up the chain and path parameters for `method` + `path`.
    pub fn resolve(&self, method: Method, path: &str) -> Resolution<G> {
        let mut params = Params::default();
        match self.lookup(method, path, &mut params) {
            Some(chain) => Resolution::Matched { chain, params },
            None => match self.allowed_methods(method, path) {
                Some(allowed) => Resolution::MethodNotAllowed { allowed },
                None => Resolution::NotFound,
            },
        }
    }

    // ── internals ─────────────────────────────────────────────────────────────

    /// Fills `params` on a match. `params` is left untouched otherwise.
    pub(crate) fn lookup(&self, method: Method, path: &str, params: &mut Params) -> Option<Arc<Chain<G>>> {
        let matched = self.routes.get(&method)?.at(path).ok()?;
        for (name, value) in matched.params.iter() {
            params.push(name, value);
        }
        Some(Arc::clone(matched.value))
    }

    /// Methods that do route `path`, when 405 handling is on and there are any.
    pub(crate) fn allowed_methods(&self, method: Method, path: &str) -> Option<Vec<Method>> {
        if !self.handle_405 {
            return None;
        }
        let allowed: Vec<Method> = Method::ALL.into_iter()
            .filter(|m| *m != method)
            .filter(|m| self.routes.get(m).is_some_and(|tree| tree.at(path).is_ok()))
            .collect();
        (!allowed.is_empty()).then_some(allowed)
    }

    pub(crate) fn not_found_chain(&self) -> Arc<Chain<G>> {
        Arc::clone(&self.not_found_chain)
    }

    pub(crate) fn method_not_allowed_chain(&self) -> Arc<Chain<G>> {
        Arc::clone(&self.method_not_allowed_chain)
    }

    fn refresh_fallbacks(&mut self) {
        self.not_found_chain = Arc::new(Chain::new(
            None,
            with_handler(&self.middleware, Vec::new(), Arc::clone(&self.not_found)),
        ));
        self.method_not_allowed_chain = Arc::new(Chain::new(
            None,
            with_handler(&self.middleware, Vec::new(), Arc::clone(&self.method_not_allowed)),
        ));
    }

    fn add(&mut self, method: Method, pattern: &str, entries: Vec<BoxedHandler<G>>) {
        self.try_add(method, pattern, entries)
            .unwrap_or_else(|e| panic!("{e}"));
    }

    fn try_add(&mut self, method: Method, pattern: &str, entries: Vec<BoxedHandler<G>>) -> Result<(), RouteError> {
        let compiled = path::compile(pattern)?;
        let depth = entries.len();
        let chain = Arc::new(Chain::new(Some(pattern.to_owned()), entries));
        self.routes
            .entry(method)
            .or_default()
            .insert(compiled, chain)
            .map_err(|source| RouteError::Conflict { path: pattern.to_owned(), source })?;
        debug!(%method, route = pattern, chain = depth, "route registered");
        Ok(())
    }
}

// ── Group ─────────────────────────────────────────────────────────────────────

/// A path prefix with its own middleware stack.
///
/// Obtained from [`Router::group`] or [`Group::group`]. A child group starts
/// with a copy of its parent's stack as it stood when the child was opened;
/// middleware added to the child afterwards doesn't leak back to the parent.
pub struct Group<'r, G> {
    router: &'r mut Router<G>,
    prefix: String,
    middleware: Vec<BoxedHandler<G>>,
}

impl<G: AppContext> Group<'_, G> {
    /// The group's full path, e.g. `/users/:id`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Appends middleware for routes and sub-groups registered after this call.
    pub fn middleware(&mut self, middleware: impl Handler<G>) -> &mut Self {
        self.middleware.push(boxed(middleware));
        self
    }

    /// Opens a sub-group at `prefix`, relative to this group.
    pub fn group(&mut self, prefix: &str, build: impl FnOnce(&mut Group<'_, G>)) -> &mut Self {
        let prefix = path::join(&self.prefix, prefix);
        let middleware = self.middleware.clone();
        build(&mut Group { router: &mut *self.router, prefix, middleware });
        self
    }

    pub fn on(&mut self, method: Method, path: &str, handler: impl Handler<G>) -> &mut Self {
        let entries = with_handler(&self.middleware, Vec::new(), boxed(handler));
        self.router.add(method, &path::join(&self.prefix, path), entries);
        self
    }

    /// Like [`on`](Group::on) with middleware that applies to this route only.
    ///
    /// ```rust
    /// use trellis::{BoxFuture, Context, Method, Router, boxed};
    ///
    /// fn audit(c: &mut Context) -> BoxFuture<'_> {
    ///     Box::pin(async move { c.next().await; })
    /// }
    /// fn purge(c: &mut Context) -> BoxFuture<'_> {
    ///     Box::pin(async move { c.response().text("purged"); })
    /// }
    ///
    /// Router::new().group("/admin", |admin| {
    ///     admin.on_with(Method::Delete, "/cache", [boxed(audit)], purge);
    /// });
    /// ```
    pub fn on_with(
        &mut self,
        method: Method,
        path: &str,
        middleware: impl IntoIterator<Item = BoxedHandler<G>>,
        handler: impl Handler<G>,
    ) -> &mut Self {
        let entries = with_handler(&self.middleware, middleware.into_iter().collect(), boxed(handler));
        self.router.add(method, &path::join(&self.prefix, path), entries);
        self
    }

    pub fn any(&mut self, path: &str, handler: impl Handler<G>) -> &mut Self {
        let handler = boxed(handler);
        let full = path::join(&self.prefix, path);
        for method in Method::ALL {
            let entries = with_handler(&self.middleware, Vec::new(), Arc::clone(&handler));
            self.router.add(method, &full, entries);
        }
        self
    }

    pub fn get(&mut self, path: &str, handler: impl Handler<G>) -> &mut Self { self.on(Method::Get, path, handler) }
    pub fn post(&mut self, path: &str, handler: impl Handler<G>) -> &mut Self { self.on(Method::Post, path, handler) }
    pub fn put(&mut self, path: &str, handler: impl Handler<G>) -> &mut Self { self.on(Method::Put, path, handler) }
    pub fn patch(&mut self, path: &str, handler: impl Handler<G>) -> &mut Self { self.on(Method::Patch, path, handler) }
    pub fn delete(&mut self, path: &str, handler: impl Handler<G>) -> &mut Self { self.on(Method::Delete, path, handler) }
    pub fn head(&mut self, path: &str, handler: impl Handler<G>) -> &mut Self { self.on(Method::Head, path, handler) }
    pub fn options(&mut self, path: &str, handler: impl Handler<G>) -> &mut Self { self.on(Method::Options, path, handler) }
    pub fn connect(&mut self, path: &str, handler: impl Handler<G>) -> &mut Self { self.on(Method::Connect, path, handler) }
    pub fn trace(&mut self, path: &str, handler: impl Handler<G>) -> &mut Self { self.on(Method::Trace, path, handler) }
}

// ── helpers ───────────────────────────────────────────────────────────────────

fn with_handler<G>(
    stack: &[BoxedHandler<G>],
    route: Vec<BoxedHandler<G>>,
    handler: BoxedHandler<G>,
) -> Vec<BoxedHandler<G>> {
    let mut entries = stack.to_vec();
    entries.extend(route);
    entries.push(handler);
    entries
}

fn default_not_found<G: AppContext>(c: &mut Context<G>) -> BoxFuture<'_> {
    Box::pin(async move {
        c.response().set_status(StatusCode::NOT_FOUND);
    })
}

fn default_method_not_allowed<G: AppContext>(c: &mut Context<G>) -> BoxFuture<'_> {
    Box::pin(async move {
        c.response().set_status(StatusCode::METHOD_NOT_ALLOWED);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_c: &mut Context) -> BoxFuture<'_> {
        Box::pin(async {})
    }

    #[test]
    fn groups_resolve_to_full_paths_and_stacks() {
        let app = Router::new()
            .middleware(noop)
            .group("/users", |users| {
                users.middleware(noop).get("", noop);
                users.group("/:id", |user| {
                    user.middleware(noop);
                    user.get("", noop).get("/profile", noop);
                });
            });

        let Resolution::Matched { chain, params } = app.resolve(Method::Get, "/users/42/profile") else {
            panic!("expected a match");
        };
        assert_eq!(chain.pattern(), Some("/users/:id/profile"));
        assert_eq!(chain.len(), 4, "root + users + user middleware, then handler");
        assert_eq!(params.get("id"), Some("42"));

        let Resolution::Matched { chain, .. } = app.resolve(Method::Get, "/users") else {
            panic!("expected a match");
        };
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn resolution_is_stable() {
        let app = Router::new().get("/a/:x", noop);
        let first = match app.resolve(Method::Get, "/a/1") {
            Resolution::Matched { chain, .. } => chain,
            _ => panic!("expected a match"),
        };
        for _ in 0..3 {
            match app.resolve(Method::Get, "/a/2") {
                Resolution::Matched { chain, .. } => assert!(Arc::ptr_eq(&chain, &first)),
                _ => panic!("expected a match"),
            }
        }
    }

    #[test]
    fn middleware_added_later_skips_earlier_routes() {
        let app = Router::new().get("/early", noop).middleware(noop).get("/late", noop);
        let len = |p| match app.resolve(Method::Get, p) {
            Resolution::Matched { chain, .. } => chain.len(),
            _ => 0,
        };
        assert_eq!(len("/early"), 1);
        assert_eq!(len("/late"), 2);
        assert_eq!(app.not_found_chain().len(), 2);
    }

    #[test]
    fn method_not_allowed_is_opt_in() {
        let app = Router::new().get("/x", noop).put("/x", noop);
        assert!(matches!(app.resolve(Method::Post, "/x"), Resolution::NotFound));

        let app = app.handle_method_not_allowed(true);
        match app.resolve(Method::Post, "/x") {
            Resolution::MethodNotAllowed { allowed } => assert_eq!(allowed, vec![Method::Get, Method::Put]),
            _ => panic!("expected 405"),
        }
        assert!(matches!(app.resolve(Method::Post, "/y"), Resolution::NotFound));
    }

    #[test]
    fn try_on_reports_conflicts() {
        let err = Router::new()
            .get("/users/:id", noop)
            .try_on(Method::Get, "/users/:id", noop)
            .err()
            .expect("conflicting route must be rejected");
        assert!(matches!(err, RouteError::Conflict { .. }));
    }

    #[test]
    #[should_panic(expected = "duplicate parameter `id`")]
    fn duplicate_params_fail_at_registration() {
        Router::new().group("/users/:id", |g| {
            g.get("/friends/:id", noop);
        });
    }
}
