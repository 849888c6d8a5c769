//! Application globals: the per-application object every context carries.

use crate::request::Request;

/// Lifecycle hooks for the application-defined object attached to each
/// [`Context`](crate::Context).
///
/// One instance is created by the factory given to
/// [`Router::with_app_context`](crate::Router::with_app_context) for every
/// pooled context, and recycled with it. Handlers reach it through
/// [`Context::app`](crate::Context::app) with its concrete type, no downcast.
///
/// For every request:
///
/// - [`reset`](AppContext::reset) runs exactly once, before the first
///   middleware. Re-acquire per-request resources here; leave process-wide
///   ones (a shared logger, a connection pool handle) alone.
/// - [`done`](AppContext::done) runs exactly once, after the chain finishes,
///   including when it short-circuits, panics, or the client goes away.
///   Release whatever `reset` acquired.
///
/// ```rust
/// use trellis::{AppContext, Request};
///
/// struct Globals {
///     requests_seen: u64,
///     scratch: Vec<u8>,
/// }
///
/// impl AppContext for Globals {
///     fn reset(&mut self, _req: &Request) {
///         self.requests_seen += 1;
///     }
///
///     fn done(&mut self) {
///         self.scratch.clear();
///     }
/// }
/// ```
pub trait AppContext: Send + 'static {
    fn reset(&mut self, req: &Request);
    fn done(&mut self);
}

/// For applications with no globals.
impl AppContext for () {
    fn reset(&mut self, _req: &Request) {}
    fn done(&mut self) {}
}
